#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::time::Duration;

use chatguard_domain::UserId;
use chatguard_util::time::duration_ms;

use crate::registry::{ChatRecord, MembershipEntry};

/// Default time a member must stay before their media is allowed.
pub const DEFAULT_TRUST_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Why a user is (or is not) trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trust {
	/// Listed in the chat's admin roster.
	ChatAdmin,

	/// Listed in the global admin override set.
	OverrideAdmin,

	/// No join was observed; recorded with the unknown sentinel and trusted.
	UnknownJoin,

	/// Member long enough.
	Aged { since: i64 },

	/// Joined too recently.
	Untrusted { since: i64, remaining_ms: i64 },
}

impl Trust {
	pub const fn is_trusted(&self) -> bool {
		!matches!(self, Trust::Untrusted { .. })
	}

	pub const fn is_admin(&self) -> bool {
		matches!(self, Trust::ChatAdmin | Trust::OverrideAdmin)
	}
}

/// Trust verdicts over chat state.
///
/// Users whose join was never observed are trusted by default so that
/// members who predate the bot are not restricted. This is an open default:
/// a user who joined while the bot was offline gets trusted immediately.
#[derive(Debug, Clone)]
pub struct TrustEngine {
	trust_age: Duration,
	admin_overrides: HashSet<UserId>,
}

impl Default for TrustEngine {
	fn default() -> Self {
		Self::new(DEFAULT_TRUST_AGE, std::iter::empty())
	}
}

impl TrustEngine {
	pub fn new(trust_age: Duration, admin_overrides: impl IntoIterator<Item = UserId>) -> Self {
		Self {
			trust_age,
			admin_overrides: admin_overrides.into_iter().collect(),
		}
	}

	pub fn trust_age(&self) -> Duration {
		self.trust_age
	}

	pub fn is_override_admin(&self, user_id: UserId) -> bool {
		self.admin_overrides.contains(&user_id)
	}

	/// Evaluate trust for `user_id` at `now`.
	///
	/// The only mutation is inserting an unknown-join entry for a user with no record.
	pub fn evaluate(&self, record: &mut ChatRecord, user_id: UserId, now: i64) -> Trust {
		if record.is_admin(user_id) {
			return Trust::ChatAdmin;
		}
		if self.is_override_admin(user_id) {
			return Trust::OverrideAdmin;
		}

		let Some(entry) = record.membership(user_id) else {
			record.users.insert(user_id, MembershipEntry::unknown());
			return Trust::UnknownJoin;
		};

		let age = now.saturating_sub(entry.since);
		let needed = duration_ms(self.trust_age);
		if age >= needed {
			Trust::Aged { since: entry.since }
		} else {
			Trust::Untrusted {
				since: entry.since,
				remaining_ms: needed - age,
			}
		}
	}

	pub fn is_trusted(&self, record: &mut ChatRecord, user_id: UserId, now: i64) -> bool {
		self.evaluate(record, user_id, now).is_trusted()
	}
}
