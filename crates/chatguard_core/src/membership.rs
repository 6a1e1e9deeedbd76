#![forbid(unsafe_code)]

use chatguard_domain::UserId;

use crate::registry::{ChatRecord, MembershipEntry};

/// What `record_departure` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
	/// Member left on their own; membership kept.
	SelfLeave,

	/// Member was removed by someone else; entry dropped (untrusted).
	Ejected,

	/// Removed by someone else but was never tracked.
	NotTracked,
}

/// Start the trust clock for `user_id` unless it is already running.
///
/// Returns `true` when a new entry was inserted.
pub fn record_join(record: &mut ChatRecord, user_id: UserId, now: i64) -> bool {
	if record.users.contains_key(&user_id) {
		return false;
	}
	record.users.insert(user_id, MembershipEntry::joined_at(now));
	true
}

/// Forget a member removed by another user. Self-departures leave the entry in place.
pub fn record_departure(record: &mut ChatRecord, leaver_id: UserId, actor_id: UserId) -> Departure {
	if actor_id == leaver_id {
		return Departure::SelfLeave;
	}

	match record.users.remove(&leaver_id) {
		Some(_) => Departure::Ejected,
		None => Departure::NotTracked,
	}
}
