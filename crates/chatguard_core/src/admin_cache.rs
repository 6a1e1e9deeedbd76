#![forbid(unsafe_code)]

use std::time::Duration;

use chatguard_platform::{AdminSource, FetchError};
use chatguard_util::time::duration_ms;
use tracing::debug;

use crate::registry::{AdminEntry, ChatRecord};

/// Default minimum interval between roster fetches for one chat.
pub const DEFAULT_ADMIN_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

/// Result of a successful `refresh_if_due`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
	/// Roster is still within the refresh interval; nothing fetched.
	Fresh,

	/// Roster replaced with `admins` entries.
	Refreshed { admins: usize },
}

/// Per-chat admin roster refresh policy.
#[derive(Debug, Clone)]
pub struct AdminCache {
	refresh_interval: Duration,
}

impl Default for AdminCache {
	fn default() -> Self {
		Self::new(DEFAULT_ADMIN_REFRESH_INTERVAL)
	}
}

impl AdminCache {
	pub fn new(refresh_interval: Duration) -> Self {
		Self { refresh_interval }
	}

	pub fn refresh_interval(&self) -> Duration {
		self.refresh_interval
	}

	/// Whether the roster was never fetched or `now - last_admin_refresh` strictly exceeds the interval.
	pub fn is_due(&self, record: &ChatRecord, now: i64) -> bool {
		record.last_admin_refresh == 0
			|| now.saturating_sub(record.last_admin_refresh) > duration_ms(self.refresh_interval)
	}

	/// Fetch and fully replace the roster when due.
	///
	/// On failure the record is left untouched, so the next event retries.
	pub async fn refresh_if_due(
		&self,
		record: &mut ChatRecord,
		now: i64,
		source: &dyn AdminSource,
	) -> Result<RefreshOutcome, FetchError> {
		if !self.is_due(record, now) {
			return Ok(RefreshOutcome::Fresh);
		}

		let chat_id = record.chat_id();
		let roster = source.fetch_admins(chat_id).await?;

		record.admins = roster
			.into_iter()
			.map(|m| {
				(
					m.user_id,
					AdminEntry {
						id: m.user_id,
						display_name: m.display_name,
					},
				)
			})
			.collect();
		record.last_admin_refresh = now;

		let admins = record.admins.len();
		debug!(chat_id = %chat_id, admins, "admin cache: roster refreshed");

		Ok(RefreshOutcome::Refreshed { admins })
	}
}
