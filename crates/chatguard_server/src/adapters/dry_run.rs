#![forbid(unsafe_code)]

use async_trait::async_trait;
use chatguard_domain::{ChatId, MessageId};
use chatguard_platform::{ActionError, AdminMember, AdminSource, ChatActions, FetchError, new_session_id};
use tracing::{debug, info};

/// Platform stand-in used when no chat transport is wired in.
///
/// Reports an empty admin roster, so only configured admin overrides are
/// trusted, and logs the actions it would have taken.
pub struct DryRunPlatform {
	session_id: String,
}

impl DryRunPlatform {
	pub fn new() -> Self {
		let session_id = new_session_id();
		info!(%session_id, "dry-run platform started; moderation actions will only be logged");
		Self { session_id }
	}
}

#[async_trait]
impl AdminSource for DryRunPlatform {
	async fn fetch_admins(&self, chat_id: ChatId) -> Result<Vec<AdminMember>, FetchError> {
		debug!(session_id = %self.session_id, chat_id = %chat_id, "dry run: empty admin roster");
		Ok(Vec::new())
	}
}

#[async_trait]
impl ChatActions for DryRunPlatform {
	async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), ActionError> {
		info!(session_id = %self.session_id, chat_id = %chat_id, message_id = %message_id, "dry run: would delete message");
		Ok(())
	}

	async fn send_notice(&self, chat_id: ChatId, text: &str) -> Result<(), ActionError> {
		info!(session_id = %self.session_id, chat_id = %chat_id, text, "dry run: would send notice");
		Ok(())
	}
}
