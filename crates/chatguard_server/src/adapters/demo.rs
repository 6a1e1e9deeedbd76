#![forbid(unsafe_code)]

use std::time::Duration;

use async_trait::async_trait;
use chatguard_domain::{ChatId, ContentKind, MessageId, UserId};
use chatguard_platform::{
	ChatEvent, EntityKind, EventSource, EventTx, MessageEntity, MessagePayload, UserRef, new_session_id,
	validate_chat_event,
};
use chatguard_util::time::unix_ms_now;
use tokio::time::Interval;
use tracing::{debug, info, warn};

/// Dev-only source that replays a short scripted session into one chat.
pub struct DemoSource {
	chat_id: ChatId,
	emit_interval: Duration,
}

impl DemoSource {
	pub fn new(chat_id: ChatId) -> Self {
		Self {
			chat_id,
			emit_interval: Duration::from_millis(250),
		}
	}

	/// Customize emit interval (useful for tests).
	#[allow(dead_code)]
	pub fn with_emit_interval(mut self, interval: Duration) -> Self {
		self.emit_interval = interval;
		self
	}

	fn newcomer() -> UserRef {
		UserRef::new(UserId(4242), "Demo").with_username("demo_user")
	}

	/// Join, a plain greeting, a photo, a link, then a self-leave.
	fn script(chat_id: ChatId) -> Vec<ChatEvent> {
		let user = Self::newcomer();
		let now = unix_ms_now();
		let msg = |n: i64| MessagePayload::text(MessageId(n), user.clone());

		vec![
			ChatEvent::join(chat_id, user.id, now, vec![user.clone()]),
			ChatEvent::message(chat_id, now, msg(1)),
			ChatEvent::message(chat_id, now, msg(2).with_kind(ContentKind::Photo)),
			ChatEvent::message(
				chat_id,
				now,
				msg(3).with_entity(MessageEntity::new(EntityKind::Url, 0, 19)),
			),
			ChatEvent::leave(chat_id, user.id, now, user.clone()),
		]
	}
}

#[async_trait]
impl EventSource for DemoSource {
	fn name(&self) -> &'static str {
		"demo"
	}

	async fn run(self: Box<Self>, events_tx: EventTx) -> anyhow::Result<()> {
		let session_id = new_session_id();
		let mut interval: Interval = tokio::time::interval(self.emit_interval);
		interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

		info!(chat_id = %self.chat_id, %session_id, "demo source started");
		debug!(interval_ms = self.emit_interval.as_millis(), "demo source tick interval configured");

		for ev in Self::script(self.chat_id) {
			interval.tick().await;

			if let Err(e) = validate_chat_event(&ev) {
				warn!(chat_id = %self.chat_id, error = %e, "dropping invalid demo event");
				continue;
			}

			if events_tx.try_send(ev).is_err() {
				warn!("demo source events channel full or closed; dropping event");
			}
		}

		info!(chat_id = %self.chat_id, %session_id, "demo source finished");
		Ok(())
	}
}
