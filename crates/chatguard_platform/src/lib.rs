#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fmt;

use anyhow::anyhow;
use chatguard_domain::{ChatId, ContentKind, MessageId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Reference to a chat participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
	pub id: UserId,

	#[serde(default)]
	pub first_name: String,

	#[serde(default)]
	pub username: Option<String>,
}

impl UserRef {
	pub fn new(id: UserId, first_name: impl Into<String>) -> Self {
		Self {
			id,
			first_name: first_name.into(),
			username: None,
		}
	}

	pub fn with_username(mut self, username: impl Into<String>) -> Self {
		self.username = Some(username.into());
		self
	}

	/// `first_name (username)` or just `first_name`; falls back to the id when nameless.
	pub fn display_name(&self) -> String {
		let name = if self.first_name.trim().is_empty() {
			self.id.to_string()
		} else {
			self.first_name.clone()
		};

		match self.username.as_deref().filter(|u| !u.trim().is_empty()) {
			Some(username) => format!("{name} ({username})"),
			None => name,
		}
	}
}

/// Discriminant of a [`ChatEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
	Join,
	Leave,
	Message,
}

impl EventKind {
	pub const fn as_str(self) -> &'static str {
		match self {
			EventKind::Join => "join",
			EventKind::Leave => "leave",
			EventKind::Message => "message",
		}
	}
}

impl fmt::Display for EventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Normalized chat event produced by the ingestion layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
	pub chat_id: ChatId,

	/// User who triggered the event (sender, inviter, or remover).
	pub actor_id: UserId,

	/// Platform event time in Unix milliseconds.
	pub timestamp: i64,

	pub payload: EventPayload,
}

impl ChatEvent {
	pub fn new(chat_id: ChatId, actor_id: UserId, timestamp: i64, payload: EventPayload) -> Self {
		Self {
			chat_id,
			actor_id,
			timestamp,
			payload,
		}
	}

	/// Members joined; `actor_id` is whoever added them (themselves for a plain join).
	pub fn join(chat_id: ChatId, actor_id: UserId, timestamp: i64, members: Vec<UserRef>) -> Self {
		Self::new(chat_id, actor_id, timestamp, EventPayload::Join { members })
	}

	pub fn leave(chat_id: ChatId, actor_id: UserId, timestamp: i64, leaver: UserRef) -> Self {
		Self::new(chat_id, actor_id, timestamp, EventPayload::Leave { leaver })
	}

	/// Message event; the actor is the sender.
	pub fn message(chat_id: ChatId, timestamp: i64, message: MessagePayload) -> Self {
		Self::new(chat_id, message.sender.id, timestamp, EventPayload::Message(message))
	}

	pub fn kind(&self) -> EventKind {
		self.payload.kind()
	}
}

/// Event payloads, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
	Join { members: Vec<UserRef> },

	Leave { leaver: UserRef },

	Message(MessagePayload),
}

impl EventPayload {
	pub fn kind(&self) -> EventKind {
		match self {
			EventPayload::Join { .. } => EventKind::Join,
			EventPayload::Leave { .. } => EventKind::Leave,
			EventPayload::Message(_) => EventKind::Message,
		}
	}
}

/// Incoming (or edited) message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
	pub message_id: MessageId,

	pub sender: UserRef,

	/// Declared content kinds (photo, sticker, ...).
	#[serde(default)]
	pub content_kinds: BTreeSet<ContentKind>,

	#[serde(default)]
	pub entities: Vec<MessageEntity>,

	/// Set when the platform reports an edit of an earlier message.
	#[serde(default)]
	pub edited: bool,
}

impl MessagePayload {
	/// Plain text message with no entities.
	pub fn text(message_id: MessageId, sender: UserRef) -> Self {
		Self {
			message_id,
			sender,
			content_kinds: BTreeSet::from([ContentKind::Text]),
			entities: Vec::new(),
			edited: false,
		}
	}

	pub fn with_kind(mut self, kind: ContentKind) -> Self {
		self.content_kinds.insert(kind);
		self
	}

	pub fn with_entity(mut self, entity: MessageEntity) -> Self {
		self.entities.push(entity);
		self
	}
}

/// Formatting/semantic span within a message text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntity {
	#[serde(rename = "type")]
	pub kind: EntityKind,
	pub offset: u32,
	pub length: u32,
}

impl MessageEntity {
	pub fn new(kind: EntityKind, offset: u32, length: u32) -> Self {
		Self { kind, offset, length }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
	Mention,
	Hashtag,
	Cashtag,
	BotCommand,
	Url,
	Email,
	PhoneNumber,
	Bold,
	Italic,
	Underline,
	Strikethrough,
	Code,
	Pre,
	TextLink,
	TextMention,
	#[serde(other)]
	Other,
}

/// Administrator as reported by the authoritative roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminMember {
	pub user_id: UserId,
	pub display_name: String,
}

impl AdminMember {
	pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
		Self {
			user_id,
			display_name: display_name.into(),
		}
	}
}

/// Admin roster could not be fetched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
	#[error("admin roster unavailable for chat {chat_id}: {detail}")]
	Unavailable { chat_id: ChatId, detail: String },
	#[error("not authorized to read admins of chat {chat_id}")]
	NotAuthorized { chat_id: ChatId },
}

/// Delete/notice action failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
	#[error("not supported{}", detail_suffix(.0))]
	NotSupported(Option<String>),
	#[error("not authorized{}", detail_suffix(.0))]
	NotAuthorized(Option<String>),
	#[error("message not found: {0}")]
	NotFound(MessageId),
	#[error("internal error: {0}")]
	Internal(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
	detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
}

/// Source of the authoritative admin roster.
#[async_trait::async_trait]
pub trait AdminSource: Send + Sync {
	async fn fetch_admins(&self, chat_id: ChatId) -> Result<Vec<AdminMember>, FetchError>;
}

/// Side-effecting chat operations executed after a verdict.
#[async_trait::async_trait]
pub trait ChatActions: Send + Sync {
	async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), ActionError>;

	async fn send_notice(&self, chat_id: ChatId, text: &str) -> Result<(), ActionError>;
}

pub type EventTx = mpsc::Sender<ChatEvent>;
pub type EventRx = mpsc::Receiver<ChatEvent>;

/// Trait representing a runnable event ingestion source.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync + 'static {
	/// Short name for logs.
	fn name(&self) -> &'static str;

	/// Run until the source is exhausted, the receiver is dropped, or a fatal error.
	async fn run(self: Box<Self>, events_tx: EventTx) -> anyhow::Result<()>;
}

/// Build a bounded event channel.
pub fn bounded_event_channel(capacity: usize) -> (EventTx, EventRx) {
	mpsc::channel(capacity)
}

/// Wrapper that redacts in logs.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
	pub fn new(s: impl Into<String>) -> Self {
		Self(s.into())
	}

	/// Access the inner secret string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SecretString(<redacted>)")
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("<redacted>")
	}
}

/// Generate an opaque session id.
pub fn new_session_id() -> String {
	Uuid::new_v4().to_string()
}

/// Validate basic event invariants.
pub fn validate_chat_event(ev: &ChatEvent) -> anyhow::Result<()> {
	if ev.chat_id.get() == 0 {
		return Err(anyhow!("chat_id must be non-zero"));
	}
	if ev.actor_id.get() == 0 {
		return Err(anyhow!("actor_id must be non-zero"));
	}
	if ev.timestamp < 0 {
		return Err(anyhow!("timestamp must be non-negative (got {})", ev.timestamp));
	}

	match &ev.payload {
		EventPayload::Join { members } => {
			if members.is_empty() {
				return Err(anyhow!("join event must list at least one member"));
			}
			if members.iter().any(|m| m.id.get() == 0) {
				return Err(anyhow!("join member ids must be non-zero"));
			}
		}
		EventPayload::Leave { leaver } => {
			if leaver.id.get() == 0 {
				return Err(anyhow!("leaver id must be non-zero"));
			}
		}
		EventPayload::Message(m) => {
			if m.sender.id != ev.actor_id {
				return Err(anyhow!(
					"message sender mismatch: actor_id={} sender.id={}",
					ev.actor_id,
					m.sender.id
				));
			}
			if m.message_id.get() == 0 {
				return Err(anyhow!("message_id must be non-zero"));
			}
		}
	}

	Ok(())
}
