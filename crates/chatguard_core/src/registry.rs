#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;

use chatguard_domain::{ChatId, UserId};
use parking_lot::Mutex;
use tracing::debug;

/// Shared handle to one chat's state. Holding the lock serializes pipeline runs for that chat.
pub type ChatHandle = Arc<tokio::sync::Mutex<ChatRecord>>;

/// Join time of a tracked member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipEntry {
	/// Unix millis of the first observed join; [`MembershipEntry::UNKNOWN_SINCE`] if never observed.
	pub since: i64,
}

impl MembershipEntry {
	/// Sentinel for "join time unknown, assume long-trusted".
	pub const UNKNOWN_SINCE: i64 = 0;

	pub const fn joined_at(since: i64) -> Self {
		Self { since }
	}

	pub const fn unknown() -> Self {
		Self {
			since: Self::UNKNOWN_SINCE,
		}
	}

	pub const fn is_unknown(&self) -> bool {
		self.since == Self::UNKNOWN_SINCE
	}
}

/// Roster entry for a chat administrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminEntry {
	pub id: UserId,
	pub display_name: String,
}

/// Per-chat moderation state.
#[derive(Debug, Clone)]
pub struct ChatRecord {
	chat_id: ChatId,

	pub(crate) users: HashMap<UserId, MembershipEntry>,

	pub(crate) admins: HashMap<UserId, AdminEntry>,

	/// Unix millis of the last successful roster fetch; 0 forces an immediate refresh.
	pub(crate) last_admin_refresh: i64,
}

impl ChatRecord {
	pub fn new(chat_id: ChatId) -> Self {
		Self {
			chat_id,
			users: HashMap::new(),
			admins: HashMap::new(),
			last_admin_refresh: 0,
		}
	}

	pub fn chat_id(&self) -> ChatId {
		self.chat_id
	}

	pub fn membership(&self, user_id: UserId) -> Option<MembershipEntry> {
		self.users.get(&user_id).copied()
	}

	pub fn tracked_users(&self) -> usize {
		self.users.len()
	}

	pub fn is_admin(&self, user_id: UserId) -> bool {
		self.admins.contains_key(&user_id)
	}

	pub fn admin(&self, user_id: UserId) -> Option<&AdminEntry> {
		self.admins.get(&user_id)
	}

	pub fn admins(&self) -> impl Iterator<Item = &AdminEntry> {
		self.admins.values()
	}

	pub fn last_admin_refresh(&self) -> i64 {
		self.last_admin_refresh
	}
}

/// Owner of all per-chat records. Records are created lazily and live for the process lifetime.
#[derive(Debug, Default)]
pub struct ChatRegistry {
	chats: Mutex<HashMap<ChatId, ChatHandle>>,
}

impl ChatRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Return the record for `chat_id`, creating an empty one on first sight.
	pub fn get_or_create(&self, chat_id: ChatId) -> ChatHandle {
		let mut chats = self.chats.lock();
		let handle = chats.entry(chat_id).or_insert_with(|| {
			debug!(chat_id = %chat_id, "chat registry: created chat record");
			Arc::new(tokio::sync::Mutex::new(ChatRecord::new(chat_id)))
		});
		Arc::clone(handle)
	}

	pub fn get(&self, chat_id: ChatId) -> Option<ChatHandle> {
		self.chats.lock().get(&chat_id).cloned()
	}
}
