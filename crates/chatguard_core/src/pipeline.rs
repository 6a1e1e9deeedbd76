#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chatguard_domain::{ChatId, MessageId, UserId};
use chatguard_platform::{AdminSource, ChatEvent, EventPayload, FetchError, MessagePayload, UserRef};
use chatguard_util::time::unix_ms_now;
use tracing::{debug, info, warn};

use crate::admin_cache::{AdminCache, DEFAULT_ADMIN_REFRESH_INTERVAL, RefreshOutcome};
use crate::classifier::{RestrictionReason, classify, format_reasons};
use crate::membership::{Departure, record_departure, record_join};
use crate::notice::{DEFAULT_NOTICE_PREFIX, removal_notice};
use crate::registry::{ChatRecord, ChatRegistry};
use crate::trust::{DEFAULT_TRUST_AGE, Trust, TrustEngine};

/// Configuration for `ModerationPipeline`.
#[derive(Debug, Clone)]
pub struct ModerationConfig {
	/// Chats the pipeline acts on; events for other chats are ignored.
	pub moderated_chats: HashSet<ChatId>,

	/// Users trusted in every chat regardless of roster or join time.
	pub admin_overrides: HashSet<UserId>,

	pub trust_age: Duration,

	pub admin_refresh_interval: Duration,

	pub notice_prefix: String,
}

impl Default for ModerationConfig {
	fn default() -> Self {
		Self {
			moderated_chats: HashSet::new(),
			admin_overrides: HashSet::new(),
			trust_age: DEFAULT_TRUST_AGE,
			admin_refresh_interval: DEFAULT_ADMIN_REFRESH_INTERVAL,
			notice_prefix: DEFAULT_NOTICE_PREFIX.to_string(),
		}
	}
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
	ChatGate,
	AdminRefresh,
	MembershipUpdate,
	TrustCheck,
	ContentCheck,
}

impl Stage {
	pub const fn as_str(self) -> &'static str {
		match self {
			Stage::ChatGate => "chat_gate",
			Stage::AdminRefresh => "admin_refresh",
			Stage::MembershipUpdate => "membership_update",
			Stage::TrustCheck => "trust_check",
			Stage::ContentCheck => "content_check",
		}
	}
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Side effect requested from the action layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
	DeleteMessage { chat_id: ChatId, message_id: MessageId },
	SendNotice { chat_id: ChatId, text: String },
}

/// Decision to remove a message from an untrusted sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restriction {
	pub chat_id: ChatId,
	pub message_id: MessageId,
	pub sender: UserRef,
	pub reasons: BTreeSet<RestrictionReason>,
	pub notice: String,
}

impl Restriction {
	/// Delete first, then notify.
	pub fn actions(&self) -> Vec<Action> {
		vec![
			Action::DeleteMessage {
				chat_id: self.chat_id,
				message_id: self.message_id,
			},
			Action::SendNotice {
				chat_id: self.chat_id,
				text: self.notice.clone(),
			},
		]
	}
}

/// Terminal state of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
	/// Chat is not moderated.
	Ignored,

	/// Roster refresh failed; event dropped without a decision.
	RefreshFailed(FetchError),

	/// Join processed; `added` members started their trust clock.
	MembersJoined { added: usize },

	/// Departure processed.
	MemberLeft(Departure),

	/// Message allowed at `stage`.
	Allowed { stage: Stage, trust: Trust },

	/// Message must be deleted and a notice posted.
	Restrict(Restriction),
}

impl Outcome {
	/// Stage at which the run terminated.
	pub fn stage(&self) -> Stage {
		match self {
			Outcome::Ignored => Stage::ChatGate,
			Outcome::RefreshFailed(_) => Stage::AdminRefresh,
			Outcome::MembersJoined { .. } | Outcome::MemberLeft(_) => Stage::MembershipUpdate,
			Outcome::Allowed { stage, .. } => *stage,
			Outcome::Restrict(_) => Stage::ContentCheck,
		}
	}

	pub fn actions(&self) -> Vec<Action> {
		match self {
			Outcome::Restrict(r) => r.actions(),
			_ => Vec::new(),
		}
	}

	pub fn is_restrict(&self) -> bool {
		matches!(self, Outcome::Restrict(_))
	}
}

/// Ordered decision chain: chat gate, admin refresh, membership, trust, content.
pub struct ModerationPipeline {
	moderated_chats: HashSet<ChatId>,
	registry: Arc<ChatRegistry>,
	admin_cache: AdminCache,
	trust: TrustEngine,
	admins: Arc<dyn AdminSource>,
	notice_prefix: String,
}

impl fmt::Debug for ModerationPipeline {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ModerationPipeline")
			.field("moderated_chats", &self.moderated_chats)
			.field("admin_cache", &self.admin_cache)
			.field("trust", &self.trust)
			.finish_non_exhaustive()
	}
}

impl ModerationPipeline {
	pub fn new(cfg: ModerationConfig, registry: Arc<ChatRegistry>, admins: Arc<dyn AdminSource>) -> Self {
		Self {
			moderated_chats: cfg.moderated_chats,
			registry,
			admin_cache: AdminCache::new(cfg.admin_refresh_interval),
			trust: TrustEngine::new(cfg.trust_age, cfg.admin_overrides),
			admins,
			notice_prefix: cfg.notice_prefix,
		}
	}

	pub fn registry(&self) -> &Arc<ChatRegistry> {
		&self.registry
	}

	pub fn trust_engine(&self) -> &TrustEngine {
		&self.trust
	}

	pub fn is_moderated(&self, chat_id: ChatId) -> bool {
		self.moderated_chats.contains(&chat_id)
	}

	/// Run the pipeline against the wall clock.
	pub async fn process(&self, event: &ChatEvent) -> Outcome {
		self.process_at(event, unix_ms_now()).await
	}

	/// Run the pipeline with an explicit `now` (Unix millis).
	///
	/// The chat record stays locked for the whole run, including the roster fetch.
	pub async fn process_at(&self, event: &ChatEvent, now: i64) -> Outcome {
		let chat_id = event.chat_id;

		if !self.is_moderated(chat_id) {
			debug!(chat_id = %chat_id, kind = %event.kind(), "chat is not moderated; ignoring");
			return Outcome::Ignored;
		}

		let handle = self.registry.get_or_create(chat_id);
		let mut record = handle.lock().await;

		match self.admin_cache.refresh_if_due(&mut record, now, self.admins.as_ref()).await {
			Ok(RefreshOutcome::Fresh) => {}
			Ok(RefreshOutcome::Refreshed { admins }) => {
				debug!(chat_id = %chat_id, admins, "admin roster refreshed");
			}
			Err(e) => {
				warn!(chat_id = %chat_id, kind = %event.kind(), error = %e, "admin roster refresh failed; skipping event");
				return Outcome::RefreshFailed(e);
			}
		}

		match &event.payload {
			EventPayload::Join { members } => {
				let mut added = 0;
				for member in members {
					if record_join(&mut record, member.id, now) {
						added += 1;
						info!(
							chat_id = %chat_id,
							user_id = %member.id,
							user = %member.display_name(),
							"member joined; marking as untrusted"
						);
					}
				}
				Outcome::MembersJoined { added }
			}
			EventPayload::Leave { leaver } => {
				let departure = record_departure(&mut record, leaver.id, event.actor_id);
				if departure == Departure::Ejected {
					info!(
						chat_id = %chat_id,
						user_id = %leaver.id,
						user = %leaver.display_name(),
						actor_id = %event.actor_id,
						"member removed by another user; now untrusted"
					);
				}
				Outcome::MemberLeft(departure)
			}
			EventPayload::Message(message) => self.check_message(&mut record, message, now),
		}
	}

	fn check_message(&self, record: &mut ChatRecord, message: &MessagePayload, now: i64) -> Outcome {
		let chat_id = record.chat_id();
		let sender = &message.sender;

		let trust = self.trust.evaluate(record, sender.id, now);
		match trust {
			Trust::ChatAdmin | Trust::OverrideAdmin => {
				debug!(chat_id = %chat_id, user = %sender.display_name(), "message from an admin; ignoring");
			}
			Trust::UnknownJoin => {
				info!(chat_id = %chat_id, user = %sender.display_name(), "join date unknown; considering trusted");
			}
			Trust::Aged { .. } => {
				debug!(chat_id = %chat_id, user = %sender.display_name(), "sender is trusted");
			}
			Trust::Untrusted { remaining_ms, .. } => {
				debug!(chat_id = %chat_id, user = %sender.display_name(), remaining_ms, "sender is not trusted yet");
			}
		}

		if trust.is_trusted() {
			return Outcome::Allowed {
				stage: Stage::TrustCheck,
				trust,
			};
		}

		let reasons = classify(message);
		if reasons.is_empty() {
			return Outcome::Allowed {
				stage: Stage::ContentCheck,
				trust,
			};
		}

		let notice = removal_notice(&self.notice_prefix, sender, &reasons);
		info!(
			chat_id = %chat_id,
			message_id = %message.message_id,
			user_id = %sender.id,
			edited = message.edited,
			reasons = %format_reasons(&reasons),
			"{notice}"
		);

		Outcome::Restrict(Restriction {
			chat_id,
			message_id: message.message_id,
			sender: sender.clone(),
			reasons,
			notice,
		})
	}
}
