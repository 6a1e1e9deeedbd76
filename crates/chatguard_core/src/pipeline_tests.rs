#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use chatguard_domain::{ChatId, ContentKind, MessageId, UserId};
use chatguard_platform::{
	ActionError, AdminMember, AdminSource, ChatActions, ChatEvent, EntityKind, FetchError, MessageEntity,
	MessagePayload, UserRef,
};
use tokio::sync::Notify;

use crate::actions::execute_outcome;
use crate::classifier::RestrictionReason;
use crate::membership::Departure;
use crate::pipeline::{Action, ModerationConfig, ModerationPipeline, Outcome, Stage};
use crate::registry::{ChatRegistry, MembershipEntry};
use crate::trust::Trust;

const CHAT: ChatId = ChatId(-1001);
const OTHER_CHAT: ChatId = ChatId(-1002);
const ADMIN: UserId = UserId(10);
const OVERRIDE: UserId = UserId(99);
const HOUR_MS: i64 = 3_600_000;
const T0: i64 = 1_700_000_000_000;

static LOG_INIT: OnceLock<()> = OnceLock::new();

fn init_test_logging() {
	LOG_INIT.get_or_init(|| {
		if std::env::var_os("CHATGUARD_TEST_LOG").is_none() {
			return;
		}

		let _ = tracing_subscriber::fmt()
			.with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()))
			.with_target(false)
			.try_init();
	});
}

struct FakeAdmins {
	roster: Vec<AdminMember>,
	calls: AtomicUsize,
	fail: AtomicBool,
}

impl FakeAdmins {
	fn new(ids: &[UserId]) -> Arc<Self> {
		Arc::new(Self {
			roster: ids.iter().map(|id| AdminMember::new(*id, format!("admin{id}"))).collect(),
			calls: AtomicUsize::new(0),
			fail: AtomicBool::new(false),
		})
	}

	fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

#[async_trait::async_trait]
impl AdminSource for FakeAdmins {
	async fn fetch_admins(&self, chat_id: ChatId) -> Result<Vec<AdminMember>, FetchError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if self.fail.swap(false, Ordering::SeqCst) {
			return Err(FetchError::Unavailable {
				chat_id,
				detail: "upstream down".to_string(),
			});
		}
		Ok(self.roster.clone())
	}
}

#[derive(Default)]
struct RecordingActions {
	calls: Mutex<Vec<Action>>,
}

#[async_trait::async_trait]
impl ChatActions for RecordingActions {
	async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), ActionError> {
		self.calls
			.lock()
			.unwrap()
			.push(Action::DeleteMessage { chat_id, message_id });
		Ok(())
	}

	async fn send_notice(&self, chat_id: ChatId, text: &str) -> Result<(), ActionError> {
		self.calls.lock().unwrap().push(Action::SendNotice {
			chat_id,
			text: text.to_string(),
		});
		Ok(())
	}
}

fn config() -> ModerationConfig {
	ModerationConfig {
		moderated_chats: HashSet::from([CHAT, OTHER_CHAT]),
		admin_overrides: HashSet::from([OVERRIDE]),
		trust_age: Duration::from_secs(24 * 3600),
		..ModerationConfig::default()
	}
}

fn pipeline(admins: Arc<FakeAdmins>) -> ModerationPipeline {
	init_test_logging();
	ModerationPipeline::new(config(), Arc::new(ChatRegistry::new()), admins)
}

fn user(id: i64) -> UserRef {
	UserRef::new(UserId(id), format!("user{id}"))
}

fn join(chat: ChatId, id: i64) -> ChatEvent {
	ChatEvent::join(chat, UserId(id), T0, vec![user(id)])
}

fn photo(chat: ChatId, from: i64, message_id: i64) -> ChatEvent {
	ChatEvent::message(
		chat,
		T0,
		MessagePayload::text(MessageId(message_id), user(from)).with_kind(ContentKind::Photo),
	)
}

fn text(chat: ChatId, from: i64, message_id: i64) -> ChatEvent {
	ChatEvent::message(chat, T0, MessagePayload::text(MessageId(message_id), user(from)))
}

async fn since(pipeline: &ModerationPipeline, chat: ChatId, user_id: UserId) -> Option<i64> {
	let handle = pipeline.registry().get(chat)?;
	let record = handle.lock().await;
	record.membership(user_id).map(|e| e.since)
}

#[tokio::test]
async fn untrusted_photo_is_deleted_with_notice() {
	let admins = FakeAdmins::new(&[ADMIN]);
	let p = pipeline(admins);
	let sink = RecordingActions::default();

	p.process_at(&join(CHAT, 5), T0).await;
	let outcome = p.process_at(&photo(CHAT, 5, 77), T0).await;

	let Outcome::Restrict(restriction) = &outcome else {
		panic!("expected restriction, got {outcome:?}");
	};
	assert_eq!(
		restriction.reasons,
		BTreeSet::from([RestrictionReason::Content(ContentKind::Photo)])
	);
	assert!(restriction.notice.contains("photo"), "notice: {}", restriction.notice);

	let report = execute_outcome(&outcome, &sink).await;
	assert!(report.is_clean());

	let calls = sink.calls.lock().unwrap();
	assert_eq!(
		calls[0],
		Action::DeleteMessage {
			chat_id: CHAT,
			message_id: MessageId(77)
		}
	);
	match &calls[1] {
		Action::SendNotice { chat_id, text } => {
			assert_eq!(*chat_id, CHAT);
			assert!(text.contains("photo"));
			assert!(text.contains("user5"));
		}
		other => panic!("expected notice, got {other:?}"),
	}
}

#[tokio::test]
async fn admin_photo_terminates_at_trust_check() {
	let p = pipeline(FakeAdmins::new(&[ADMIN]));

	p.process_at(&join(CHAT, ADMIN.get()), T0).await;
	let outcome = p.process_at(&photo(CHAT, ADMIN.get(), 1), T0).await;

	assert_eq!(
		outcome,
		Outcome::Allowed {
			stage: Stage::TrustCheck,
			trust: Trust::ChatAdmin
		}
	);
	assert!(outcome.actions().is_empty());
}

#[tokio::test]
async fn override_admin_is_trusted_in_every_chat() {
	let p = pipeline(FakeAdmins::new(&[]));

	p.process_at(&join(OTHER_CHAT, OVERRIDE.get()), T0).await;
	let outcome = p.process_at(&photo(OTHER_CHAT, OVERRIDE.get(), 1), T0).await;

	assert_eq!(outcome.stage(), Stage::TrustCheck);
	assert!(!outcome.is_restrict());
}

#[tokio::test]
async fn fetch_failure_skips_event_and_next_event_recovers() {
	let admins = FakeAdmins::new(&[ADMIN]);
	let p = pipeline(Arc::clone(&admins));

	admins.fail.store(true, Ordering::SeqCst);
	let failed = p.process_at(&photo(CHAT, 5, 1), T0).await;
	assert!(matches!(failed, Outcome::RefreshFailed(FetchError::Unavailable { .. })));
	assert!(failed.actions().is_empty());
	assert_eq!(since(&p, CHAT, UserId(5)).await, None, "no later stage ran");

	p.process_at(&join(CHAT, 5), T0 + 1).await;
	let outcome = p.process_at(&photo(CHAT, 5, 2), T0 + 2).await;
	assert!(outcome.is_restrict());
	assert_eq!(admins.calls(), 2);
}

#[tokio::test]
async fn unmoderated_chat_is_ignored_without_state() {
	let admins = FakeAdmins::new(&[]);
	let p = pipeline(Arc::clone(&admins));

	let outcome = p.process_at(&photo(ChatId(-555), 5, 1), T0).await;

	assert_eq!(outcome, Outcome::Ignored);
	assert_eq!(outcome.stage(), Stage::ChatGate);
	assert!(p.registry().get(ChatId(-555)).is_none());
	assert_eq!(admins.calls(), 0);
}

#[tokio::test]
async fn unknown_sender_is_trusted_and_recorded_once() {
	let p = pipeline(FakeAdmins::new(&[]));

	let first = p.process_at(&photo(CHAT, 42, 1), T0).await;
	assert_eq!(
		first,
		Outcome::Allowed {
			stage: Stage::TrustCheck,
			trust: Trust::UnknownJoin
		}
	);
	assert_eq!(since(&p, CHAT, UserId(42)).await, Some(MembershipEntry::UNKNOWN_SINCE));

	let second = p.process_at(&photo(CHAT, 42, 2), T0 + 5).await;
	assert!(matches!(second, Outcome::Allowed { trust: Trust::Aged { since: 0 }, .. }));
}

#[tokio::test]
async fn untrusted_plain_text_is_allowed_at_content_check() {
	let p = pipeline(FakeAdmins::new(&[]));

	p.process_at(&join(CHAT, 5), T0).await;
	let outcome = p.process_at(&text(CHAT, 5, 1), T0 + HOUR_MS).await;

	assert!(matches!(
		outcome,
		Outcome::Allowed {
			stage: Stage::ContentCheck,
			trust: Trust::Untrusted { .. }
		}
	));
}

#[tokio::test]
async fn link_from_new_member_is_restricted_until_trust_age() {
	let p = pipeline(FakeAdmins::new(&[]));
	let with_link = |message_id: i64| {
		ChatEvent::message(
			CHAT,
			T0,
			MessagePayload::text(MessageId(message_id), user(5)).with_entity(MessageEntity::new(EntityKind::Url, 0, 10)),
		)
	};

	p.process_at(&join(CHAT, 5), T0).await;

	let early = p.process_at(&with_link(1), T0 + 24 * HOUR_MS - 1).await;
	assert!(early.is_restrict());

	let later = p.process_at(&with_link(2), T0 + 24 * HOUR_MS).await;
	assert_eq!(later.stage(), Stage::TrustCheck);
}

#[tokio::test]
async fn edited_message_is_moderated_like_new_one() {
	let p = pipeline(FakeAdmins::new(&[]));
	p.process_at(&join(CHAT, 5), T0).await;

	let mut payload = MessagePayload::text(MessageId(9), user(5)).with_kind(ContentKind::Document);
	payload.edited = true;
	let outcome = p.process_at(&ChatEvent::message(CHAT, T0, payload), T0 + 1).await;

	assert!(outcome.is_restrict());
}

#[tokio::test]
async fn duplicate_join_does_not_reset_clock() {
	let p = pipeline(FakeAdmins::new(&[]));

	let first = p.process_at(&join(CHAT, 5), T0).await;
	let second = p.process_at(&join(CHAT, 5), T0 + 10 * HOUR_MS).await;

	assert_eq!(first, Outcome::MembersJoined { added: 1 });
	assert_eq!(second, Outcome::MembersJoined { added: 0 });
	assert_eq!(since(&p, CHAT, UserId(5)).await, Some(T0));
}

#[tokio::test]
async fn self_leave_keeps_entry_and_ejection_removes_it() {
	let p = pipeline(FakeAdmins::new(&[ADMIN]));
	p.process_at(&join(CHAT, 5), T0).await;
	p.process_at(&join(CHAT, 6), T0).await;

	let self_leave = ChatEvent::leave(CHAT, UserId(5), T0, user(5));
	assert_eq!(p.process_at(&self_leave, T0 + 1).await, Outcome::MemberLeft(Departure::SelfLeave));
	assert_eq!(since(&p, CHAT, UserId(5)).await, Some(T0));

	let kick = ChatEvent::leave(CHAT, ADMIN, T0, user(6));
	assert_eq!(p.process_at(&kick, T0 + 1).await, Outcome::MemberLeft(Departure::Ejected));
	assert_eq!(since(&p, CHAT, UserId(6)).await, None);
}

#[tokio::test]
async fn ejected_member_returns_as_unknown_and_is_trusted() {
	let p = pipeline(FakeAdmins::new(&[ADMIN]));
	p.process_at(&join(CHAT, 6), T0).await;
	p.process_at(&ChatEvent::leave(CHAT, ADMIN, T0, user(6)), T0 + 1).await;

	let outcome = p.process_at(&photo(CHAT, 6, 3), T0 + 2).await;
	assert!(matches!(outcome, Outcome::Allowed { trust: Trust::UnknownJoin, .. }));
}

#[tokio::test]
async fn roster_is_fetched_once_per_interval_per_chat() {
	let admins = FakeAdmins::new(&[ADMIN]);
	let p = pipeline(Arc::clone(&admins));

	p.process_at(&text(CHAT, 5, 1), T0).await;
	p.process_at(&text(CHAT, 5, 2), T0 + HOUR_MS).await;
	assert_eq!(admins.calls(), 1);

	p.process_at(&text(OTHER_CHAT, 5, 3), T0).await;
	assert_eq!(admins.calls(), 2);

	p.process_at(&text(CHAT, 5, 4), T0 + HOUR_MS + 1).await;
	assert_eq!(admins.calls(), 3);
}

/// Admin source that parks until released, to hold one chat inside `AdminRefresh`.
struct GatedAdmins {
	entered: Notify,
	release: Notify,
}

#[async_trait::async_trait]
impl AdminSource for GatedAdmins {
	async fn fetch_admins(&self, chat_id: ChatId) -> Result<Vec<AdminMember>, FetchError> {
		if chat_id == CHAT {
			self.entered.notify_one();
			self.release.notified().await;
		}
		Ok(Vec::new())
	}
}

#[tokio::test]
async fn pending_fetch_does_not_block_other_chats() {
	let admins = Arc::new(GatedAdmins {
		entered: Notify::new(),
		release: Notify::new(),
	});
	let p = Arc::new(ModerationPipeline::new(
		config(),
		Arc::new(ChatRegistry::new()),
		Arc::clone(&admins) as Arc<dyn AdminSource>,
	));

	let blocked = {
		let p = Arc::clone(&p);
		tokio::spawn(async move { p.process_at(&join(CHAT, 5), T0).await })
	};
	admins.entered.notified().await;

	let other = tokio::time::timeout(Duration::from_millis(500), p.process_at(&join(OTHER_CHAT, 5), T0))
		.await
		.expect("other chat must not wait for the pending fetch");
	assert_eq!(other, Outcome::MembersJoined { added: 1 });

	let same_chat = {
		let p = Arc::clone(&p);
		tokio::spawn(async move { p.process_at(&photo(CHAT, 5, 1), T0 + 1).await })
	};
	tokio::time::sleep(Duration::from_millis(20)).await;
	assert!(!same_chat.is_finished(), "same chat waits for the in-flight run");

	admins.release.notify_one();
	assert_eq!(blocked.await.unwrap(), Outcome::MembersJoined { added: 1 });
	assert!(same_chat.await.unwrap().is_restrict());
}
