#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chatguard_core::{ExecutionReport, ModerationPipeline, Outcome, execute_outcome};
use chatguard_domain::ChatId;
use chatguard_platform::{ChatActions, ChatEvent, EventRx, validate_chat_event};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_CHAT_BACKLOG_WARN;

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
	/// Pending events for one chat at which a warning is logged.
	pub backlog_warn_threshold: usize,
}

impl Default for DispatcherConfig {
	fn default() -> Self {
		Self {
			backlog_warn_threshold: DEFAULT_CHAT_BACKLOG_WARN,
		}
	}
}

/// Hand-off queue into one chat worker.
///
/// Sending never waits, so a worker suspended on a roster fetch cannot stall
/// routing for other chats. Back-pressure stays on the shared source channel.
struct ChatQueue {
	tx: mpsc::UnboundedSender<ChatEvent>,
	backlog: Arc<AtomicUsize>,
}

/// Fans events out to one worker task per moderated chat.
///
/// Each worker drains its own queue in arrival order, so events for a chat are
/// processed one at a time while different chats run in parallel.
pub struct Dispatcher {
	cfg: DispatcherConfig,
	pipeline: Arc<ModerationPipeline>,
	actions: Arc<dyn ChatActions>,
	queues: HashMap<ChatId, ChatQueue>,
	workers: JoinSet<()>,
}

impl Dispatcher {
	pub fn new(pipeline: Arc<ModerationPipeline>, actions: Arc<dyn ChatActions>, cfg: DispatcherConfig) -> Self {
		Self {
			cfg,
			pipeline,
			actions,
			queues: HashMap::new(),
			workers: JoinSet::new(),
		}
	}

	/// Number of chats with a live worker.
	pub fn active_chats(&self) -> usize {
		self.queues.len()
	}

	/// Route one event to its chat worker, spawning the worker on first use.
	pub async fn dispatch(&mut self, event: ChatEvent) {
		metrics::counter!("chatguard_events_total").increment(1);

		if let Err(e) = validate_chat_event(&event) {
			metrics::counter!("chatguard_invalid_events_total").increment(1);
			warn!(chat_id = %event.chat_id, kind = %event.kind(), error = %e, "dropping invalid event");
			return;
		}

		let chat_id = event.chat_id;
		if !self.pipeline.is_moderated(chat_id) {
			metrics::counter!("chatguard_ignored_events_total").increment(1);
			debug!(chat_id = %chat_id, kind = %event.kind(), "chat is not moderated; ignoring");
			return;
		}

		if !self.queues.contains_key(&chat_id) {
			let queue = self.spawn_worker(chat_id);
			self.queues.insert(chat_id, queue);
		}
		let Some(queue) = self.queues.get(&chat_id) else {
			return;
		};

		let depth = queue.backlog.fetch_add(1, Ordering::Relaxed) + 1;
		if depth == self.cfg.backlog_warn_threshold {
			warn!(chat_id = %chat_id, depth, "chat backlog is growing; worker is falling behind");
		}

		if let Err(e) = queue.tx.send(event) {
			warn!(chat_id = %chat_id, kind = %e.0.kind(), "chat worker is gone; dropping event");
			self.queues.remove(&chat_id);
		}
	}

	fn spawn_worker(&mut self, chat_id: ChatId) -> ChatQueue {
		let (tx, rx) = mpsc::unbounded_channel();
		let backlog = Arc::new(AtomicUsize::new(0));
		let pipeline = Arc::clone(&self.pipeline);
		let actions = Arc::clone(&self.actions);

		self.workers
			.spawn(chat_worker(chat_id, rx, Arc::clone(&backlog), pipeline, actions));
		debug!(chat_id = %chat_id, "chat worker started");
		ChatQueue { tx, backlog }
	}

	/// Consume `events_rx` until it closes or `shutdown` resolves, then drain.
	pub async fn run(mut self, mut events_rx: EventRx, shutdown: impl Future<Output = ()>) {
		tokio::pin!(shutdown);
		info!("dispatcher started");

		loop {
			tokio::select! {
				ev = events_rx.recv() => {
					let Some(ev) = ev else {
						info!("all event sources finished");
						break;
					};
					self.dispatch(ev).await;
				}

				_ = &mut shutdown => {
					info!("shutdown requested");
					break;
				}
			}
		}

		self.shutdown().await;
	}

	/// Close every chat queue and wait for the workers to finish what is queued.
	pub async fn shutdown(mut self) {
		let chats = self.queues.len();
		self.queues.clear();

		while let Some(res) = self.workers.join_next().await {
			if let Err(e) = res {
				warn!(error = %e, "chat worker panicked");
			}
		}
		info!(chats, "dispatcher drained");
	}
}

async fn chat_worker(
	chat_id: ChatId,
	mut rx: mpsc::UnboundedReceiver<ChatEvent>,
	backlog: Arc<AtomicUsize>,
	pipeline: Arc<ModerationPipeline>,
	actions: Arc<dyn ChatActions>,
) {
	while let Some(event) = rx.recv().await {
		backlog.fetch_sub(1, Ordering::Relaxed);
		let outcome = pipeline.process(&event).await;
		record_outcome(&outcome);
		execute_verdict(&outcome, actions.as_ref()).await;
	}
	debug!(chat_id = %chat_id, "chat worker exiting");
}

fn record_outcome(outcome: &Outcome) {
	match outcome {
		Outcome::Ignored => metrics::counter!("chatguard_ignored_events_total").increment(1),
		Outcome::RefreshFailed(_) => metrics::counter!("chatguard_admin_refresh_failures_total").increment(1),
		Outcome::Restrict(_) => metrics::counter!("chatguard_restrictions_total").increment(1),
		_ => {}
	}
}

/// Carry out the actions of `outcome` once each, counting failures.
pub async fn execute_verdict(outcome: &Outcome, sink: &dyn ChatActions) -> ExecutionReport {
	let report = execute_outcome(outcome, sink).await;
	if !report.failures.is_empty() {
		metrics::counter!("chatguard_action_failures_total").increment(report.failures.len() as u64);
	}
	report
}
