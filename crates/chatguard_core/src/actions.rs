#![forbid(unsafe_code)]

use chatguard_platform::{ActionError, ChatActions};
use tracing::{debug, warn};

use crate::pipeline::{Action, Outcome};

/// What happened when executing a verdict's actions.
#[derive(Debug, Default)]
pub struct ExecutionReport {
	pub succeeded: usize,
	pub failures: Vec<(Action, ActionError)>,
}

impl ExecutionReport {
	pub fn is_clean(&self) -> bool {
		self.failures.is_empty()
	}
}

/// Execute each action once, in order. Failures are logged and collected; nothing is retried.
pub async fn execute_actions(actions: &[Action], sink: &dyn ChatActions) -> ExecutionReport {
	let mut report = ExecutionReport::default();

	for action in actions {
		let res = match action {
			Action::DeleteMessage { chat_id, message_id } => sink.delete_message(*chat_id, *message_id).await,
			Action::SendNotice { chat_id, text } => sink.send_notice(*chat_id, text).await,
		};

		match res {
			Ok(()) => {
				debug!(?action, "action executed");
				report.succeeded += 1;
			}
			Err(e) => {
				warn!(?action, error = %e, "action failed; not retrying");
				report.failures.push((action.clone(), e));
			}
		}
	}

	report
}

/// Execute the actions implied by `outcome` (none unless it restricts).
pub async fn execute_outcome(outcome: &Outcome, sink: &dyn ChatActions) -> ExecutionReport {
	execute_actions(&outcome.actions(), sink).await
}
