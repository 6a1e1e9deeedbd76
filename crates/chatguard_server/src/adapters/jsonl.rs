#![forbid(unsafe_code)]

use async_trait::async_trait;
use chatguard_platform::{ChatEvent, EventSource, EventTx, validate_chat_event};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info, warn};

/// Reads one JSON-encoded `ChatEvent` per line.
///
/// Blank lines and lines starting with `#` are skipped. Lines that fail to
/// decode or validate are logged and dropped; the source ends at EOF.
pub struct JsonLinesSource {
	reader: Box<dyn AsyncRead + Send + Sync + Unpin>,
}

impl JsonLinesSource {
	pub fn stdin() -> Self {
		Self::from_reader(tokio::io::stdin())
	}

	pub fn from_reader(reader: impl AsyncRead + Send + Sync + Unpin + 'static) -> Self {
		Self {
			reader: Box::new(reader),
		}
	}
}

#[async_trait]
impl EventSource for JsonLinesSource {
	fn name(&self) -> &'static str {
		"jsonl"
	}

	async fn run(self: Box<Self>, events_tx: EventTx) -> anyhow::Result<()> {
		let mut lines = BufReader::new(self.reader).split(b'\n');
		let mut line_no: u64 = 0;
		let mut forwarded: u64 = 0;

		while let Some(raw) = lines.next_segment().await? {
			line_no += 1;
			let line = raw.trim_ascii();
			if line.is_empty() || line.starts_with(b"#") {
				continue;
			}

			let ev: ChatEvent = match serde_json::from_slice(line) {
				Ok(ev) => ev,
				Err(e) => {
					warn!(line = line_no, error = %e, "skipping undecodable event line");
					continue;
				}
			};

			if let Err(e) = validate_chat_event(&ev) {
				warn!(line = line_no, chat_id = %ev.chat_id, error = %e, "skipping invalid event");
				continue;
			}

			if events_tx.send(ev).await.is_err() {
				debug!(line = line_no, "event channel closed; stopping jsonl source");
				break;
			}
			forwarded += 1;
		}

		info!(lines = line_no, forwarded, "jsonl source finished");
		Ok(())
	}
}
