#![forbid(unsafe_code)]

mod adapters;
mod config;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use chatguard_core::{ChatRegistry, ModerationPipeline};
use chatguard_domain::ChatId;
use chatguard_platform::{EventSource, bounded_event_channel};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::adapters::{DemoSource, DryRunPlatform, JsonLinesSource};
use crate::config::parse_env_bool;
use crate::server::dispatcher::{Dispatcher, DispatcherConfig};

/// Dev-only scripted demo source enable flag.
const CHATGUARD_ENABLE_DEMO_SOURCE_ENV: &str = "CHATGUARD_ENABLE_DEMO_SOURCE";

/// Capacity of the channel between event sources and the dispatcher.
const EVENT_CHANNEL_CAPACITY: usize = 1_024;

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: chatguard_server [--config path]\n\
\n\
Reads chat events as JSON lines on stdin and moderates the configured chats.\n\
\n\
Options:\n\
\t--config  Config file (default: ~/.chatguard/config.toml)\n\
\t--help    Show this help\n\
"
	);
	std::process::exit(2)
}

fn parse_args() -> Option<PathBuf> {
	let mut config_path = None;

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--config" | "-c" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--config must be non-empty");
					usage_and_exit();
				}
				config_path = Some(PathBuf::from(v));
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	config_path
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG")
		.unwrap_or_else(|_| "info,chatguard_server=debug,chatguard_core=debug".to_string());

	let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
		.ok()
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty());
	let base = tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(tracing_subscriber::fmt::layer().with_target(false));

	if let Some(endpoint) = otlp_endpoint {
		use opentelemetry::global;
		use opentelemetry::trace::TracerProvider as _;
		use opentelemetry_otlp::WithExportConfig;

		match opentelemetry_otlp::SpanExporter::builder()
			.with_tonic()
			.with_endpoint(endpoint.clone())
			.build()
		{
			Ok(exporter) => {
				let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
					.with_batch_exporter(exporter)
					.build();
				let tracer = tracer_provider.tracer("chatguard_server");
				global::set_tracer_provider(tracer_provider);

				let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
				base.with(otel_layer).init();
				info!(endpoint = %endpoint, "otlp tracing enabled");
			}
			Err(e) => {
				base.init();
				warn!(error = %e, "failed to initialize otlp tracing");
			}
		}
	} else {
		base.init();
	}
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<std::net::SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
				.with_http_listener(addr)
				.install()
			{
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => {
			warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)");
		}
	}
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		warn!(error = %e, "failed to listen for ctrl-c; running until sources finish");
		std::future::pending::<()>().await;
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();

	let config_path = match parse_args() {
		Some(path) => path,
		None => crate::config::default_config_path()?,
	};
	let cfg = crate::config::load_bot_config_from_path(&config_path)?;
	info!(
		path = %config_path.display(),
		chats = cfg.bot.moderated_chats.len(),
		admin_overrides = cfg.bot.admin_overrides.len(),
		trust_age_secs = cfg.moderation.trust_age.as_secs(),
		"loaded bot config (toml + env overrides)"
	);

	init_metrics(cfg.server.metrics_bind.as_deref());

	if cfg.bot.token.is_some() {
		warn!("bot token configured but no chat transport is built in; actions run in dry-run mode");
	}
	let platform = Arc::new(DryRunPlatform::new());

	let pipeline = Arc::new(ModerationPipeline::new(
		cfg.moderation_config(),
		Arc::new(ChatRegistry::new()),
		platform.clone(),
	));

	let mut sources: Vec<Box<dyn EventSource>> = vec![Box::new(JsonLinesSource::stdin())];

	let demo_enabled = cfg!(debug_assertions)
		&& std::env::var(CHATGUARD_ENABLE_DEMO_SOURCE_ENV)
			.ok()
			.and_then(|v| parse_env_bool(&v))
			.unwrap_or(false);

	if demo_enabled {
		let chat_id = cfg.bot.moderated_chats.iter().next().copied().unwrap_or(ChatId(-1));
		info!(
			env = CHATGUARD_ENABLE_DEMO_SOURCE_ENV,
			chat_id = %chat_id,
			"starting dev-only demo source (enabled by env)"
		);
		sources.push(Box::new(DemoSource::new(chat_id)));
	}

	let (events_tx, events_rx) = bounded_event_channel(EVENT_CHANNEL_CAPACITY);
	for source in sources {
		let name = source.name();
		let tx = events_tx.clone();
		tokio::spawn(async move {
			match source.run(tx).await {
				Ok(()) => info!(source = name, "event source finished"),
				Err(e) => warn!(source = name, error = %e, "event source exited with error"),
			}
		});
	}
	drop(events_tx);

	let dispatcher = Dispatcher::new(
		pipeline,
		platform,
		DispatcherConfig {
			backlog_warn_threshold: cfg.server.chat_backlog_warn,
		},
	);
	dispatcher.run(events_rx, shutdown_signal()).await;

	Ok(())
}
