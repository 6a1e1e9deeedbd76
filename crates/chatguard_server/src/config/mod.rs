#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use chatguard_core::ModerationConfig;
use chatguard_core::admin_cache::DEFAULT_ADMIN_REFRESH_INTERVAL;
use chatguard_core::notice::DEFAULT_NOTICE_PREFIX;
use chatguard_core::trust::DEFAULT_TRUST_AGE;
use chatguard_domain::{ChatId, UserId};
use chatguard_platform::SecretString;
use chatguard_util::duration::parse_duration;
use chatguard_util::ids::parse_id_list;
use serde::Deserialize;
use tracing::{info, warn};

/// Pending events in one chat queue at which the dispatcher warns.
pub const DEFAULT_CHAT_BACKLOG_WARN: usize = 256;

/// Default config path: `~/.chatguard/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".chatguard").join("config.toml"))
}

/// Load the bot config from TOML at `path`, then apply env overrides.
///
/// A missing file is not an error; every setting has a default.
pub fn load_bot_config_from_path(path: &Path) -> anyhow::Result<BotConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = BotConfig::from_file(file_cfg).with_context(|| format!("invalid config in {}", path.display()))?;

	apply_env_overrides(&mut cfg);

	if cfg.bot.moderated_chats.is_empty() {
		warn!("no moderated chats configured; every event will be ignored");
	}

	Ok(cfg)
}

#[derive(Debug, Clone, Default)]
pub struct BotConfig {
	pub bot: BotSettings,
	pub moderation: ModerationSettings,
	pub server: ServerSettings,
}

#[derive(Debug, Clone, Default)]
pub struct BotSettings {
	/// Platform bot token. Only reported as present/absent.
	pub token: Option<SecretString>,
	pub moderated_chats: BTreeSet<ChatId>,
	/// Users trusted in every moderated chat.
	pub admin_overrides: BTreeSet<UserId>,
}

#[derive(Debug, Clone)]
pub struct ModerationSettings {
	pub trust_age: Duration,
	pub admin_refresh_interval: Duration,
	pub notice_prefix: String,
}

impl Default for ModerationSettings {
	fn default() -> Self {
		Self {
			trust_age: DEFAULT_TRUST_AGE,
			admin_refresh_interval: DEFAULT_ADMIN_REFRESH_INTERVAL,
			notice_prefix: DEFAULT_NOTICE_PREFIX.to_string(),
		}
	}
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
	pub chat_backlog_warn: usize,
}

impl Default for ServerSettings {
	fn default() -> Self {
		Self {
			metrics_bind: None,
			chat_backlog_warn: DEFAULT_CHAT_BACKLOG_WARN,
		}
	}
}

impl BotConfig {
	pub fn moderation_config(&self) -> ModerationConfig {
		ModerationConfig {
			moderated_chats: self.bot.moderated_chats.iter().copied().collect(),
			admin_overrides: self.bot.admin_overrides.iter().copied().collect(),
			trust_age: self.moderation.trust_age,
			admin_refresh_interval: self.moderation.admin_refresh_interval,
			notice_prefix: self.moderation.notice_prefix.clone(),
		}
	}

	fn from_file(file: FileConfig) -> anyhow::Result<Self> {
		let moderated_chats = nonzero_ids(file.bot.moderated_chats, "moderated_chats");
		let admin_overrides = nonzero_ids(file.bot.admin_overrides, "admin_overrides");

		let trust_age = match (file.moderation.trust_age, file.moderation.trust_age_ms) {
			(Some(s), _) => parse_duration(&s)
				.map_err(|e| anyhow!(e))
				.context("moderation.trust_age")?,
			(None, Some(ms)) => Duration::from_millis(ms),
			(None, None) => DEFAULT_TRUST_AGE,
		};

		let admin_refresh_interval = match file.moderation.admin_refresh_interval {
			Some(s) => parse_duration(&s)
				.map_err(|e| anyhow!(e))
				.context("moderation.admin_refresh_interval")?,
			None => DEFAULT_ADMIN_REFRESH_INTERVAL,
		};

		Ok(Self {
			bot: BotSettings {
				token: file.bot.token.filter(|s| !s.trim().is_empty()).map(SecretString::new),
				moderated_chats: moderated_chats.into_iter().map(ChatId).collect(),
				admin_overrides: admin_overrides.into_iter().map(UserId).collect(),
			},
			moderation: ModerationSettings {
				trust_age,
				admin_refresh_interval,
				notice_prefix: file
					.moderation
					.notice_prefix
					.unwrap_or_else(|| DEFAULT_NOTICE_PREFIX.to_string()),
			},
			server: ServerSettings {
				metrics_bind: file.server.metrics_bind.filter(|s| !s.trim().is_empty()),
				chat_backlog_warn: file
					.server
					.chat_backlog_warn
					.filter(|v| *v > 0)
					.unwrap_or(DEFAULT_CHAT_BACKLOG_WARN),
			},
		})
	}
}

fn nonzero_ids(ids: Vec<i64>, field: &str) -> Vec<i64> {
	let (kept, dropped): (Vec<i64>, Vec<i64>) = ids.into_iter().partition(|id| *id != 0);
	if !dropped.is_empty() {
		warn!(field, dropped = dropped.len(), "ignoring zero ids in config");
	}
	kept
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	bot: FileBotSettings,

	#[serde(default)]
	moderation: FileModerationSettings,

	#[serde(default)]
	server: FileServerSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileBotSettings {
	token: Option<String>,

	#[serde(default)]
	moderated_chats: Vec<i64>,

	#[serde(default)]
	admin_overrides: Vec<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileModerationSettings {
	trust_age: Option<String>,
	trust_age_ms: Option<u64>,
	admin_refresh_interval: Option<String>,
	notice_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileServerSettings {
	metrics_bind: Option<String>,
	chat_backlog_warn: Option<usize>,
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => parse_toml(&s).map(Some),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn parse_toml(s: &str) -> anyhow::Result<FileConfig> {
	toml::from_str(s).context("parse TOML")
}

fn apply_env_overrides(cfg: &mut BotConfig) {
	apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

/// Env overrides with an injectable lookup; invalid values are logged and skipped.
fn apply_overrides_from(cfg: &mut BotConfig, lookup: impl Fn(&str) -> Option<String>) {
	if let Some(v) = lookup("CHATGUARD_BOT_TOKEN") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.bot.token = Some(SecretString::new(v));
			info!("bot config: token overridden by env");
		}
	}

	if let Some(v) = lookup("CHATGUARD_GROUPS") {
		let (ids, rejected) = parse_id_list::<ChatId>(&v);
		if !rejected.is_empty() {
			warn!(?rejected, "bot config: ignoring invalid chat ids in CHATGUARD_GROUPS");
		}
		cfg.bot.moderated_chats = ids.into_iter().collect();
		info!(chats = cfg.bot.moderated_chats.len(), "bot config: moderated_chats overridden by env");
	}

	if let Some(v) = lookup("CHATGUARD_ADMINS") {
		let (ids, rejected) = parse_id_list::<UserId>(&v);
		if !rejected.is_empty() {
			warn!(?rejected, "bot config: ignoring invalid user ids in CHATGUARD_ADMINS");
		}
		cfg.bot.admin_overrides = ids.into_iter().collect();
		info!(admins = cfg.bot.admin_overrides.len(), "bot config: admin_overrides overridden by env");
	}

	if let Some(v) = lookup("CHATGUARD_TRUST_AGE") {
		match parse_duration(&v) {
			Ok(d) => {
				cfg.moderation.trust_age = d;
				info!(trust_age_ms = d.as_millis() as u64, "moderation config: trust_age overridden by env");
			}
			Err(e) => warn!(error = %e, "moderation config: invalid CHATGUARD_TRUST_AGE; keeping configured value"),
		}
	}

	if let Some(v) = lookup("CHATGUARD_ADMIN_REFRESH_INTERVAL") {
		match parse_duration(&v) {
			Ok(d) => {
				cfg.moderation.admin_refresh_interval = d;
				info!(
					interval_ms = d.as_millis() as u64,
					"moderation config: admin_refresh_interval overridden by env"
				);
			}
			Err(e) => warn!(
				error = %e,
				"moderation config: invalid CHATGUARD_ADMIN_REFRESH_INTERVAL; keeping configured value"
			),
		}
	}

	if let Some(v) = lookup("CHATGUARD_METRICS_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.metrics_bind = Some(v);
			info!("server config: metrics_bind overridden by env");
		}
	}
}

pub(crate) fn parse_env_bool(v: &str) -> Option<bool> {
	match v.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}
