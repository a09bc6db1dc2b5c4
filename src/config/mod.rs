// src/config/mod.rs
//! Run configuration, loaded once at startup and passed down explicitly.
//!
//! Lookup order:
//! 1) $DIGEST_CONFIG_PATH
//! 2) config/digest.toml
//! 3) config/digest.json

pub mod ai;
pub mod secrets;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::dedup::DEFAULT_RETENTION_DAYS;
use crate::ingest::types::FeedSource;
use crate::notify::telegram::DEFAULT_API_BASE;
use crate::retry::{RetryPolicy, RetrySettings};
use crate::summarize::DigestLimits;

pub use ai::BackendConfig;

pub const ENV_CONFIG_PATH: &str = "DIGEST_CONFIG_PATH";
pub const ENV_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
pub const ENV_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";

/// `[telegram]` section.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub chat_id: String,
    /// "ENV" means: read TELEGRAM_BOT_TOKEN
    pub bot_token: String,
    pub parse_mode: String,
    pub link_preview: bool,
    pub timeout_secs: u64,
    pub api_base: String,
    pub retry: RetrySettings,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            chat_id: String::new(),
            bot_token: "ENV".to_string(),
            parse_mode: "HTML".to_string(),
            link_preview: true,
            timeout_secs: 15,
            api_base: DEFAULT_API_BASE.to_string(),
            retry: RetrySettings::default(),
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("chat_id", &self.chat_id)
            .field("parse_mode", &self.parse_mode)
            .field("link_preview", &self.link_preview)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl TelegramConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.into()
    }

    /// The bot token is mandatory; a missing one is fatal.
    pub fn resolve_token(&self) -> Result<String> {
        secrets::resolve(&self.bot_token, ENV_BOT_TOKEN)?.ok_or_else(|| {
            anyhow!(
                "telegram bot token not configured (set {ENV_BOT_TOKEN} or [telegram].bot_token)"
            )
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    File,
    Memory,
}

/// `[dedup]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub kind: StoreKind,
    pub store_dir: PathBuf,
    pub retention_days: i64,
    pub store_timeout_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::File,
            store_dir: PathBuf::from("data/dedup"),
            retention_days: DEFAULT_RETENTION_DAYS,
            store_timeout_secs: 5,
        }
    }
}

impl DedupConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub feeds: Vec<FeedSource>,
    /// Separate feed list (`{ feeds = [...] }`), merged after the inline list.
    pub feeds_path: Option<PathBuf>,
    pub telegram: TelegramConfig,
    pub backend: BackendConfig,
    pub dedup: DedupConfig,
    pub limits: DigestLimits,
    pub fetch_timeout_secs: u64,
    /// Wall-clock guard for the whole run; none means unbounded.
    pub run_budget_secs: Option<u64>,
    /// Prometheus text snapshot written at the end of the run.
    pub metrics_textfile: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            feeds: Vec::new(),
            feeds_path: None,
            telegram: TelegramConfig::default(),
            backend: BackendConfig::default(),
            dedup: DedupConfig::default(),
            limits: DigestLimits::default(),
            fetch_timeout_secs: 30,
            run_budget_secs: None,
            metrics_textfile: None,
        }
    }
}

#[derive(Deserialize)]
struct FeedFile {
    #[serde(default)]
    feeds: Vec<FeedSource>,
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Parse TOML or JSON. The extension decides first; otherwise a leading `{` means JSON.
fn parse_any<T: serde::de::DeserializeOwned>(s: &str, hint_ext: &str) -> Result<T> {
    let looks_json = hint_ext == "json" || (hint_ext != "toml" && s.trim_start().starts_with('{'));
    if looks_json {
        serde_json::from_str(s).context("parsing JSON")
    } else {
        toml::from_str(s).context("parsing TOML")
    }
}

impl AppConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut cfg: AppConfig = parse_any(&content, &extension_of(path))
            .with_context(|| format!("invalid config {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        cfg.finish(base)?;
        Ok(cfg)
    }

    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
        }
        for candidate in ["config/digest.toml", "config/digest.json"] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        bail!("no configuration found (set {ENV_CONFIG_PATH} or create config/digest.toml)")
    }

    /// Merge the feed file, apply env overrides, clamp ranges and validate.
    fn finish(&mut self, base: &Path) -> Result<()> {
        if let Some(rel) = &self.feeds_path {
            let path = if rel.is_absolute() { rel.clone() } else { base.join(rel) };
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading feeds from {}", path.display()))?;
            let file: FeedFile = parse_any(&raw, &extension_of(&path))
                .with_context(|| format!("invalid feeds file {}", path.display()))?;
            self.feeds.extend(file.feeds);
        }

        if let Ok(chat) = std::env::var(ENV_CHAT_ID) {
            if !chat.trim().is_empty() {
                self.telegram.chat_id = chat.trim().to_string();
            }
        }

        self.limits = self.limits.sanitized();
        self.dedup.retention_days = self.dedup.retention_days.max(1);
        self.fetch_timeout_secs = self.fetch_timeout_secs.clamp(1, 300);

        self.validate()
    }

    fn validate(&self) -> Result<()> {
        for f in &self.feeds {
            if !f.url.trim().to_ascii_lowercase().starts_with("https://") {
                tracing::warn!(
                    source = %f.url,
                    "feed url is not https and will be rejected at fetch"
                );
            }
        }
        if self.enabled_feeds().next().is_none() {
            bail!("no enabled feeds configured");
        }
        if self.telegram.chat_id.trim().is_empty() {
            bail!("telegram chat id not configured (set {ENV_CHAT_ID} or [telegram].chat_id)");
        }
        Ok(())
    }

    pub fn enabled_feeds(&self) -> impl Iterator<Item = &FeedSource> {
        self.feeds.iter().filter(|f| f.enabled)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn run_budget(&self) -> Option<Duration> {
        self.run_budget_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }
}
