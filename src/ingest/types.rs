// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

fn default_enabled() -> bool {
    true
}

/// A configured feed. Immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedSource {
    pub url: String,
    #[serde(default, alias = "name")]
    pub display_name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl FeedSource {
    pub fn new(url: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            display_name: display_name.into(),
            enabled: true,
        }
    }

    /// Display name, or the URL when none was configured.
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.url
        } else {
            &self.display_name
        }
    }
}

/// Normalized feed entry. `content` is plain text and `link` is never empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
    pub content: String,
    pub source_url: String,
    pub guid: Option<String>,
}

/// Items yielded by one source plus the number of entries rejected during
/// normalization (missing link).
#[derive(Debug, Clone, Default)]
pub struct SourceItems {
    pub items: Vec<FeedItem>,
    pub skipped_invalid: usize,
}

/// Transport seam: returns the raw document body for a URL. Scheme checks and
/// parsing happen in [`crate::ingest::load_source`], so every implementation
/// gets the same contract.
#[async_trait::async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
    fn name(&self) -> &'static str;
}
