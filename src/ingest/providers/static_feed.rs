// src/ingest/providers/static_feed.rs
use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{PipelineError, Result};
use crate::ingest::types::FeedFetcher;

/// Serves documents from memory, keyed by URL. Unknown URLs fail as transport
/// errors, like an unreachable host. Used for fixtures and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticFeedFetcher {
    documents: HashMap<String, String>,
}

impl StaticFeedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.documents.insert(url.into(), body.into());
        self
    }
}

#[async_trait]
impl FeedFetcher for StaticFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| PipelineError::transport(url, "host unreachable"))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
