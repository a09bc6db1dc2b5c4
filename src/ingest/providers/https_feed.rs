// src/ingest/providers/https_feed.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{PipelineError, Result};
use crate::ingest::types::FeedFetcher;

/// Downloads feed documents over HTTPS with a bounded per-request timeout.
#[derive(Clone)]
pub struct HttpFeedFetcher {
    client: Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(super::USER_AGENT)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .timeout(timeout)
            .https_only(true)
            .build()
            .map_err(|e| PipelineError::Config(format!("building feed http client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = %e, source = url, "feed http error");
                return Err(PipelineError::transport(url, e));
            }
        };

        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::transport(url, format!("HTTP {status}")));
        }

        resp.text()
            .await
            .map_err(|e| PipelineError::transport(url, format!("reading body: {e}")))
    }

    fn name(&self) -> &'static str {
        "https"
    }
}
