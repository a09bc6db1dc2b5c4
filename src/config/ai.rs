// src/config/ai.rs
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::secrets;
use crate::retry::{RetryPolicy, RetrySettings};
use crate::summarize::backend::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::summarize::{DisabledBackend, GenerativeBackend, OpenAiBackend};

/// `[backend]` section.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub enabled: bool,
    /// Only "openai" (any chat-completions compatible endpoint) is supported.
    pub provider: String,
    pub model: String,
    pub base_url: String,
    /// "ENV" means: read OPENAI_API_KEY
    pub api_key: String,
    pub language: String,
    pub timeout_secs: u64,
    pub max_source_chars: usize,
    pub retry: RetrySettings,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "openai".to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: "ENV".to_string(),
            language: "English".to_string(),
            timeout_secs: 20,
            max_source_chars: 8_000,
            retry: RetrySettings::default(),
        }
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("enabled", &self.enabled)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("language", &self.language)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl BackendConfig {
    pub fn env_var(&self) -> &'static str {
        "OPENAI_API_KEY"
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.into()
    }

    /// Build the backend. A disabled section, an unknown provider or a missing key
    /// all give a `DisabledBackend` (fallback-only run) plus a warning; an unreadable
    /// secret file is an error.
    pub fn build(&self) -> anyhow::Result<Arc<dyn GenerativeBackend>> {
        if !self.enabled {
            tracing::info!("generative backend disabled in config");
            return Ok(Arc::new(DisabledBackend::new("disabled in config")));
        }
        if !self.provider.eq_ignore_ascii_case("openai") {
            tracing::warn!(
                provider = %self.provider,
                "unsupported backend provider, using extractive summaries only"
            );
            return Ok(Arc::new(DisabledBackend::new("unsupported provider")));
        }
        let Some(key) = secrets::resolve(&self.api_key, self.env_var())? else {
            tracing::warn!(
                env = self.env_var(),
                "no backend api key, using extractive summaries only"
            );
            return Ok(Arc::new(DisabledBackend::new("no api key")));
        };
        tracing::info!(
            model = %self.model,
            key_len = key.len(),
            "generative backend configured"
        );
        let backend = OpenAiBackend::new(
            &self.base_url,
            &self.model,
            &key,
            Duration::from_secs(self.timeout_secs.max(1)),
        )?;
        Ok(Arc::new(backend))
    }
}
