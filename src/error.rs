// src/error.rs
//! Error taxonomy shared by the pipeline stages.
//!
//! Each variant maps to one failure class with its own propagation rule in the
//! orchestrator: transport/parse failures skip a source, store failures skip an
//! item, backend failures never escape the summarizer, throttling is retried and
//! then becomes a delivery failure.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("parse error ({context}): {reason}")]
    Parse { context: String, reason: String },

    #[error("dedup store error: {0}")]
    Store(String),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("destination throttled (retry after {retry_after:?})")]
    Throttle { retry_after: Option<Duration> },

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn transport(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transport {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(context: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    /// Short label used as a structured log field and metric tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Parse { .. } => "parse",
            Self::Store(_) => "store",
            Self::Backend(_) => "backend",
            Self::Throttle { .. } => "throttle",
            Self::Delivery(_) => "delivery",
            Self::Config(_) => "config",
        }
    }
}

/// Failures of the generative summarization backend. All of them are recoverable:
/// the summarizer switches to the extractive path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend transport failure: {0}")]
    Transport(String),

    #[error("backend rejected credentials (HTTP {status})")]
    Auth { status: u16 },

    #[error("backend quota exceeded (retry after {retry_after:?})")]
    Throttled { retry_after: Option<Duration> },

    #[error("malformed backend response: {0}")]
    Malformed(String),
}

/// Failure reported by a delivery channel for a single send attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("throttled by destination (retry after {retry_after:?})")]
    Throttled { retry_after: Option<Duration> },

    #[error("destination rejected message (HTTP {status}): {description}")]
    Rejected { status: u16, description: String },

    #[error("destination transport failure: {0}")]
    Transport(String),
}

impl SendError {
    /// The destination refused this particular message (markup it cannot parse,
    /// text too long). Sending the same text again cannot succeed. Credential or
    /// chat errors (401/403/404) are not included: they affect every message.
    pub fn rejects_message(&self) -> bool {
        matches!(self, SendError::Rejected { status: 400 | 413, .. })
    }
}

impl From<SendError> for PipelineError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::Throttled { retry_after } => PipelineError::Throttle { retry_after },
            other => PipelineError::Delivery(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
