// src/summarize/mod.rs
//! Item → digest. The generative backend is tried first; any failure, or output
//! with the wrong shape, switches to the extractive fallback. Callers always get a
//! digest that satisfies [`DigestLimits`].

pub mod backend;
pub mod extractive;
pub mod relevance;

use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::ingest::types::FeedItem;
use crate::retry::RetryPolicy;

pub use backend::{
    BackendRequest, Constraints, DisabledBackend, GeneratedDigest, GenerativeBackend,
    OpenAiBackend,
};

pub const BULLET_COUNT: usize = 3;

/// Filler for digests whose content yields fewer than three bullets.
pub const PLACEHOLDER_BULLETS: [&str; BULLET_COUNT] = [
    "Summary not available for this item",
    "See the original article for details",
    "More information in the full article",
];

const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DigestSource {
    Generated,
    Fallback,
}

impl DigestSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    pub title: String,
    pub bullets: Vec<String>,
    pub relevance: String,
    pub source_kind: DigestSource,
}

/// Word caps applied to every digest before it leaves the summarizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestLimits {
    pub title_words: usize,
    pub bullet_words: usize,
    pub relevance_words: usize,
}

impl Default for DigestLimits {
    fn default() -> Self {
        Self {
            title_words: 10,
            bullet_words: 15,
            relevance_words: 20,
        }
    }
}

/// Keep the first `max` words. Truncated text gets a trailing ellipsis on the last word.
pub fn clamp_words(s: &str, max: usize) -> String {
    let words: Vec<&str> = s.split_whitespace().collect();
    if words.len() <= max {
        return words.join(" ");
    }
    let mut out = words[..max].join(" ");
    out.push('…');
    out
}

impl DigestLimits {
    /// Pull caps into their allowed ranges: title 1..=10, bullets 15..=30, relevance 1..=20.
    pub fn sanitized(self) -> Self {
        Self {
            title_words: self.title_words.clamp(1, 10),
            bullet_words: self.bullet_words.clamp(15, 30),
            relevance_words: self.relevance_words.clamp(1, 20),
        }
    }

    /// Force the output contract: exactly three non-empty bullets and every field
    /// within its word cap.
    pub fn enforce(&self, digest: Digest) -> Digest {
        let mut title = clamp_words(&digest.title, self.title_words);
        if title.is_empty() {
            title = UNTITLED.to_string();
        }

        let mut bullets: Vec<String> = digest
            .bullets
            .iter()
            .map(|b| clamp_words(b, self.bullet_words))
            .filter(|b| !b.is_empty())
            .take(BULLET_COUNT)
            .collect();
        while bullets.len() < BULLET_COUNT {
            bullets.push(PLACEHOLDER_BULLETS[bullets.len()].to_string());
        }

        let mut relevance = clamp_words(&digest.relevance, self.relevance_words);
        if relevance.is_empty() {
            relevance = clamp_words(relevance::GENERIC_RELEVANCE, self.relevance_words);
        }

        Digest {
            title,
            bullets,
            relevance,
            source_kind: digest.source_kind,
        }
    }
}

/// Per-item states. `UseFallback` is terminal.
#[derive(Debug)]
enum Step {
    TryGenerated,
    UseFallback { reason: &'static str },
}

fn fallback_reason(e: &BackendError) -> &'static str {
    match e {
        BackendError::Unavailable(_) => "unavailable",
        BackendError::Transport(_) => "transport",
        BackendError::Auth { .. } => "auth",
        BackendError::Throttled { .. } => "throttled",
        BackendError::Malformed(_) => "malformed",
    }
}

pub struct Summarizer {
    backend: Arc<dyn GenerativeBackend>,
    retry: RetryPolicy,
    limits: DigestLimits,
    language: String,
    max_source_chars: usize,
}

impl Summarizer {
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        retry: RetryPolicy,
        limits: DigestLimits,
    ) -> Self {
        Self {
            backend,
            retry,
            limits: limits.sanitized(),
            language: "English".to_string(),
            max_source_chars: 8_000,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_max_source_chars(mut self, n: usize) -> Self {
        self.max_source_chars = n.max(200);
        self
    }

    pub fn limits(&self) -> &DigestLimits {
        &self.limits
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    async fn try_generated(&self, item: &FeedItem) -> Result<Digest, &'static str> {
        let request = BackendRequest::build(
            item,
            &self.limits,
            &self.language,
            self.max_source_chars,
        );
        let outcome = self
            .retry
            .run("backend", |_| self.backend.generate(&request))
            .await;

        let generated = match outcome.result {
            Ok(g) => g,
            Err(e) => {
                tracing::warn!(
                    backend = self.backend.name(),
                    attempts = outcome.attempts,
                    link = %item.link,
                    error = %e,
                    "generative summary failed"
                );
                return Err(fallback_reason(&e));
            }
        };

        if generated.bullets.len() != BULLET_COUNT {
            tracing::warn!(
                backend = self.backend.name(),
                bullets = generated.bullets.len(),
                link = %item.link,
                "generated summary has wrong bullet count"
            );
            return Err("bullet_count");
        }

        Ok(self.limits.enforce(Digest {
            title: generated.title,
            bullets: generated.bullets,
            relevance: generated.relevance,
            source_kind: DigestSource::Generated,
        }))
    }

    /// Always returns a digest that satisfies the configured limits.
    pub async fn summarize(&self, item: &FeedItem) -> Digest {
        let mut step = Step::TryGenerated;
        loop {
            step = match step {
                Step::TryGenerated => match self.try_generated(item).await {
                    Ok(digest) => {
                        counter!("digest_items_generated_total").increment(1);
                        tracing::debug!(link = %item.link, "generated summary");
                        return digest;
                    }
                    Err(reason) => Step::UseFallback { reason },
                },
                Step::UseFallback { reason } => {
                    counter!("digest_items_fallback_total", "reason" => reason).increment(1);
                    tracing::info!(link = %item.link, reason, "using extractive summary");
                    return extractive::summarize(item, &self.limits);
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> usize {
        s.split_whitespace().count()
    }

    #[test]
    fn clamp_marks_truncation() {
        assert_eq!(clamp_words("a b c", 3), "a b c");
        assert_eq!(clamp_words("a  b\tc d", 2), "a b…");
        assert_eq!(clamp_words("   ", 3), "");
    }

    #[test]
    fn enforce_fixes_shape() {
        let limits = DigestLimits::default();
        let d = limits.enforce(Digest {
            title: "one two three four five six seven eight nine ten eleven twelve".into(),
            bullets: vec!["x ".repeat(40), "".into(), "ok".into(), "extra".into(), "more".into()],
            relevance: "".into(),
            source_kind: DigestSource::Generated,
        });
        assert_eq!(words(&d.title), 10);
        assert_eq!(d.bullets.len(), 3);
        assert_eq!(words(&d.bullets[0]), 15);
        assert_eq!(d.bullets[1], "ok");
        assert_eq!(d.bullets[2], "extra");
        assert_eq!(d.relevance, relevance::GENERIC_RELEVANCE);
        assert_eq!(d.source_kind, DigestSource::Generated);
    }

    #[test]
    fn enforce_pads_missing_bullets_and_title() {
        let d = DigestLimits::default().enforce(Digest {
            title: " ".into(),
            bullets: vec![],
            relevance: "why".into(),
            source_kind: DigestSource::Fallback,
        });
        assert_eq!(d.title, "Untitled");
        assert_eq!(d.bullets, PLACEHOLDER_BULLETS.map(String::from).to_vec());
    }

    #[test]
    fn limits_are_clamped_into_range() {
        let l = DigestLimits {
            title_words: 50,
            bullet_words: 3,
            relevance_words: 0,
        }
        .sanitized();
        assert_eq!(l.title_words, 10);
        assert_eq!(l.bullet_words, 15);
        assert_eq!(l.relevance_words, 1);
    }

    #[tokio::test]
    async fn disabled_backend_falls_back() {
        let s = Summarizer::new(
            Arc::new(DisabledBackend::new("no api key")),
            RetryPolicy::no_retry(),
            DigestLimits::default(),
        );
        let item = FeedItem {
            title: "T".into(),
            link: "https://example.com/a".into(),
            published: None,
            content: "A reasonably long first sentence about the topic. Another long sentence follows here.".into(),
            source_url: "https://example.com/feed".into(),
            guid: None,
        };
        let d = s.summarize(&item).await;
        assert_eq!(d.source_kind, DigestSource::Fallback);
        assert_eq!(d.bullets.len(), 3);
    }
}
