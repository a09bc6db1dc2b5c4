// src/summarize/backend.rs
//! Generative summarization backends.
//!
//! `OpenAiBackend` speaks the chat-completions protocol (OpenAI or any compatible
//! gateway via `base_url`). `DisabledBackend` is used when no key is configured and
//! sends every item down the extractive path.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{DigestLimits, BULLET_COUNT};
use crate::error::BackendError;
use crate::ingest::types::FeedItem;

/// Output shape requested from the backend; bullet count is checked by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedDigest {
    pub title: String,
    pub bullets: Vec<String>,
    #[serde(alias = "why_it_matters")]
    pub relevance: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Constraints {
    pub language: String,
    pub title_words: usize,
    pub bullet_count: usize,
    pub bullet_words: usize,
    pub relevance_words: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendRequest {
    pub instructions: String,
    pub source_text: String,
    pub constraints: Constraints,
}

impl BackendRequest {
    pub fn build(
        item: &FeedItem,
        limits: &DigestLimits,
        language: &str,
        max_source_chars: usize,
    ) -> Self {
        let constraints = Constraints {
            language: language.to_string(),
            title_words: limits.title_words,
            bullet_count: BULLET_COUNT,
            bullet_words: limits.bullet_words,
            relevance_words: limits.relevance_words,
        };
        let instructions = format!(
            "Summarize the article in {lang}. Reply with a JSON object with keys \
             \"title\" (one line, at most {t} words), \"bullets\" (an array of exactly {n} \
             strings, each at most {b} words) and \"relevance\" (one sentence on why it \
             matters, at most {r} words). Do not add facts that are not in the article.",
            lang = constraints.language,
            t = constraints.title_words,
            n = constraints.bullet_count,
            b = constraints.bullet_words,
            r = constraints.relevance_words,
        );

        let mut source_text = format!("Title: {}\n\n{}", item.title, item.content);
        if source_text.chars().count() > max_source_chars {
            source_text = source_text.chars().take(max_source_chars).collect();
        }

        Self {
            instructions,
            source_text,
            constraints,
        }
    }
}

#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate(&self, request: &BackendRequest) -> Result<GeneratedDigest, BackendError>;
    fn name(&self) -> &'static str;
}

/// Always fails with `Unavailable`.
#[derive(Debug, Clone)]
pub struct DisabledBackend {
    reason: String,
}

impl DisabledBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl GenerativeBackend for DisabledBackend {
    async fn generate(&self, _request: &BackendRequest) -> Result<GeneratedDigest, BackendError> {
        Err(BackendError::Unavailable(self.reason.clone()))
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct OpenAiBackend {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .user_agent(crate::ingest::providers::USER_AGENT)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Unavailable(format!("http client: {e}")))?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

/// Seconds-form `Retry-After`; HTTP-date values are ignored.
pub(crate) fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

pub(crate) fn classify_status(status: StatusCode, retry_after: Option<Duration>) -> BackendError {
    match status.as_u16() {
        401 | 403 => BackendError::Auth {
            status: status.as_u16(),
        },
        429 => BackendError::Throttled { retry_after },
        other => BackendError::Transport(format!("HTTP {other}")),
    }
}

#[async_trait]
impl GenerativeBackend for OpenAiBackend {
    async fn generate(&self, request: &BackendRequest) -> Result<GeneratedDigest, BackendError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &request.instructions,
                },
                Msg {
                    role: "user",
                    content: &request.source_text,
                },
            ],
            temperature: 0.2,
            max_tokens: 400,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status(status, retry_after_secs(resp.headers())));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Malformed(format!("envelope: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        parse_generated(&content)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

fn strip_code_fence(s: &str) -> &str {
    let t = s.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    // drop an optional language tag on the opening fence
    let rest = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Which list markers a bullet may start with. A marker only counts when
/// whitespace follows it, so "-5%" and "3.5 million" are left intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Markers {
    /// `•`, `-`, `*`, `–`
    Symbols,
    /// symbols plus `1.` / `1)` numbering
    SymbolsAndNumbers,
}

/// Text after a leading list marker, or `None` when there is no marker.
fn bullet_body(s: &str, markers: Markers) -> Option<&str> {
    static RE_SYMBOL: OnceCell<Regex> = OnceCell::new();
    static RE_NUMBERED: OnceCell<Regex> = OnceCell::new();
    let re = match markers {
        Markers::Symbols => RE_SYMBOL.get_or_init(|| Regex::new(r"^\s*[•*–-]\s+").unwrap()),
        Markers::SymbolsAndNumbers => RE_NUMBERED
            .get_or_init(|| Regex::new(r"^\s*(?:[•*–-]|\d{1,2}[.)])\s+").unwrap()),
    };
    re.find(s).map(|m| s[m.end()..].trim())
}

fn strip_label<'a>(s: &'a str, labels: &[&str]) -> Option<&'a str> {
    let lower = s.to_lowercase();
    labels.iter().find_map(|label| {
        if lower.starts_with(label) && s.is_char_boundary(label.len()) {
            Some(s[label.len()..].trim())
        } else {
            None
        }
    })
}

/// Line-oriented reply: title line, marked bullets, then a "why it matters:" line.
fn parse_lines(text: &str) -> Option<GeneratedDigest> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let first = lines.next()?;
    let title = strip_label(first, &["title:"]).unwrap_or(first).to_string();

    let mut bullets = Vec::new();
    let mut relevance = String::new();
    for line in lines {
        if let Some(r) = strip_label(line, &["why it matters:", "relevance:"]) {
            relevance = r.to_string();
        } else if let Some(b) = bullet_body(line, Markers::SymbolsAndNumbers) {
            if !b.is_empty() {
                bullets.push(b.to_string());
            }
        }
    }
    if bullets.is_empty() {
        return None;
    }
    Some(GeneratedDigest {
        title,
        bullets,
        relevance,
    })
}

/// Parse backend text into a digest. Accepts a bare or fenced JSON object, or the
/// line format as a last resort.
pub fn parse_generated(content: &str) -> Result<GeneratedDigest, BackendError> {
    let body = strip_code_fence(content);
    if body.is_empty() {
        return Err(BackendError::Malformed("empty reply".into()));
    }

    match serde_json::from_str::<GeneratedDigest>(body) {
        Ok(mut g) => {
            g.title = strip_label(g.title.trim(), &["title:"])
                .unwrap_or(g.title.trim())
                .to_string();
            g.bullets = g
                .bullets
                .iter()
                // numbering is left alone here: in a JSON array it is more
                // likely a figure than a list marker
                .map(|b| bullet_body(b, Markers::Symbols).unwrap_or(b.trim()).to_string())
                .filter(|b| !b.is_empty())
                .collect();
            Ok(g)
        }
        Err(json_err) => parse_lines(body)
            .ok_or_else(|| BackendError::Malformed(format!("not a digest: {json_err}"))),
    }
}
