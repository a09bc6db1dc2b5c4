// src/notify/telegram.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{DeliveryChannel, OutgoingMessage};
use crate::error::{PipelineError, SendError};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Bot API `sendMessage` channel for a single chat.
#[derive(Clone)]
pub struct TelegramChannel {
    client: Client,
    endpoint: String,
    chat_id: String,
    parse_mode: String,
    disable_web_page_preview: bool,
}

impl std::fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // endpoint embeds the bot token
        f.debug_struct("TelegramChannel")
            .field("chat_id", &self.chat_id)
            .field("parse_mode", &self.parse_mode)
            .finish_non_exhaustive()
    }
}

impl TelegramChannel {
    pub fn new(
        bot_token: &str,
        chat_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PipelineError> {
        Self::with_api_base(DEFAULT_API_BASE, bot_token, chat_id, timeout)
    }

    pub fn with_api_base(
        api_base: &str,
        bot_token: &str,
        chat_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PipelineError> {
        if bot_token.trim().is_empty() {
            return Err(PipelineError::Config("telegram bot token is empty".into()));
        }
        let chat_id = chat_id.into();
        if chat_id.trim().is_empty() {
            return Err(PipelineError::Config("telegram chat id is empty".into()));
        }
        let client = Client::builder()
            .user_agent(crate::ingest::providers::USER_AGENT)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("building telegram http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                api_base.trim_end_matches('/'),
                bot_token.trim()
            ),
            chat_id,
            parse_mode: "HTML".to_string(),
            disable_web_page_preview: false,
        })
    }

    pub fn with_parse_mode(mut self, mode: impl Into<String>) -> Self {
        self.parse_mode = mode.into();
        self
    }

    pub fn with_link_preview(mut self, enabled: bool) -> Self {
        self.disable_web_page_preview = !enabled;
        self
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ApiReply {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ReplyParameters>,
}

#[derive(Debug, Default, Deserialize)]
struct ReplyParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Map a Bot API reply to a send result. The JSON `parameters.retry_after` wins
/// over the `Retry-After` header.
pub fn classify_response(
    status: u16,
    body: &str,
    retry_after_header: Option<Duration>,
) -> Result<(), SendError> {
    let reply: ApiReply = serde_json::from_str(body).unwrap_or_default();

    if status == 429 {
        let hint = reply
            .parameters
            .and_then(|p| p.retry_after)
            .map(Duration::from_secs)
            .or(retry_after_header);
        return Err(SendError::Throttled { retry_after: hint });
    }
    if (200..300).contains(&status) && reply.ok {
        return Ok(());
    }
    let description = reply.description.unwrap_or_else(|| {
        let trimmed: String = body.chars().take(200).collect();
        if trimmed.is_empty() {
            "no description".to_string()
        } else {
            trimmed
        }
    });
    Err(SendError::Rejected { status, description })
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), SendError> {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text: &message.text,
            parse_mode: &self.parse_mode,
            disable_web_page_preview: self.disable_web_page_preview,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            // without_url keeps the token out of the error text
            .map_err(|e| SendError::Transport(e.without_url().to_string()))?;

        let status = resp.status().as_u16();
        let header_hint = crate::summarize::backend::retry_after_secs(resp.headers());
        let text = resp
            .text()
            .await
            .map_err(|e| SendError::Transport(format!("reading reply: {}", e.without_url())))?;
        classify_response(status, &text, header_hint)
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
