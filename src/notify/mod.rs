// src/notify/mod.rs
pub mod render;
pub mod telegram;

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;

use crate::error::{PipelineError, SendError};
use crate::retry::RetryPolicy;
use crate::summarize::Digest;

pub use render::render_message;
pub use telegram::TelegramChannel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub link: String,
}

/// One `send` is one delivery attempt; retries are the publisher's job.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), SendError>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub delivered: bool,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// The destination refused this message for good; resending it is pointless.
    pub rejected: bool,
}

pub struct Publisher {
    channel: Arc<dyn DeliveryChannel>,
    retry: RetryPolicy,
}

impl Publisher {
    pub fn new(channel: Arc<dyn DeliveryChannel>, retry: RetryPolicy) -> Self {
        Self { channel, retry }
    }

    pub fn channel_name(&self) -> &'static str {
        self.channel.name()
    }

    /// Render and deliver. Throttling is retried under the policy; any other
    /// failure ends the attempt sequence and is reported in the outcome.
    pub async fn publish(&self, digest: &Digest, link: &str) -> PublishOutcome {
        let message = OutgoingMessage {
            text: render_message(digest, link),
            link: link.to_string(),
        };

        let run = self
            .retry
            .run("publish", |_| self.channel.send(&message))
            .await;
        counter!("digest_publish_attempts_total").increment(u64::from(run.attempts));

        match run.result {
            Ok(()) => {
                counter!("digest_messages_sent_total").increment(1);
                tracing::info!(
                    channel = self.channel.name(),
                    attempts = run.attempts,
                    link,
                    "message delivered"
                );
                PublishOutcome {
                    delivered: true,
                    attempts: run.attempts,
                    last_error: None,
                    rejected: false,
                }
            }
            Err(e) => {
                let rejected = e.rejects_message();
                // throttling that outlived the policy is a delivery failure
                let err = if run.exhausted {
                    PipelineError::Delivery(format!("gave up after {} attempts: {e}", run.attempts))
                } else {
                    PipelineError::from(e)
                };
                counter!("digest_messages_failed_total", "kind" => err.kind()).increment(1);
                tracing::error!(
                    channel = self.channel.name(),
                    attempts = run.attempts,
                    link,
                    rejected,
                    error = %err,
                    "message not delivered"
                );
                PublishOutcome {
                    delivered: false,
                    attempts: run.attempts,
                    last_error: Some(err.to_string()),
                    rejected,
                }
            }
        }
    }
}
