// src/retry.rs
//! Retry policy value object and the single executor shared by the publisher and
//! the generative backend call. Only failures that classify themselves as
//! retryable (throttling) are retried; everything else returns immediately.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{BackendError, SendError};

/// What the executor should do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDirective {
    /// Try again, optionally after a server-provided delay.
    Retry { after: Option<Duration> },
    /// Permanent for this call; return the error as is.
    GiveUp,
}

pub trait Retryable {
    fn directive(&self) -> RetryDirective;
}

impl Retryable for SendError {
    fn directive(&self) -> RetryDirective {
        match self {
            SendError::Throttled { retry_after } => RetryDirective::Retry {
                after: *retry_after,
            },
            SendError::Rejected { .. } | SendError::Transport(_) => RetryDirective::GiveUp,
        }
    }
}

impl Retryable for BackendError {
    fn directive(&self) -> RetryDirective {
        match self {
            BackendError::Throttled { retry_after } => RetryDirective::Retry {
                after: *retry_after,
            },
            _ => RetryDirective::GiveUp,
        }
    }
}

/// Exponential backoff: `base_delay * multiplier^retry`, capped at `max_delay`,
/// at most `max_attempts` calls in total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Config-file shape of a [`RetryPolicy`] (durations in milliseconds).
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(s: RetrySettings) -> Self {
        Self {
            max_attempts: s.max_attempts.clamp(1, 10),
            base_delay: Duration::from_millis(s.base_delay_ms),
            multiplier: if s.multiplier.is_finite() && s.multiplier >= 1.0 {
                s.multiplier
            } else {
                2.0
            },
            max_delay: Duration::from_millis(s.max_delay_ms.max(s.base_delay_ms)),
        }
    }
}

/// Result of running an operation under a policy.
#[derive(Debug)]
pub struct Attempted<T, E> {
    pub result: Result<T, E>,
    /// Number of calls actually made (>= 1).
    pub attempts: u32,
    /// True when the last error was retryable but the attempt cap was reached.
    pub exhausted: bool,
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based). A server hint wins but is
    /// still capped at `max_delay`.
    pub fn delay_for(&self, retry: u32, hint: Option<Duration>) -> Duration {
        if let Some(h) = hint {
            return h.min(self.max_delay);
        }
        let factor = self.multiplier.powi(retry.min(62) as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        let cap = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= cap {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Run `op` until it succeeds, returns a non-retryable error, or the attempt
    /// cap is reached. `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Attempted<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match op(attempt).await {
                Ok(v) => {
                    return Attempted {
                        result: Ok(v),
                        attempts: attempt,
                        exhausted: false,
                    }
                }
                Err(e) => e,
            };

            match err.directive() {
                RetryDirective::Retry { after } if attempt < max => {
                    let delay = self.delay_for(attempt - 1, after);
                    tracing::warn!(
                        op = label,
                        attempt,
                        max_attempts = max,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDirective::Retry { .. } => {
                    tracing::warn!(op = label, attempt, error = %err, "retry attempts exhausted");
                    return Attempted {
                        result: Err(err),
                        attempts: attempt,
                        exhausted: true,
                    };
                }
                RetryDirective::GiveUp => {
                    return Attempted {
                        result: Err(err),
                        attempts: attempt,
                        exhausted: false,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(3),
        }
    }

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let p = policy();
        assert_eq!(p.delay_for(0, None), Duration::from_millis(500));
        assert_eq!(p.delay_for(1, None), Duration::from_millis(1_000));
        assert_eq!(p.delay_for(2, None), Duration::from_millis(2_000));
        assert_eq!(p.delay_for(3, None), Duration::from_secs(3));
        assert_eq!(p.delay_for(60, None), Duration::from_secs(3));
    }

    #[test]
    fn server_hint_wins_but_is_capped() {
        let p = policy();
        assert_eq!(
            p.delay_for(0, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
        assert_eq!(
            p.delay_for(0, Some(Duration::from_secs(120))),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn settings_are_sanitized() {
        let p: RetryPolicy = RetrySettings {
            max_attempts: 0,
            base_delay_ms: 200,
            multiplier: 0.5,
            max_delay_ms: 10,
        }
        .into();
        assert_eq!(p.max_attempts, 1);
        assert_eq!(p.multiplier, 2.0);
        assert_eq!(p.max_delay, Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_then_success_is_retried() {
        let calls = AtomicU32::new(0);
        let out = policy()
            .run("test", |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(SendError::Throttled { retry_after: None })
                    } else {
                        Ok("sent")
                    }
                }
            })
            .await;
        assert_eq!(out.result.unwrap(), "sent");
        assert_eq!(out.attempts, 3);
        assert!(!out.exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_is_not_retried() {
        let calls = AtomicU32::new(0);
        let out: Attempted<(), SendError> = policy()
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(SendError::Rejected {
                        status: 400,
                        description: "bad".into(),
                    })
                }
            })
            .await;
        assert!(out.result.is_err());
        assert_eq!(out.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn throttling_stops_at_cap() {
        let out: Attempted<(), BackendError> = policy()
            .run("test", |_| async {
                Err(BackendError::Throttled {
                    retry_after: Some(Duration::from_secs(1)),
                })
            })
            .await;
        assert_eq!(out.attempts, 4);
        assert!(out.exhausted);
    }
}
