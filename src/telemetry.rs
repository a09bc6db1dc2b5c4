// src/telemetry.rs
use chrono::{DateTime, Utc};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

impl LogFormat {
    /// `LOG_FORMAT=compact|text|pretty` for humans; JSON otherwise.
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "compact" | "text" | "pretty" => Self::Compact,
            _ => Self::Json,
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the `info` default.
/// Safe to call twice; the second call is a no-op.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    let res = match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// `run_YYYYmmdd_HHMMSS_micros` in UTC.
pub fn run_id_at(now: DateTime<Utc>) -> String {
    now.format("run_%Y%m%d_%H%M%S_%6f").to_string()
}

pub fn run_id() -> String {
    run_id_at(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn run_id_format() {
        let t = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap()
            + chrono::Duration::microseconds(89);
        assert_eq!(run_id_at(t), "run_20250304_050607_000089");
    }
}
