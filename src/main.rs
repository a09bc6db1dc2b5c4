//! feed-digest-bot: batch entrypoint.
//! Loads config once, runs the pipeline over every configured feed, exits.
//! Exit code 1 only for configuration/credential failures or a blown run budget.

use std::process::ExitCode;

use anyhow::{anyhow, Context};
use tracing::Instrument;

use feed_digest_bot::metrics::Metrics;
use feed_digest_bot::telemetry::{self, LogFormat};
use feed_digest_bot::{AppConfig, Pipeline};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing(LogFormat::from_env());

    let run_id = telemetry::run_id();
    let span = tracing::info_span!("run", run_id = %run_id);
    match run().instrument(span).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(run_id = %run_id, error = %format!("{e:#}"), "run aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let cfg = AppConfig::load_default().context("loading configuration")?;
    tracing::info!(
        feeds = cfg.feeds.len(),
        enabled = cfg.enabled_feeds().count(),
        store = ?cfg.dedup.kind,
        "configuration loaded"
    );

    let metrics = match Metrics::install() {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder not installed");
            None
        }
    };

    let pipeline = Pipeline::from_config(&cfg).await.context("building pipeline")?;

    let report = match cfg.run_budget() {
        Some(budget) => tokio::time::timeout(budget, pipeline.run(&cfg.feeds))
            .await
            .map_err(|_| anyhow!("run exceeded its budget of {budget:?}"))?,
        None => pipeline.run(&cfg.feeds).await,
    };

    if let Some(m) = &metrics {
        m.mark_run_finished();
        if let Some(path) = &cfg.metrics_textfile {
            if let Err(e) = m.write_textfile(path) {
                tracing::warn!(path = %path.display(), error = %e, "metrics snapshot not written");
            }
        }
    }

    for failed in report.failed_sources() {
        tracing::warn!(
            source = %failed.url,
            error = failed.error.as_deref().unwrap_or_default(),
            "source failed this run"
        );
    }
    Ok(())
}
