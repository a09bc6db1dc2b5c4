// src/metrics.rs
use std::path::Path;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// Register descriptions for every series the pipeline emits. Idempotent.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("digest_feeds_processed_total", "Feeds fetched and parsed successfully.");
        describe_counter!("digest_feed_errors_total", "Feed fetch/parse failures, by kind.");
        describe_counter!("digest_items_fetched_total", "Items yielded by feed normalization.");
        describe_counter!("digest_items_duplicate_total", "Items skipped as already delivered.");
        describe_counter!(
            "digest_items_generated_total",
            "Digests produced by the generative backend."
        );
        describe_counter!(
            "digest_items_fallback_total",
            "Digests produced by the extractive fallback, by reason."
        );
        describe_counter!("digest_messages_sent_total", "Messages delivered to the destination.");
        describe_counter!("digest_messages_failed_total", "Messages not delivered, by kind.");
        describe_counter!("digest_publish_attempts_total", "Destination send attempts.");
        describe_histogram!("digest_feed_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("digest_last_run_ts", "Unix ts when the last run finished.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if one is already installed.
    pub fn install() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    pub fn mark_run_finished(&self) {
        gauge!("digest_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Write the exposition text for a node-exporter textfile collector
    /// (tmp file + rename so scrapers never see a partial file).
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, self.render())
            .with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
        Ok(())
    }
}
