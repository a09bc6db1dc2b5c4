// src/pipeline.rs
//! One run: purge, then every enabled source in order, every item strictly
//! `identify → exists? → summarize → publish → record`.
//!
//! Source-level failures (transport, parse) skip the source. Item-level failures
//! (store lookup, undelivered message) skip the item. Nothing here aborts the run.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::Instrument;

use crate::config::{AppConfig, StoreKind};
use crate::dedup::{DedupGate, DedupStore, FileDedupStore, ItemIdentity, MemoryDedupStore};
use crate::error::Result;
use crate::ingest::load_source;
use crate::ingest::providers::HttpFeedFetcher;
use crate::ingest::types::{FeedFetcher, FeedItem, FeedSource};
use crate::notify::{Publisher, TelegramChannel};
use crate::summarize::{DigestSource, Summarizer};

/// Per-item tallies; the same shape is used per source and for the run total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemCounts {
    pub fetched: usize,
    pub skipped_invalid: usize,
    pub duplicates: usize,
    pub summarized_generated: usize,
    pub summarized_fallback: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Subset of `failed`: messages the destination refused for good. They are
    /// recorded so later runs do not resend them.
    pub rejected: usize,
    pub record_failures: usize,
}

impl ItemCounts {
    fn add(&mut self, o: &ItemCounts) {
        self.fetched += o.fetched;
        self.skipped_invalid += o.skipped_invalid;
        self.duplicates += o.duplicates;
        self.summarized_generated += o.summarized_generated;
        self.summarized_fallback += o.summarized_fallback;
        self.delivered += o.delivered;
        self.failed += o.failed;
        self.rejected += o.rejected;
        self.record_failures += o.record_failures;
    }

    pub fn summarized(&self) -> usize {
        self.summarized_generated + self.summarized_fallback
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub url: String,
    pub name: String,
    pub counts: ItemCounts,
    /// Set when the source could not be fetched or parsed.
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
    pub disabled_sources: usize,
    pub purged_records: usize,
    pub totals: ItemCounts,
}

impl RunReport {
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.error.is_some())
    }

    /// Summarized items over fetched items; 0 when nothing was fetched.
    pub fn efficiency_rate(&self) -> f64 {
        ratio(self.totals.summarized(), self.totals.fetched)
    }

    pub fn dedup_rate(&self) -> f64 {
        ratio(self.totals.duplicates, self.totals.fetched)
    }
}

fn ratio(n: usize, d: usize) -> f64 {
    if d == 0 {
        0.0
    } else {
        n as f64 / d as f64
    }
}

enum ItemOutcome {
    Duplicate,
    Delivered { kind: DigestSource, recorded: bool },
    Undelivered { kind: DigestSource },
    Rejected { kind: DigestSource, recorded: bool },
}

pub struct Pipeline {
    fetcher: Arc<dyn FeedFetcher>,
    gate: DedupGate,
    summarizer: Summarizer,
    publisher: Publisher,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn FeedFetcher>,
        gate: DedupGate,
        summarizer: Summarizer,
        publisher: Publisher,
    ) -> Self {
        Self {
            fetcher,
            gate,
            summarizer,
            publisher,
        }
    }

    /// Wire production components. Missing destination credentials fail here,
    /// before any feed is touched.
    pub async fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let token = cfg.telegram.resolve_token()?;
        let channel = TelegramChannel::with_api_base(
            &cfg.telegram.api_base,
            &token,
            cfg.telegram.chat_id.clone(),
            Duration::from_secs(cfg.telegram.timeout_secs.max(1)),
        )?
        .with_parse_mode(cfg.telegram.parse_mode.clone())
        .with_link_preview(cfg.telegram.link_preview);
        tracing::info!(
            chat_id = %cfg.telegram.chat_id,
            token_len = token.len(),
            "telegram destination configured"
        );

        let store: Arc<dyn DedupStore> = match cfg.dedup.kind {
            StoreKind::File => Arc::new(FileDedupStore::open(&cfg.dedup.store_dir).await?),
            StoreKind::Memory => {
                tracing::warn!("in-memory dedup store: items will be re-sent on the next run");
                Arc::new(MemoryDedupStore::new())
            }
        };
        let gate = DedupGate::new(store, cfg.dedup.retention_days, cfg.dedup.op_timeout());

        let backend = cfg.backend.build()?;
        let summarizer = Summarizer::new(backend, cfg.backend.retry_policy(), cfg.limits)
            .with_language(cfg.backend.language.clone())
            .with_max_source_chars(cfg.backend.max_source_chars);

        Ok(Self::new(
            Arc::new(HttpFeedFetcher::new(cfg.fetch_timeout())?),
            gate,
            summarizer,
            Publisher::new(Arc::new(channel), cfg.telegram.retry_policy()),
        ))
    }

    pub async fn run(&self, sources: &[FeedSource]) -> RunReport {
        crate::metrics::ensure_metrics_described();
        let started_at = Utc::now();
        let purged_records = self.gate.purge_expired().await;

        let mut reports = Vec::new();
        let mut disabled_sources = 0usize;
        let mut totals = ItemCounts::default();

        for source in sources {
            if !source.enabled {
                disabled_sources += 1;
                tracing::debug!(source = %source.url, "feed disabled, skipping");
                continue;
            }
            let span = tracing::info_span!("source", source = %source.url);
            let report = self.run_source(source).instrument(span).await;
            totals.add(&report.counts);
            reports.push(report);
        }

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            sources: reports,
            disabled_sources,
            purged_records,
            totals,
        };
        tracing::info!(
            sources = report.sources.len(),
            failed_sources = report.failed_sources().count(),
            disabled_sources = report.disabled_sources,
            fetched = totals.fetched,
            duplicates = totals.duplicates,
            generated = totals.summarized_generated,
            fallback = totals.summarized_fallback,
            delivered = totals.delivered,
            failed = totals.failed,
            rejected = totals.rejected,
            record_failures = totals.record_failures,
            efficiency_rate = report.efficiency_rate(),
            dedup_rate = report.dedup_rate(),
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "run finished"
        );
        report
    }

    async fn run_source(&self, source: &FeedSource) -> SourceReport {
        let mut report = SourceReport {
            url: source.url.clone(),
            name: source.label().to_string(),
            counts: ItemCounts::default(),
            error: None,
        };

        let loaded = match load_source(self.fetcher.as_ref(), source).await {
            Ok(l) => l,
            Err(e) => {
                counter!("digest_feed_errors_total", "kind" => e.kind()).increment(1);
                tracing::error!(source = %source.url, kind = e.kind(), error = %e, "feed skipped");
                report.error = Some(e.to_string());
                return report;
            }
        };
        counter!("digest_feeds_processed_total").increment(1);
        report.counts.fetched = loaded.items.len();
        report.counts.skipped_invalid = loaded.skipped_invalid;

        for item in &loaded.items {
            let id = self.gate.identify(item);
            match self.process_item(&id, item).await {
                Ok(ItemOutcome::Duplicate) => report.counts.duplicates += 1,
                Ok(ItemOutcome::Delivered { kind, recorded }) => {
                    bump_kind(&mut report.counts, kind);
                    report.counts.delivered += 1;
                    if !recorded {
                        report.counts.record_failures += 1;
                    }
                }
                Ok(ItemOutcome::Undelivered { kind }) => {
                    bump_kind(&mut report.counts, kind);
                    report.counts.failed += 1;
                }
                Ok(ItemOutcome::Rejected { kind, recorded }) => {
                    bump_kind(&mut report.counts, kind);
                    report.counts.failed += 1;
                    report.counts.rejected += 1;
                    if !recorded {
                        report.counts.record_failures += 1;
                    }
                }
                Err(e) => {
                    report.counts.failed += 1;
                    tracing::error!(
                        source = %item.source_url,
                        link = %item.link,
                        item_id = id.short(),
                        kind = e.kind(),
                        error = %e,
                        "item skipped"
                    );
                }
            }
        }

        tracing::info!(
            fetched = report.counts.fetched,
            duplicates = report.counts.duplicates,
            delivered = report.counts.delivered,
            failed = report.counts.failed,
            "source done"
        );
        report
    }

    async fn process_item(&self, id: &ItemIdentity, item: &FeedItem) -> Result<ItemOutcome> {
        // lookup failure propagates: an unknown state is never treated as new
        if self.gate.exists(id).await? {
            counter!("digest_items_duplicate_total").increment(1);
            tracing::debug!(item_id = id.short(), link = %item.link, "already delivered");
            return Ok(ItemOutcome::Duplicate);
        }

        let digest = self.summarizer.summarize(item).await;
        let kind = digest.source_kind;
        let outcome = self.publisher.publish(&digest, &item.link).await;
        if outcome.delivered {
            let recorded = self.record(id, item, "delivered").await;
            return Ok(ItemOutcome::Delivered { kind, recorded });
        }
        if outcome.rejected {
            // same text would be refused again; record it so it is not resent every run
            let recorded = self.record(id, item, "rejected").await;
            return Ok(ItemOutcome::Rejected { kind, recorded });
        }
        // throttled or unreachable: left unrecorded so the next run retries it
        Ok(ItemOutcome::Undelivered { kind })
    }

    /// Write the dedup record. A failure is logged and reported as `false`; it may
    /// cause the item to be sent again next run.
    async fn record(&self, id: &ItemIdentity, item: &FeedItem, state: &'static str) -> bool {
        match self.gate.record(id, item).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(
                    source = %item.source_url,
                    link = %item.link,
                    item_id = id.short(),
                    state,
                    error = %e,
                    "item not recorded; may be re-sent next run"
                );
                false
            }
        }
    }
}

fn bump_kind(c: &mut ItemCounts, kind: DigestSource) {
    match kind {
        DigestSource::Generated => c.summarized_generated += 1,
        DigestSource::Fallback => c.summarized_fallback += 1,
    }
}
