// src/dedup/mod.rs
//! Deduplication gate: stable item identities plus a durable seen-set with expiry.

pub mod store;

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{PipelineError, Result};
use crate::ingest::types::FeedItem;

pub use store::{DedupStore, FileDedupStore, MemoryDedupStore};

/// Default retention horizon for dedup records.
pub const DEFAULT_RETENTION_DAYS: i64 = 90;

/// ASCII unit separator between hashed tuple fields.
const SEP: &[u8] = b"\x1f";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemIdentity(String);

impl ItemIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(18);
        &self.0[..end]
    }
}

impl std::fmt::Display for ItemIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupRecord {
    pub item_id: String,
    pub source_url: String,
    pub link: String,
    pub title: String,
    pub processed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DedupRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

fn sha256_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(SEP);
        }
        hasher.update(p);
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Derive the dedup key. A native guid (scoped by source URL) wins; otherwise the
/// key hashes `(source_url, link, published)`.
pub fn identify(item: &FeedItem) -> ItemIdentity {
    match item.guid.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
        Some(guid) => ItemIdentity(format!(
            "g:{}",
            sha256_hex(&[item.source_url.as_bytes(), guid.as_bytes()])
        )),
        None => {
            let published = item
                .published
                .map(|p| p.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default();
            ItemIdentity(format!(
                "h:{}",
                sha256_hex(&[
                    item.source_url.as_bytes(),
                    item.link.as_bytes(),
                    published.as_bytes(),
                ])
            ))
        }
    }
}

fn timed_out(op: &str, after: Duration) -> PipelineError {
    PipelineError::Store(format!("{op} timed out after {after:?}"))
}

/// Gate in front of the durable store. Lookups never default to "new" on failure.
#[derive(Clone)]
pub struct DedupGate {
    store: Arc<dyn DedupStore>,
    retention: chrono::Duration,
    op_timeout: Duration,
}

impl DedupGate {
    pub fn new(store: Arc<dyn DedupStore>, retention_days: i64, op_timeout: Duration) -> Self {
        Self {
            store,
            retention: chrono::Duration::days(retention_days.max(1)),
            op_timeout,
        }
    }

    pub fn identify(&self, item: &FeedItem) -> ItemIdentity {
        identify(item)
    }

    pub async fn exists(&self, id: &ItemIdentity) -> Result<bool> {
        let found = tokio::time::timeout(self.op_timeout, self.store.get(id.as_str()))
            .await
            .map_err(|_| timed_out("lookup", self.op_timeout))??;
        Ok(found.is_some())
    }

    /// Write the record with `expires_at = now + retention`. Re-recording overwrites.
    pub async fn record(&self, id: &ItemIdentity, item: &FeedItem) -> Result<DedupRecord> {
        let now = Utc::now();
        let record = DedupRecord {
            item_id: id.as_str().to_string(),
            source_url: item.source_url.clone(),
            link: item.link.clone(),
            title: item.title.clone(),
            processed_at: now,
            expires_at: now + self.retention,
        };
        tokio::time::timeout(self.op_timeout, self.store.put(record.clone()))
            .await
            .map_err(|_| timed_out("write", self.op_timeout))??;
        tracing::debug!(
            item_id = id.short(),
            expires_at = %record.expires_at,
            "dedup record stored"
        );
        Ok(record)
    }

    /// Best-effort sweep of expired records; failures are only logged. The sweep
    /// touches every record, so it gets ten times the single-operation timeout.
    pub async fn purge_expired(&self) -> usize {
        let budget = self.op_timeout * 10;
        let swept = tokio::time::timeout(budget, self.store.purge_expired(Utc::now()))
            .await
            .map_err(|_| timed_out("purge", budget))
            .and_then(|r| r);
        match swept {
            Ok(n) => {
                if n > 0 {
                    tracing::info!(removed = n, "purged expired dedup records");
                }
                n
            }
            Err(e) => {
                tracing::warn!(error = %e, "dedup purge failed");
                0
            }
        }
    }
}
