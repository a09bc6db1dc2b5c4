// src/dedup/store.rs
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::fs;

use super::DedupRecord;
use crate::error::{PipelineError, Result};

/// Durable key → record store with write-time expiry. Expired records must read as
/// absent; writes must be idempotent overwrites.
#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<DedupRecord>>;
    async fn put(&self, record: DedupRecord) -> Result<()>;
    /// Remove expired records; returns how many were dropped.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

fn store_err(what: &str, path: &Path, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Store(format!("{what} {}: {e}", path.display()))
}

/// One JSON document per key under `dir`. File names are hashes of the key so any
/// identity string maps to a safe path.
#[derive(Debug, Clone)]
pub struct FileDedupStore {
    dir: PathBuf,
}

impl FileDedupStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| store_err("creating store dir", &dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        let mut name = String::with_capacity(37);
        for b in digest.iter().take(16) {
            use std::fmt::Write as _;
            let _ = write!(&mut name, "{:02x}", b);
        }
        name.push_str(".json");
        self.dir.join(name)
    }

    async fn read_record(path: &Path) -> Result<Option<DedupRecord>> {
        match fs::read_to_string(path).await {
            Ok(s) => serde_json::from_str(&s)
                .map(Some)
                .map_err(|e| store_err("corrupt record", path, e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(store_err("reading", path, e)),
        }
    }

    async fn remove_quietly(path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "could not remove expired record"
                );
            }
        }
    }
}

#[async_trait]
impl DedupStore for FileDedupStore {
    async fn get(&self, key: &str) -> Result<Option<DedupRecord>> {
        let path = self.path_for(key);
        let Some(record) = Self::read_record(&path).await? else {
            return Ok(None);
        };
        if record.item_id != key {
            return Err(store_err("key mismatch in", &path, &record.item_id));
        }
        if record.is_expired(Utc::now()) {
            Self::remove_quietly(&path).await;
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn put(&self, record: DedupRecord) -> Result<()> {
        let path = self.path_for(&record.item_id);
        let tmp = path.with_extension(format!("json.{}.tmp", std::process::id()));
        let json = serde_json::to_vec(&record).map_err(|e| store_err("encoding", &path, e))?;
        fs::write(&tmp, json)
            .await
            .map_err(|e| store_err("writing", &tmp, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| store_err("renaming into", &path, e))?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0usize;
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| store_err("listing", &self.dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| store_err("listing", &self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(Some(rec)) if rec.is_expired(now) => {
                    Self::remove_quietly(&path).await;
                    removed += 1;
                }
                Ok(_) => {}
                // Corrupt files stay put so a lookup surfaces them as store errors.
                Err(e) => tracing::warn!(error = %e, "skipping unreadable record during purge"),
            }
        }
        Ok(removed)
    }
}

/// In-process store with the same expiry semantics. Not durable across runs.
#[derive(Debug, Default)]
pub struct MemoryDedupStore {
    records: Mutex<HashMap<String, DedupRecord>>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, DedupRecord>>> {
        self.records
            .lock()
            .map_err(|_| PipelineError::Store("memory store poisoned".into()))
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn get(&self, key: &str) -> Result<Option<DedupRecord>> {
        let mut map = self.lock()?;
        match map.get(key) {
            Some(rec) if rec.is_expired(Utc::now()) => {
                map.remove(key);
                Ok(None)
            }
            Some(rec) => Ok(Some(rec.clone())),
            None => Ok(None),
        }
    }

    async fn put(&self, record: DedupRecord) -> Result<()> {
        self.lock()?.insert(record.item_id.clone(), record);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut map = self.lock()?;
        let before = map.len();
        map.retain(|_, rec| !rec.is_expired(now));
        Ok(before - map.len())
    }
}
