//! Two-tier storage gateway.
//!
//! The key-value tier expires entries natively. The blob tier never evicts:
//! every write appends a new object named `<key>/<written_at_ms>-<seq>` and
//! records the exact key beside it. A read resolves to the most recently
//! written object whose recorded key equals the requested one; endpoint paths
//! contain `/`, so object names alone are never matched by prefix. Callers
//! validate blob freshness from the envelope metadata.
//!
//! `MemoryStorage` is the in-process realization; `SqliteStorage` in
//! [`crate::repository`] is the persistent one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::cache::now_ms;
use crate::engine::error::StorageResult;

#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Key-value tier read. Expired entries read as `None`.
    async fn get(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Key-value tier write with native expiry.
    async fn set(&self, key: &str, value: &Value, ttl_seconds: u64) -> StorageResult<()>;

    /// Blob tier read: the most recent object written under `key`.
    async fn get_blob(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Blob tier write. `ttl_seconds` is advisory metadata only.
    async fn put_blob(&self, key: &str, value: &Value, ttl_seconds: u64) -> StorageResult<()>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}

/// Name of a blob object written at `written_at_ms`.
pub fn blob_object_name(key: &str, written_at_ms: i64, seq: u64) -> String {
    format!("{}/{:013}-{:06}", key, written_at_ms, seq)
}

/// Longest native expiry the in-memory kv tier will schedule (about 100 years).
pub const MAX_KV_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

/// Expiry instant `ttl_seconds` from now, capped at [`MAX_KV_TTL_SECONDS`].
fn expiry_after(ttl_seconds: u64) -> Instant {
    let now = Instant::now();
    now.checked_add(Duration::from_secs(ttl_seconds.min(MAX_KV_TTL_SECONDS)))
        .or_else(|| now.checked_add(Duration::from_secs(365 * 24 * 60 * 60)))
        .unwrap_or(now)
}

#[derive(Debug, Clone)]
struct KvEntry {
    value: Value,
    expires_at: Instant,
}

#[derive(Debug, Clone)]
struct BlobObject {
    key: String,
    name: String,
    value: Value,
}

/// Operation counts, mainly for tests and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub kv_reads: u64,
    pub kv_writes: u64,
    pub blob_reads: u64,
    pub blob_writes: u64,
}

impl StorageStats {
    pub fn writes(&self) -> u64 {
        self.kv_writes + self.blob_writes
    }
}

#[derive(Default)]
struct AtomicStats {
    kv_reads: AtomicU64,
    kv_writes: AtomicU64,
    blob_reads: AtomicU64,
    blob_writes: AtomicU64,
}

/// In-memory two-tier store.
#[derive(Default)]
pub struct MemoryStorage {
    kv: RwLock<HashMap<String, KvEntry>>,
    blobs: RwLock<Vec<BlobObject>>,
    seq: AtomicU64,
    stats: AtomicStats,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            kv_reads: self.stats.kv_reads.load(Ordering::Relaxed),
            kv_writes: self.stats.kv_writes.load(Ordering::Relaxed),
            blob_reads: self.stats.blob_reads.load(Ordering::Relaxed),
            blob_writes: self.stats.blob_writes.load(Ordering::Relaxed),
        }
    }

    /// Number of blob objects retained under `key` (old ones are never removed).
    pub async fn blob_versions(&self, key: &str) -> usize {
        self.blobs
            .read()
            .await
            .iter()
            .filter(|object| object.key == key)
            .count()
    }

    /// Remaining native TTL of a key-value entry, if present and unexpired.
    pub async fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let kv = self.kv.read().await;
        let entry = kv.get(key)?;
        entry.expires_at.checked_duration_since(Instant::now())
    }
}

#[async_trait]
impl StorageGateway for MemoryStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        self.stats.kv_reads.fetch_add(1, Ordering::Relaxed);
        let mut kv = self.kv.write().await;
        match kv.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => Ok(Some(entry.value.clone())),
            Some(_) => {
                kv.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl_seconds: u64) -> StorageResult<()> {
        self.stats.kv_writes.fetch_add(1, Ordering::Relaxed);
        let expires_at = expiry_after(ttl_seconds);
        self.kv.write().await.insert(
            key.to_string(),
            KvEntry {
                value: value.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get_blob(&self, key: &str) -> StorageResult<Option<Value>> {
        self.stats.blob_reads.fetch_add(1, Ordering::Relaxed);
        let blobs = self.blobs.read().await;
        Ok(blobs
            .iter()
            .rev()
            .find(|object| object.key == key)
            .map(|object| object.value.clone()))
    }

    async fn put_blob(&self, key: &str, value: &Value, _ttl_seconds: u64) -> StorageResult<()> {
        self.stats.blob_writes.fetch_add(1, Ordering::Relaxed);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.blobs.write().await.push(BlobObject {
            key: key.to_string(),
            name: blob_object_name(key, now_ms(), seq),
            value: value.clone(),
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
