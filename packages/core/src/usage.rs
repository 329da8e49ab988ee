//! Per-provider usage counters.
//!
//! Counters are created lazily on first increment and live until reset.
//! Increments must be atomic in the backing store; the engine never
//! retries a failed increment.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::engine::error::StorageResult;
use crate::engine::types::ProviderName;

#[async_trait]
pub trait ProviderUsageAdapter: Send + Sync {
    async fn get_usage(&self, provider: &ProviderName) -> StorageResult<u64>;
    async fn increment_usage(&self, provider: &ProviderName) -> StorageResult<()>;
    async fn reset_usage(&self, provider: &ProviderName) -> StorageResult<()>;
}

/// Ephemeral counters held in process memory.
#[derive(Debug, Default)]
pub struct MemoryUsageAdapter {
    counts: Mutex<HashMap<ProviderName, u64>>,
}

impl MemoryUsageAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a counter, e.g. to reproduce a usage snapshot in tests.
    pub async fn with_usage(self, provider: impl Into<ProviderName>, count: u64) -> Self {
        self.counts.lock().await.insert(provider.into(), count);
        self
    }
}

#[async_trait]
impl ProviderUsageAdapter for MemoryUsageAdapter {
    async fn get_usage(&self, provider: &ProviderName) -> StorageResult<u64> {
        Ok(self.counts.lock().await.get(provider).copied().unwrap_or(0))
    }

    async fn increment_usage(&self, provider: &ProviderName) -> StorageResult<()> {
        *self.counts.lock().await.entry(provider.clone()).or_insert(0) += 1;
        Ok(())
    }

    async fn reset_usage(&self, provider: &ProviderName) -> StorageResult<()> {
        self.counts.lock().await.remove(provider);
        Ok(())
    }
}

/// Read usage for every provider in `pool`. Failed reads count as zero.
pub async fn usage_snapshot(
    adapter: &dyn ProviderUsageAdapter,
    pool: &[ProviderName],
) -> HashMap<ProviderName, u64> {
    let mut snapshot = HashMap::with_capacity(pool.len());
    for provider in pool {
        let count = match adapter.get_usage(provider).await {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!("Usage read failed for {}, assuming 0: {}", provider, err);
                0
            }
        };
        snapshot.insert(provider.clone(), count);
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::StorageError;

    #[tokio::test]
    async fn unknown_provider_has_zero_usage() {
        let adapter = MemoryUsageAdapter::new();
        assert_eq!(adapter.get_usage(&"alpha".into()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn increment_and_reset() {
        let adapter = MemoryUsageAdapter::new();
        let alpha = ProviderName::new("alpha");

        adapter.increment_usage(&alpha).await.unwrap();
        adapter.increment_usage(&alpha).await.unwrap();
        assert_eq!(adapter.get_usage(&alpha).await.unwrap(), 2);

        adapter.reset_usage(&alpha).await.unwrap();
        assert_eq!(adapter.get_usage(&alpha).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let adapter = std::sync::Arc::new(MemoryUsageAdapter::new());
        let alpha = ProviderName::new("alpha");

        let mut handles = Vec::new();
        for _ in 0..50 {
            let adapter = adapter.clone();
            let alpha = alpha.clone();
            handles.push(tokio::spawn(async move {
                adapter.increment_usage(&alpha).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(adapter.get_usage(&alpha).await.unwrap(), 50);
    }

    struct BrokenUsage;

    #[async_trait]
    impl ProviderUsageAdapter for BrokenUsage {
        async fn get_usage(&self, _: &ProviderName) -> StorageResult<u64> {
            Err(StorageError::read("counter store offline"))
        }
        async fn increment_usage(&self, _: &ProviderName) -> StorageResult<()> {
            Err(StorageError::write("counter store offline"))
        }
        async fn reset_usage(&self, _: &ProviderName) -> StorageResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn snapshot_treats_read_failures_as_zero() {
        let pool = vec![ProviderName::new("a"), ProviderName::new("b")];
        let snapshot = usage_snapshot(&BrokenUsage, &pool).await;
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.values().all(|count| *count == 0));
    }

    #[tokio::test]
    async fn seeded_usage_is_visible() {
        let adapter = MemoryUsageAdapter::new().with_usage("beta", 7).await;
        let pool = vec![ProviderName::new("alpha"), ProviderName::new("beta")];
        let snapshot = usage_snapshot(&adapter, &pool).await;
        assert_eq!(snapshot[&ProviderName::new("beta")], 7);
        assert_eq!(snapshot[&ProviderName::new("alpha")], 0);
    }
}
