//! Raw Data Gateway
//!
//! Resolves one raw dependency: cache lookup across the rotation order,
//! then fetch with failover across the same order, then a single write-back
//! keyed to the provider that actually answered.

use std::sync::Arc;

use serde_json::Value;

use crate::cache::{now_ms, CachedRawDataResult, RawEntry};
use crate::engine::config::EngineConfig;
use crate::engine::error::{ProviderError, ResolveError, ResolveResult, StorageResult};
use crate::engine::keys::raw_key;
use crate::engine::provider::ProviderClients;
use crate::engine::rotation::{OrderedProvider, RotationStrategy};
use crate::engine::types::{CallerCredentials, ProviderName, RawDependency};
use crate::engine::volatility::{current_level, VolatilityLevel};
use crate::metrics::EngineMetrics;
use crate::store::StorageGateway;
use crate::usage::{usage_snapshot, ProviderUsageAdapter};

pub struct RawDataGateway {
    storage: Arc<dyn StorageGateway>,
    usage: Arc<dyn ProviderUsageAdapter>,
    clients: ProviderClients,
    raw_ttl_seconds: u64,
    volatility_feature: String,
    metrics: Option<Arc<EngineMetrics>>,
}

impl RawDataGateway {
    pub fn new(
        storage: Arc<dyn StorageGateway>,
        usage: Arc<dyn ProviderUsageAdapter>,
        clients: ProviderClients,
        config: &EngineConfig,
    ) -> Self {
        Self {
            storage,
            usage,
            clients,
            raw_ttl_seconds: config.raw_data_ttl_seconds,
            volatility_feature: config.volatility_feature.clone(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Attempt order for `pool` under `strategy`, from current usage counts.
    pub async fn rotation_order(
        &self,
        pool: &[ProviderName],
        strategy: RotationStrategy,
    ) -> Vec<OrderedProvider> {
        let usage = usage_snapshot(self.usage.as_ref(), pool).await;
        let level = if strategy.needs_volatility() {
            current_level(self.storage.as_ref(), &self.volatility_feature).await
        } else {
            VolatilityLevel::Normal
        };
        strategy.order(pool, &usage, level)
    }

    /// Return the payload for `dependency`, from cache when any provider in
    /// rotation order holds a fresh copy, otherwise from the first provider
    /// that answers.
    pub async fn fetch_raw_dependency(
        &self,
        dependency: &RawDependency,
        pool: &[ProviderName],
        credentials: &CallerCredentials,
        strategy: RotationStrategy,
    ) -> ResolveResult<Value> {
        let order = self.rotation_order(pool, strategy).await;

        if let Some(data) = self.lookup_cached(dependency, &order).await {
            return Ok(data);
        }

        for entry in &order {
            let provider = &entry.provider;
            let client = self.clients.get(provider).ok_or_else(|| {
                ResolveError::configuration(format!("no client registered for provider '{}'", provider))
            })?;

            if provider.requires_credential() && !credentials.has_key_for(provider) {
                self.note_failover(provider, &ProviderError::MissingCredential, dependency);
                continue;
            }

            match client.fetch(&dependency.endpoint(), credentials).await {
                Ok(data) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_provider_call(provider.as_str(), "success");
                    }
                    self.record_success(dependency, provider, &data).await;
                    return Ok(data);
                }
                Err(err) if err.is_failover() => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_provider_call(provider.as_str(), err.kind());
                    }
                    self.note_failover(provider, &err, dependency);
                }
                Err(err) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_provider_call(provider.as_str(), err.kind());
                    }
                    tracing::warn!(
                        "Provider {} failed critically for {}: {}",
                        provider,
                        dependency.endpoint_path,
                        err
                    );
                    return Err(ResolveError::ProviderCritical {
                        provider: provider.clone(),
                        source: err,
                    });
                }
            }
        }

        Err(ResolveError::exhausted(dependency.endpoint_path.clone()))
    }

    async fn lookup_cached(
        &self,
        dependency: &RawDependency,
        order: &[OrderedProvider],
    ) -> Option<Value> {
        for entry in order {
            let key = self.key_for(dependency, &entry.provider);
            let stored = match self.read(&key, dependency.is_historical).await {
                Ok(stored) => stored,
                Err(err) => {
                    tracing::warn!("Raw cache read failed for {}, treating as miss: {}", key, err);
                    if let Some(metrics) = &self.metrics {
                        metrics.record_storage_error("read");
                    }
                    continue;
                }
            };

            match RawEntry::classify(stored, now_ms()) {
                RawEntry::Fresh(result) => {
                    tracing::debug!("Raw cache hit: {}", key);
                    if let Some(metrics) = &self.metrics {
                        metrics.raw_cache_hits_total.inc();
                    }
                    return Some(result.data);
                }
                RawEntry::Expired => tracing::debug!("Raw cache expired: {}", key),
                RawEntry::Legacy => tracing::debug!("Raw cache entry untyped, ignoring: {}", key),
                RawEntry::Missing => {}
            }
        }
        None
    }

    async fn record_success(&self, dependency: &RawDependency, provider: &ProviderName, data: &Value) {
        if let Err(err) = self.usage.increment_usage(provider).await {
            tracing::warn!("Usage increment failed for {}: {}", provider, err);
        }

        let key = self.key_for(dependency, provider);
        let envelope = CachedRawDataResult::new(data.clone(), self.raw_ttl_seconds);
        let written = match serde_json::to_value(&envelope) {
            Ok(value) => self.write(&key, &value, dependency.is_historical).await,
            Err(err) => Err(err.into()),
        };

        match written {
            Ok(()) => tracing::info!("Fetched {} from {}", dependency.endpoint_path, provider),
            Err(err) => {
                tracing::warn!("Raw cache write failed for {}: {}", key, err);
                if let Some(metrics) = &self.metrics {
                    metrics.record_storage_error("write");
                }
            }
        }
    }

    fn note_failover(&self, provider: &ProviderName, err: &ProviderError, dependency: &RawDependency) {
        tracing::warn!(
            "Provider {} skipped for {} ({}), trying next",
            provider,
            dependency.endpoint_path,
            err
        );
        if let Some(metrics) = &self.metrics {
            metrics.provider_failovers_total.inc();
        }
    }

    fn key_for(&self, dependency: &RawDependency, provider: &ProviderName) -> String {
        raw_key(
            &dependency.endpoint_path,
            provider,
            &dependency.query_params,
            dependency.resource_id.as_deref(),
            dependency.is_historical,
        )
    }

    async fn read(&self, key: &str, historical: bool) -> StorageResult<Option<Value>> {
        if historical {
            self.storage.get_blob(key).await
        } else {
            self.storage.get(key).await
        }
    }

    async fn write(&self, key: &str, value: &Value, historical: bool) -> StorageResult<()> {
        if historical {
            self.storage.put_blob(key, value, self.raw_ttl_seconds).await
        } else {
            self.storage.set(key, value, self.raw_ttl_seconds).await
        }
    }
}
