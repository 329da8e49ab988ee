//! Feature Resolver
//!
//! Orchestrates one feature resolution: cache check, concurrent dependency
//! fetch, compute, TTL and write-back.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;

use crate::cache::{now_ms, CachedFeatureResult, FeatureEntry};
use crate::engine::config::{EngineConfig, FeatureRegistry};
use crate::engine::error::{ResolveError, ResolveResult};
use crate::engine::gateway::RawDataGateway;
use crate::engine::keys::feature_key;
use crate::engine::provider::ProviderClients;
use crate::engine::ttl::TtlCalculator;
use crate::engine::types::{
    CallerCredentials, DependencyData, FeatureDescriptor, ProviderName, UserRoleConfig,
};
use crate::metrics::EngineMetrics;
use crate::store::StorageGateway;
use crate::usage::ProviderUsageAdapter;

/// Turns assembled dependency data into a feature payload.
pub trait FeatureCompute: Send + Sync {
    fn compute(&self, data: &DependencyData) -> Result<Value, String>;
}

impl<F> FeatureCompute for F
where
    F: Fn(&DependencyData) -> Result<Value, String> + Send + Sync,
{
    fn compute(&self, data: &DependencyData) -> Result<Value, String> {
        self(data)
    }
}

/// Returns the dependency data itself, as an object keyed by dependency name.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCompute;

impl FeatureCompute for PassthroughCompute {
    fn compute(&self, data: &DependencyData) -> Result<Value, String> {
        Ok(Value::Object(data.clone().into_iter().collect()))
    }
}

/// Feature name to compute function mapping.
#[derive(Clone, Default)]
pub struct ComputeRegistry {
    computes: HashMap<String, Arc<dyn FeatureCompute>>,
}

impl ComputeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compute(mut self, feature: impl Into<String>, compute: impl FeatureCompute + 'static) -> Self {
        self.insert(feature, Arc::new(compute));
        self
    }

    /// Register a plain function or closure.
    pub fn with_fn<F>(self, feature: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&DependencyData) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.with_compute(feature, compute)
    }

    pub fn insert(&mut self, feature: impl Into<String>, compute: Arc<dyn FeatureCompute>) {
        self.computes.insert(feature.into(), compute);
    }

    pub fn get(&self, feature: &str) -> Option<&Arc<dyn FeatureCompute>> {
        self.computes.get(feature)
    }

    pub fn contains(&self, feature: &str) -> bool {
        self.computes.contains_key(feature)
    }
}

pub struct FeatureResolver {
    registry: Arc<FeatureRegistry>,
    storage: Arc<dyn StorageGateway>,
    gateway: RawDataGateway,
    computes: ComputeRegistry,
    ttl: TtlCalculator,
    metrics: Option<Arc<EngineMetrics>>,
}

impl FeatureResolver {
    pub fn new(
        registry: Arc<FeatureRegistry>,
        storage: Arc<dyn StorageGateway>,
        usage: Arc<dyn ProviderUsageAdapter>,
        clients: ProviderClients,
        computes: ComputeRegistry,
        config: &EngineConfig,
    ) -> Self {
        Self {
            ttl: TtlCalculator::new(registry.clone(), config),
            gateway: RawDataGateway::new(storage.clone(), usage, clients, config),
            registry,
            storage,
            computes,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.gateway = self.gateway.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn gateway(&self) -> &RawDataGateway {
        &self.gateway
    }

    /// Resolve `feature_name` for a caller with `role` and `credentials`.
    ///
    /// Fresh cached results are returned untouched. Bare legacy payloads are
    /// re-wrapped and stored without fetching. Anything else recomputes.
    pub async fn resolve_feature(
        &self,
        feature_name: &str,
        role: &UserRoleConfig,
        credentials: &CallerCredentials,
    ) -> ResolveResult<CachedFeatureResult> {
        let descriptor = self.registry.require(feature_name)?;
        let _timer = self.metrics.as_ref().map(|m| m.resolve_duration.start_timer());
        let key = feature_key(feature_name);

        let stored = match self.storage.get(&key).await {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!("Feature cache read failed for {}, treating as miss: {}", key, err);
                if let Some(metrics) = &self.metrics {
                    metrics.record_storage_error("read");
                }
                None
            }
        };

        match FeatureEntry::classify(stored, now_ms()) {
            FeatureEntry::Fresh(result) => {
                tracing::debug!("Feature cache hit: {}", feature_name);
                if let Some(metrics) = &self.metrics {
                    metrics.feature_cache_hits_total.inc();
                }
                return Ok(result);
            }
            FeatureEntry::Legacy(payload) => {
                tracing::info!("Migrating legacy cache entry for {}", feature_name);
                if let Some(metrics) = &self.metrics {
                    metrics.legacy_migrations_total.inc();
                }
                return Ok(self.store_result(feature_name, &key, payload, role).await);
            }
            FeatureEntry::Expired(_) => tracing::debug!("Feature cache expired: {}", feature_name),
            FeatureEntry::Malformed => {
                tracing::warn!("Feature cache entry for {} is malformed, recomputing", feature_name)
            }
            FeatureEntry::Missing => tracing::debug!("Feature cache miss: {}", feature_name),
        }

        if let Some(metrics) = &self.metrics {
            metrics.feature_cache_misses_total.inc();
        }

        let compute = self.computes.get(feature_name).ok_or_else(|| {
            ResolveError::configuration(format!("no compute function registered for '{}'", feature_name))
        })?;

        let data = self.fetch_dependencies(descriptor, role, credentials).await?;
        let payload = compute
            .compute(&data)
            .map_err(|message| ResolveError::compute(feature_name, message))?;

        Ok(self.store_result(feature_name, &key, payload, role).await)
    }

    async fn fetch_dependencies(
        &self,
        descriptor: &FeatureDescriptor,
        role: &UserRoleConfig,
        credentials: &CallerCredentials,
    ) -> ResolveResult<DependencyData> {
        let pool: Vec<ProviderName> = descriptor
            .providers
            .iter()
            .filter(|provider| role.authorizes(provider))
            .cloned()
            .collect();

        if pool.len() < descriptor.providers.len() {
            tracing::debug!(
                "Role {} restricts {} to {} of {} providers",
                role.name,
                descriptor.name,
                pool.len(),
                descriptor.providers.len()
            );
        }

        let fetches = descriptor.dependencies.iter().map(|dependency| {
            let pool = &pool;
            async move {
                let data = self
                    .gateway
                    .fetch_raw_dependency(dependency, pool, credentials, descriptor.strategy)
                    .await?;
                Ok::<_, ResolveError>((dependency.name.clone(), data))
            }
        });

        Ok(try_join_all(fetches).await?.into_iter().collect())
    }

    async fn store_result(
        &self,
        feature_name: &str,
        key: &str,
        payload: Value,
        role: &UserRoleConfig,
    ) -> CachedFeatureResult {
        let ttl = self.ttl.calculate(feature_name, role, self.storage.as_ref()).await;
        let result = CachedFeatureResult::new(payload, ttl);

        let written = match serde_json::to_value(&result) {
            Ok(value) => self.storage.set(key, &value, ttl).await,
            Err(err) => Err(err.into()),
        };
        if let Err(err) = written {
            tracing::warn!("Feature cache write failed for {}: {}", key, err);
            if let Some(metrics) = &self.metrics {
                metrics.record_storage_error("write");
            }
        }

        result
    }
}
