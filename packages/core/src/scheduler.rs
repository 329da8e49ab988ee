//! Cache warmer.
//!
//! Periodically resolves a fixed list of features under a service role so
//! their cache entries (the volatility feature above all, which every
//! volatility-aware rotation and TTL calculation reads) rarely go cold.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::time;

use crate::engine::resolver::FeatureResolver;
use crate::engine::types::{CallerCredentials, UserRoleConfig};
use crate::metrics::EngineMetrics;

/// Where the warmer publishes metrics after every tick.
pub struct MetricsExport {
    pub metrics: Arc<EngineMetrics>,
    pub path: PathBuf,
}

impl MetricsExport {
    pub async fn publish(&self) {
        if let Err(err) = self.metrics.write_textfile(&self.path).await {
            tracing::warn!("Cannot write metrics to {}: {}", self.path.display(), err);
        }
    }
}

/// Run the warmer until `Ctrl+C` (SIGINT) is received.
///
/// Each tick resolves every feature in `features`, then publishes metrics
/// when `export` is set. Failures are logged and the loop carries on; a
/// fresh cache entry makes the tick a no-op.
pub async fn run_feature_warmer(
    resolver: Arc<FeatureResolver>,
    features: Vec<String>,
    role: UserRoleConfig,
    credentials: CallerCredentials,
    interval_seconds: u64,
    export: Option<MetricsExport>,
) {
    let shutdown = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Cannot listen for shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
    };
    run_until(resolver, features, role, credentials, interval_seconds, export, shutdown).await;
}

async fn run_until<S>(
    resolver: Arc<FeatureResolver>,
    features: Vec<String>,
    role: UserRoleConfig,
    credentials: CallerCredentials,
    interval_seconds: u64,
    export: Option<MetricsExport>,
    shutdown: S,
) where
    S: Future<Output = ()>,
{
    let mut interval = time::interval(Duration::from_secs(interval_seconds.max(1)));
    tokio::pin!(shutdown);

    tracing::info!(
        "Cache warmer started ({} features, interval: {}s)",
        features.len(),
        interval_seconds
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                warm_once(&resolver, &features, &role, &credentials).await;
                if let Some(export) = &export {
                    export.publish().await;
                }
            }

            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received. Stopping cache warmer.");
                break;
            }
        }
    }

    tracing::info!("Cache warmer stopped cleanly");
}

/// Resolve every feature once. Returns how many resolved successfully.
pub async fn warm_once(
    resolver: &FeatureResolver,
    features: &[String],
    role: &UserRoleConfig,
    credentials: &CallerCredentials,
) -> usize {
    let mut warmed = 0;
    for feature in features {
        match resolver.resolve_feature(feature, role, credentials).await {
            Ok(result) => {
                warmed += 1;
                tracing::debug!(
                    "Warmed {} (ttl {}s)",
                    feature,
                    result.effective_ttl_seconds
                );
            }
            Err(err) => tracing::error!("Cache warmer failed for {}: {}", feature, err),
        }
    }
    warmed
}
