use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;

use market_feature_cache::cli::Cli;
use market_feature_cache::config::{Config, FeatureConfigFile};
use market_feature_cache::db::create_pool;
use market_feature_cache::engine::resolver::{ComputeRegistry, FeatureResolver, PassthroughCompute};
use market_feature_cache::engine::types::UserRoleConfig;
use market_feature_cache::error::AppError;
use market_feature_cache::logging::init_logging;
use market_feature_cache::metrics::EngineMetrics;
use market_feature_cache::repository::{SqliteStorage, SqliteUsageAdapter};
use market_feature_cache::scheduler::{run_feature_warmer, MetricsExport};
use market_feature_cache::store::{MemoryStorage, StorageGateway};
use market_feature_cache::usage::{MemoryUsageAdapter, ProviderUsageAdapter};

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    if let Err(err) = run(Cli::parse()).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = Config::from_env().map_err(AppError::Config)?.with_cli(&cli);
    tracing::info!("Service started with config: {:?}", config);

    let file = FeatureConfigFile::load(&config.feature_config_path)?;
    let registry = file.registry()?;
    let engine_config = config.engine_config();
    engine_config.validate()?;

    let (storage, usage): (Arc<dyn StorageGateway>, Arc<dyn ProviderUsageAdapter>) =
        match &config.database_url {
            Some(url) => {
                let pool = create_pool(url).await?;
                (
                    Arc::new(SqliteStorage::new(pool.clone())),
                    Arc::new(SqliteUsageAdapter::new(pool)),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set, cache and usage counters are in-memory only");
                (Arc::new(MemoryStorage::new()), Arc::new(MemoryUsageAdapter::new()))
            }
        };
    tracing::info!("Storage backend: {}", storage.name());

    let mut computes = ComputeRegistry::new();
    for name in registry.names() {
        computes = computes.with_compute(name, PassthroughCompute);
    }

    let metrics = Arc::new(
        EngineMetrics::new().map_err(|err| AppError::Config(format!("metrics: {}", err)))?,
    );
    let resolver = FeatureResolver::new(
        registry.clone(),
        storage,
        usage,
        file.clients(),
        computes,
        &engine_config,
    )
    .with_metrics(metrics.clone());

    let credentials = file.credentials_from_env();
    let role = file
        .role(&cli.role)
        .cloned()
        .ok_or_else(|| AppError::Config(format!("unknown role '{}'", cli.role)))?;

    if let Some(feature) = &cli.feature {
        let result = resolver.resolve_feature(feature, &role, &credentials).await?;
        let rendered = serde_json::to_string_pretty(&result)
            .map_err(|err| AppError::Parse(err.to_string()))?;
        println!("{}", rendered);
        if let Some(path) = &config.metrics_file {
            MetricsExport {
                metrics,
                path: path.clone(),
            }
            .publish()
            .await;
        }
        return Ok(());
    }

    // Passthrough payloads are keyed by dependency name; the volatility
    // feature's dependencies must be named shortTerm and longTerm.
    let features = if registry.get(&engine_config.volatility_feature).is_some() {
        vec![engine_config.volatility_feature.clone()]
    } else {
        tracing::warn!(
            "Volatility feature '{}' is not configured; warming every feature instead",
            engine_config.volatility_feature
        );
        registry.names().map(str::to_string).collect()
    };

    let export = match &config.metrics_file {
        Some(path) => {
            tracing::info!("Publishing metrics to {}", path.display());
            Some(MetricsExport {
                metrics,
                path: path.clone(),
            })
        }
        None => None,
    };

    run_feature_warmer(
        Arc::new(resolver),
        features,
        UserRoleConfig::new("service", 0),
        credentials,
        config.warm_interval_seconds,
        export,
    )
    .await;

    Ok(())
}
