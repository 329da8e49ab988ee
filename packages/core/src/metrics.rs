//! Prometheus metrics for the resolution engine.
//!
//! [`EngineMetrics`] owns its metrics and the [`Registry`] they belong to.
//! Construct it once at startup, wrap in `Arc`, and attach it to the
//! resolver; the gateway records into the same instance.

use std::io;
use std::path::Path;

use prometheus::{Counter, CounterVec, Histogram, HistogramOpts, Opts, Registry};

/// All engine-level Prometheus metrics.
pub struct EngineMetrics {
    /// Feature lookups served straight from cache.
    pub feature_cache_hits_total: Counter,
    /// Feature lookups that required recomputation.
    pub feature_cache_misses_total: Counter,
    /// Legacy bare feature values re-wrapped without a fetch.
    pub legacy_migrations_total: Counter,
    /// Raw dependency lookups served from cache.
    pub raw_cache_hits_total: Counter,
    /// Provider calls, labelled by provider and outcome.
    pub provider_calls_total: CounterVec,
    /// Providers skipped by rotation failover.
    pub provider_failovers_total: Counter,
    /// Absorbed storage read/write failures, labelled by operation.
    pub storage_errors_total: CounterVec,
    /// End-to-end feature resolution latency in seconds.
    pub resolve_duration: Histogram,
    /// The registry that owns all of the above metrics.
    pub registry: Registry,
}

impl EngineMetrics {
    /// Create and register all metrics. Returns an error if any metric
    /// name is invalid or duplicated (should not happen in practice).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let feature_cache_hits_total = Counter::with_opts(Opts::new(
            "feature_cache_hits_total",
            "Feature lookups served from cache",
        ))?;

        let feature_cache_misses_total = Counter::with_opts(Opts::new(
            "feature_cache_misses_total",
            "Feature lookups that required recomputation",
        ))?;

        let legacy_migrations_total = Counter::with_opts(Opts::new(
            "feature_cache_legacy_migrations_total",
            "Legacy feature values re-wrapped in place",
        ))?;

        let raw_cache_hits_total = Counter::with_opts(Opts::new(
            "raw_cache_hits_total",
            "Raw dependency lookups served from cache",
        ))?;

        let provider_calls_total = CounterVec::new(
            Opts::new(
                "provider_calls_total",
                "Provider calls by provider and outcome",
            ),
            &["provider", "outcome"],
        )?;

        let provider_failovers_total = Counter::with_opts(Opts::new(
            "provider_failovers_total",
            "Providers skipped by rotation failover",
        ))?;

        let storage_errors_total = CounterVec::new(
            Opts::new(
                "storage_errors_total",
                "Absorbed storage failures by operation",
            ),
            &["operation"],
        )?;

        let resolve_duration = Histogram::with_opts(
            HistogramOpts::new(
                "feature_resolve_duration_seconds",
                "Feature resolution latency in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;

        registry.register(Box::new(feature_cache_hits_total.clone()))?;
        registry.register(Box::new(feature_cache_misses_total.clone()))?;
        registry.register(Box::new(legacy_migrations_total.clone()))?;
        registry.register(Box::new(raw_cache_hits_total.clone()))?;
        registry.register(Box::new(provider_calls_total.clone()))?;
        registry.register(Box::new(provider_failovers_total.clone()))?;
        registry.register(Box::new(storage_errors_total.clone()))?;
        registry.register(Box::new(resolve_duration.clone()))?;

        Ok(Self {
            feature_cache_hits_total,
            feature_cache_misses_total,
            legacy_migrations_total,
            raw_cache_hits_total,
            provider_calls_total,
            provider_failovers_total,
            storage_errors_total,
            resolve_duration,
            registry,
        })
    }

    pub fn record_provider_call(&self, provider: &str, outcome: &str) {
        self.provider_calls_total
            .with_label_values(&[provider, outcome])
            .inc();
    }

    pub fn record_storage_error(&self, operation: &str) {
        self.storage_errors_total.with_label_values(&[operation]).inc();
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }

    /// Write the text exposition to `path` for a node_exporter textfile
    /// collector. The file is replaced atomically via a sibling temp file.
    pub async fn write_textfile(&self, path: &Path) -> io::Result<()> {
        let text = self
            .render()
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let tmp = path.with_extension("prom.tmp");
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, path).await
    }
}
