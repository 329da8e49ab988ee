//! Configuration for the feature resolution engine

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::engine::error::{ResolveError, ResolveResult};
use crate::engine::types::{FeatureDescriptor, ProviderName};
use crate::engine::volatility::VolatilityMultipliers;

/// Default lifetime of a raw provider payload.
pub const DEFAULT_RAW_DATA_TTL_SECONDS: u64 = 300;

/// Feature whose cached value carries the market volatility classification.
pub const DEFAULT_VOLATILITY_FEATURE: &str = "volatility_current";

/// Engine-wide tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_raw_ttl")]
    pub raw_data_ttl_seconds: u64,
    #[serde(default = "default_volatility_feature")]
    pub volatility_feature: String,
    #[serde(default)]
    pub multipliers: VolatilityMultipliers,
}

fn default_raw_ttl() -> u64 {
    DEFAULT_RAW_DATA_TTL_SECONDS
}

fn default_volatility_feature() -> String {
    DEFAULT_VOLATILITY_FEATURE.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            raw_data_ttl_seconds: DEFAULT_RAW_DATA_TTL_SECONDS,
            volatility_feature: default_volatility_feature(),
            multipliers: VolatilityMultipliers::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> ResolveResult<()> {
        self.multipliers.validate().map_err(ResolveError::configuration)?;
        if self.volatility_feature.trim().is_empty() {
            return Err(ResolveError::configuration("volatility feature name is empty"));
        }
        Ok(())
    }
}

/// Read-only table of feature descriptors, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct FeatureRegistry {
    features: HashMap<String, FeatureDescriptor>,
}

impl FeatureRegistry {
    /// Build a registry, rejecting inconsistent descriptors.
    pub fn new(descriptors: Vec<FeatureDescriptor>) -> ResolveResult<Self> {
        let mut features = HashMap::with_capacity(descriptors.len());

        for descriptor in descriptors {
            validate_descriptor(&descriptor)?;
            let name = descriptor.name.clone();
            if features.insert(name.clone(), descriptor).is_some() {
                return Err(ResolveError::configuration(format!(
                    "feature '{}' is defined more than once",
                    name
                )));
            }
        }

        Ok(Self { features })
    }

    pub fn get(&self, name: &str) -> Option<&FeatureDescriptor> {
        self.features.get(name)
    }

    /// Look up a feature, failing with a configuration error when unknown.
    pub fn require(&self, name: &str) -> ResolveResult<&FeatureDescriptor> {
        self.get(name)
            .ok_or_else(|| ResolveError::configuration(format!("unknown feature '{}'", name)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Check that every pooled provider is one of `known`.
    pub fn check_providers<F>(&self, is_known: F) -> ResolveResult<()>
    where
        F: Fn(&ProviderName) -> bool,
    {
        for descriptor in self.features.values() {
            if let Some(unknown) = descriptor.providers.iter().find(|p| !is_known(p)) {
                return Err(ResolveError::configuration(format!(
                    "feature '{}' references undeclared provider '{}'",
                    descriptor.name, unknown
                )));
            }
        }
        Ok(())
    }
}

fn validate_descriptor(descriptor: &FeatureDescriptor) -> ResolveResult<()> {
    let name = &descriptor.name;

    if name.trim().is_empty() {
        return Err(ResolveError::configuration("feature name is empty"));
    }
    if descriptor.providers.is_empty() {
        return Err(ResolveError::configuration(format!(
            "feature '{}' has an empty provider pool",
            name
        )));
    }
    for (i, provider) in descriptor.providers.iter().enumerate() {
        if descriptor.providers[..i].contains(provider) {
            return Err(ResolveError::configuration(format!(
                "feature '{}' lists provider '{}' twice",
                name, provider
            )));
        }
    }

    let ttl = descriptor.ttl;
    if ttl.min > ttl.max {
        return Err(ResolveError::configuration(format!(
            "feature '{}' has ttl min {} above max {}",
            name, ttl.min, ttl.max
        )));
    }
    if let Some(default) = ttl.default {
        if default < ttl.min || default > ttl.max {
            return Err(ResolveError::configuration(format!(
                "feature '{}' has default ttl {} outside [{}, {}]",
                name, default, ttl.min, ttl.max
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rotation::RotationStrategy;
    use crate::engine::types::{RawDependency, TtlBounds};

    fn descriptor(name: &str) -> FeatureDescriptor {
        FeatureDescriptor {
            name: name.to_string(),
            dependencies: vec![RawDependency::new("ticker", "/v1/ticker")],
            providers: vec![ProviderName::new("alpha")],
            ttl: TtlBounds::new(30, 300),
            strategy: RotationStrategy::LowestUsageFirst,
        }
    }

    #[test]
    fn registry_looks_up_by_name() {
        let registry = FeatureRegistry::new(vec![descriptor("a"), descriptor("b")]).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.require("a").is_ok());
    }

    #[test]
    fn unknown_feature_is_configuration_error() {
        let registry = FeatureRegistry::new(vec![descriptor("a")]).unwrap();
        assert!(matches!(
            registry.require("zzz"),
            Err(ResolveError::Configuration { .. })
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        assert!(FeatureRegistry::new(vec![descriptor("a"), descriptor("a")]).is_err());
    }

    #[test]
    fn empty_pool_is_rejected() {
        let mut d = descriptor("a");
        d.providers.clear();
        assert!(FeatureRegistry::new(vec![d]).is_err());
    }

    #[test]
    fn duplicate_pool_member_is_rejected() {
        let mut d = descriptor("a");
        d.providers.push(ProviderName::new("alpha"));
        assert!(FeatureRegistry::new(vec![d]).is_err());
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let mut d = descriptor("a");
        d.ttl = TtlBounds::new(300, 30);
        assert!(FeatureRegistry::new(vec![d]).is_err());

        let mut d = descriptor("b");
        d.ttl = TtlBounds::new(30, 300).with_default(500);
        assert!(FeatureRegistry::new(vec![d]).is_err());
    }

    #[test]
    fn undeclared_provider_is_reported() {
        let registry = FeatureRegistry::new(vec![descriptor("a")]).unwrap();
        assert!(registry.check_providers(|p| p.as_str() == "alpha").is_ok());
        assert!(registry.check_providers(|p| p.as_str() == "beta").is_err());
    }

    #[test]
    fn engine_config_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.raw_data_ttl_seconds, 300);
        assert_eq!(config.volatility_feature, "volatility_current");
        assert!(config.validate().is_ok());
    }
}
