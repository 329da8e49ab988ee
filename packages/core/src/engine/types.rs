//! Core data types for feature resolution

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::rotation::RotationStrategy;

/// Identifier of an external data provider.
///
/// Providers that work without an API key carry a "nokey" marker in their
/// name (`coingecko-nokey`, `binance_no_key`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderName(String);

impl ProviderName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn requires_credential(&self) -> bool {
        let normalized: String = self
            .0
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        !normalized.contains("nokey")
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Per-request API keys, indexed by provider.
#[derive(Clone, Default)]
pub struct CallerCredentials {
    keys: HashMap<ProviderName, String>,
}

impl CallerCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, provider: impl Into<ProviderName>, key: impl Into<String>) -> Self {
        self.keys.insert(provider.into(), key.into());
        self
    }

    pub fn insert(&mut self, provider: ProviderName, key: String) {
        self.keys.insert(provider, key);
    }

    pub fn get(&self, provider: &ProviderName) -> Option<&str> {
        self.keys.get(provider).map(String::as_str)
    }

    pub fn has_key_for(&self, provider: &ProviderName) -> bool {
        self.keys.get(provider).is_some_and(|key| !key.is_empty())
    }
}

// Keys are never printed.
impl fmt::Debug for CallerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<&str> = self.keys.keys().map(ProviderName::as_str).collect();
        providers.sort_unstable();
        f.debug_struct("CallerCredentials")
            .field("providers", &providers)
            .finish()
    }
}

/// One external-provider data pull required by a feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDependency {
    pub name: String,
    #[serde(rename = "endpoint")]
    pub endpoint_path: String,
    #[serde(default, rename = "params")]
    pub query_params: HashMap<String, String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default, rename = "historical")]
    pub is_historical: bool,
}

impl RawDependency {
    pub fn new(name: impl Into<String>, endpoint_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint_path: endpoint_path.into(),
            query_params: HashMap::new(),
            resource_id: None,
            is_historical: false,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(key.into(), value.into());
        self
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn historical(mut self) -> Self {
        self.is_historical = true;
        self
    }

    pub fn endpoint(&self) -> EndpointDescriptor {
        EndpointDescriptor {
            path: self.endpoint_path.clone(),
            params: self
                .query_params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            resource_id: self.resource_id.clone(),
        }
    }
}

/// What a provider client is asked to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub path: String,
    pub params: BTreeMap<String, String>,
    pub resource_id: Option<String>,
}

/// Configured TTL window for a feature, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlBounds {
    #[serde(default)]
    pub default: Option<u64>,
    pub min: u64,
    pub max: u64,
}

impl TtlBounds {
    pub fn new(min: u64, max: u64) -> Self {
        Self { default: None, min, max }
    }

    pub fn with_default(mut self, default: u64) -> Self {
        self.default = Some(default);
        self
    }

    /// Configured default, or the integer midpoint of the window.
    pub fn base(&self) -> u64 {
        self.default
            .unwrap_or_else(|| self.min + (self.max.saturating_sub(self.min)) / 2)
    }
}

/// Immutable description of a computed feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    pub name: String,
    #[serde(default)]
    pub dependencies: Vec<RawDependency>,
    pub providers: Vec<ProviderName>,
    pub ttl: TtlBounds,
    #[serde(default)]
    pub strategy: RotationStrategy,
}

/// Per-role request policy supplied by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoleConfig {
    pub name: String,
    #[serde(default)]
    pub rate_limit: u32,
    pub minimum_ttl_seconds: u64,
    #[serde(default)]
    pub authorized_providers: Vec<ProviderName>,
}

impl UserRoleConfig {
    pub fn new(name: impl Into<String>, minimum_ttl_seconds: u64) -> Self {
        Self {
            name: name.into(),
            rate_limit: 0,
            minimum_ttl_seconds,
            authorized_providers: Vec::new(),
        }
    }

    /// An empty authorization list means every provider is allowed.
    pub fn authorizes(&self, provider: &ProviderName) -> bool {
        self.authorized_providers.is_empty() || self.authorized_providers.contains(provider)
    }
}

/// Raw payloads handed to a feature's compute function, keyed by dependency name.
pub type DependencyData = BTreeMap<String, Value>;
