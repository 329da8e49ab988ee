use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::cli::Cli;
use crate::engine::config::{
    EngineConfig, FeatureRegistry, DEFAULT_RAW_DATA_TTL_SECONDS, DEFAULT_VOLATILITY_FEATURE,
};
use crate::engine::provider::ProviderClients;
use crate::engine::types::{CallerCredentials, FeatureDescriptor, ProviderName, UserRoleConfig};
use crate::error::AppError;
use crate::services::http_provider::{CredentialPlacement, HttpProviderClient};

pub const DEFAULT_WARM_INTERVAL_SECONDS: u64 = 60;

/// Prefix of the environment variables holding provider API keys.
pub const PROVIDER_KEY_PREFIX: &str = "PROVIDER_KEY_";

#[derive(Debug, Clone)]
pub struct Config {
    pub feature_config_path: PathBuf,
    pub database_url: Option<String>,
    pub raw_data_ttl_seconds: u64,
    pub volatility_feature: String,
    pub warm_interval_seconds: u64,
    pub metrics_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let feature_config_path = lookup("FEATURE_CONFIG_PATH")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from)
            .ok_or("FEATURE_CONFIG_PATH is required")?;

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let raw_data_ttl_seconds = parse_or(
            lookup("RAW_DATA_TTL_SECONDS"),
            DEFAULT_RAW_DATA_TTL_SECONDS,
            "RAW_DATA_TTL_SECONDS must be a valid number",
        )?;

        let warm_interval_seconds = parse_or(
            lookup("WARM_INTERVAL_SECONDS"),
            DEFAULT_WARM_INTERVAL_SECONDS,
            "WARM_INTERVAL_SECONDS must be a valid number",
        )?;
        if warm_interval_seconds == 0 {
            return Err("WARM_INTERVAL_SECONDS must be greater than zero".to_string());
        }

        let volatility_feature = lookup("VOLATILITY_FEATURE")
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_VOLATILITY_FEATURE.to_string());

        let metrics_file = lookup("METRICS_FILE")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            feature_config_path,
            database_url,
            raw_data_ttl_seconds,
            volatility_feature,
            warm_interval_seconds,
            metrics_file,
        })
    }

    /// Command-line flags win over the environment.
    pub fn with_cli(mut self, cli: &Cli) -> Self {
        if let Some(path) = &cli.config {
            self.feature_config_path = path.clone();
        }
        if let Some(url) = &cli.database_url {
            self.database_url = Some(url.clone());
        }
        if let Some(interval) = cli.warm_interval {
            self.warm_interval_seconds = interval.max(1);
        }
        if let Some(path) = &cli.metrics_file {
            self.metrics_file = Some(path.clone());
        }
        self
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            raw_data_ttl_seconds: self.raw_data_ttl_seconds,
            volatility_feature: self.volatility_feature.clone(),
            ..EngineConfig::default()
        }
    }
}

fn parse_or(value: Option<String>, default: u64, message: &str) -> Result<u64, String> {
    match value {
        Some(raw) => raw.trim().parse::<u64>().map_err(|_| message.to_string()),
        None => Ok(default),
    }
}

/// One external provider as declared in the feature configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: ProviderName,
    pub base_url: String,
    #[serde(default)]
    pub credential: Option<CredentialPlacement>,
}

/// Contents of the file named by `FEATURE_CONFIG_PATH`.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureConfigFile {
    pub providers: Vec<ProviderConfig>,
    pub features: Vec<FeatureDescriptor>,
    #[serde(default)]
    pub roles: Vec<UserRoleConfig>,
}

impl FeatureConfigFile {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("cannot read {}: {}", path.display(), err)))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw).map_err(|err| AppError::Parse(format!("feature config: {}", err)))
    }

    /// Validate the features against each other and the declared providers.
    pub fn registry(&self) -> Result<Arc<FeatureRegistry>, AppError> {
        let mut declared = HashSet::with_capacity(self.providers.len());
        for provider in &self.providers {
            if !declared.insert(&provider.name) {
                return Err(AppError::Config(format!(
                    "provider '{}' is declared more than once",
                    provider.name
                )));
            }
        }

        let registry = FeatureRegistry::new(self.features.clone())
            .map_err(|err| AppError::Config(err.to_string()))?;
        registry
            .check_providers(|name| declared.contains(name))
            .map_err(|err| AppError::Config(err.to_string()))?;

        Ok(Arc::new(registry))
    }

    pub fn clients(&self) -> ProviderClients {
        let mut clients = ProviderClients::new();
        for provider in &self.providers {
            let mut client = HttpProviderClient::new(provider.name.clone(), provider.base_url.clone());
            if let Some(placement) = &provider.credential {
                client = client.with_credential(placement.clone());
            }
            clients.insert(provider.name.clone(), Arc::new(client));
        }
        clients
    }

    pub fn role(&self, name: &str) -> Option<&UserRoleConfig> {
        self.roles.iter().find(|role| role.name == name)
    }

    /// API keys for the declared providers, read from `PROVIDER_KEY_<NAME>`.
    pub fn credentials_from_env(&self) -> CallerCredentials {
        self.credentials_from_lookup(|name| env::var(name).ok())
    }

    pub fn credentials_from_lookup<F>(&self, lookup: F) -> CallerCredentials
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut credentials = CallerCredentials::new();
        for provider in &self.providers {
            if let Some(key) = lookup(&credential_variable(&provider.name)).filter(|key| !key.is_empty()) {
                credentials.insert(provider.name.clone(), key);
            }
        }
        credentials
    }
}

/// `PROVIDER_KEY_` followed by the provider name, uppercased, with every
/// non-alphanumeric character mapped to `_`.
pub fn credential_variable(provider: &ProviderName) -> String {
    let suffix: String = provider
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{}{}", PROVIDER_KEY_PREFIX, suffix)
}
