//! Error types for feature resolution

use thiserror::Error;

use crate::engine::types::ProviderName;

/// Errors that escape the resolution core.
///
/// Everything else (storage failures, rate limits that a later provider
/// recovers from, legacy cache shapes) is absorbed inside the engine.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("All providers exhausted for endpoint {endpoint}")]
    AllProvidersExhausted { endpoint: String },

    #[error("Provider {provider} failed: {source}")]
    ProviderCritical {
        provider: ProviderName,
        #[source]
        source: ProviderError,
    },

    #[error("Compute error for feature {feature}: {message}")]
    Compute { feature: String, message: String },
}

/// Classified errors from provider clients
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Missing credential")]
    MissingCredential,

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    #[error("Server error: HTTP {status}")]
    Server { status: u16 },
}

/// Errors from the storage tiers and usage counters
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage read error: {message}")]
    Read { message: String },

    #[error("Storage write error: {message}")]
    Write { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ResolveError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    pub fn exhausted(endpoint: impl Into<String>) -> Self {
        Self::AllProvidersExhausted { endpoint: endpoint.into() }
    }

    pub fn compute(feature: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compute {
            feature: feature.into(),
            message: message.into(),
        }
    }
}

impl ProviderError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse { message: message.into() }
    }

    /// `true` when the next provider in rotation should be tried.
    pub fn is_failover(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Unauthorized { .. } | Self::MissingCredential
        )
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Unauthorized { .. } => "unauthorized",
            Self::MissingCredential => "missing_credential",
            Self::Network { .. } => "network",
            Self::MalformedResponse { .. } => "malformed",
            Self::Server { .. } => "server",
        }
    }
}

impl StorageError {
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read { message: message.into() }
    }

    pub fn write(message: impl Into<String>) -> Self {
        Self::Write { message: message.into() }
    }
}

/// Result type for resolution operations
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
