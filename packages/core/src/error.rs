use std::error::Error;
use std::fmt;

use crate::engine::error::{ResolveError, StorageError};

/// Binary-level error.
///
/// Startup and one-shot resolution failures are funnelled through this so
/// `main` has a single place to report them.
#[derive(Debug)]
pub enum AppError {
    Config(String),
    Network(String),
    Parse(String),
    Storage(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Config error: {}", msg),
            AppError::Network(msg) => write!(f, "Network error: {}", msg),
            AppError::Parse(msg) => write!(f, "Parse error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl Error for AppError {}

impl From<ResolveError> for AppError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Configuration { message } => AppError::Config(message),
            ResolveError::Compute { .. } => AppError::Parse(err.to_string()),
            other => AppError::Network(other.to_string()),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_errors_map_to_app_errors() {
        let config: AppError = ResolveError::configuration("unknown feature 'x'").into();
        assert_eq!(config.to_string(), "Config error: unknown feature 'x'");

        let exhausted: AppError = ResolveError::exhausted("/ticker").into();
        assert!(matches!(exhausted, AppError::Network(_)));
        assert!(exhausted.to_string().contains("/ticker"));
    }

    #[test]
    fn storage_errors_map_to_storage() {
        let err: AppError = StorageError::write("disk full").into();
        assert_eq!(err.to_string(), "Storage error: Storage write error: disk full");
    }
}
