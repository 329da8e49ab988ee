// Library root: the resolution engine plus its storage, provider and
// ambient modules. The binary entry point is `src/main.rs`.

pub mod cache;
pub mod db;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod repository;
pub mod scheduler;
pub mod services;
pub mod store;
pub mod usage;

// Binary-side concerns, public so `main.rs` and integration tests can reach them.
pub mod cli;
pub mod config;
pub mod logging;

pub use cache::{CachedFeatureResult, CachedRawDataResult};
pub use engine::{FeatureResolver, RawDataGateway, ResolveError};
pub use store::{MemoryStorage, StorageGateway};
pub use usage::{MemoryUsageAdapter, ProviderUsageAdapter};
