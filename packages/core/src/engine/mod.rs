//! Feature resolution engine
//!
//! Pure key derivation, provider rotation and TTL arithmetic, plus the two
//! I/O-bound pieces built on them: the Raw Data Gateway and the Feature
//! Resolver. Storage and usage tracking are injected through the
//! [`StorageGateway`](crate::store::StorageGateway) and
//! [`ProviderUsageAdapter`](crate::usage::ProviderUsageAdapter) traits.

pub mod config;
pub mod error;
pub mod gateway;
pub mod keys;
pub mod provider;
pub mod resolver;
pub mod rotation;
pub mod ttl;
pub mod types;
pub mod volatility;


pub use config::{EngineConfig, FeatureRegistry};
pub use error::{ProviderError, ResolveError, ResolveResult, StorageError, StorageResult};
pub use gateway::RawDataGateway;
pub use keys::{feature_key, raw_key, usage_key};
pub use provider::{ProviderClient, ProviderClients};
pub use resolver::{ComputeRegistry, FeatureCompute, FeatureResolver, PassthroughCompute};
pub use rotation::{OrderedProvider, RotationStrategy};
pub use ttl::{effective_ttl, TtlCalculator};
pub use types::{
    CallerCredentials, DependencyData, EndpointDescriptor, FeatureDescriptor, ProviderName,
    RawDependency, TtlBounds, UserRoleConfig,
};
pub use volatility::{VolatilityLevel, VolatilityMultipliers};
