//! Provider client interface
//!
//! One implementation per external provider, injected as a mapping so the
//! engine never looks clients up through global state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::error::ProviderError;
use crate::engine::types::{CallerCredentials, EndpointDescriptor, ProviderName};

/// Fetch capability for one external provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Fetch raw data for `endpoint`, or fail with a classified error.
    async fn fetch(
        &self,
        endpoint: &EndpointDescriptor,
        credentials: &CallerCredentials,
    ) -> Result<Value, ProviderError>;
}

/// Provider name to client mapping.
#[derive(Clone, Default)]
pub struct ProviderClients {
    clients: HashMap<ProviderName, Arc<dyn ProviderClient>>,
}

impl ProviderClients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(
        mut self,
        provider: impl Into<ProviderName>,
        client: Arc<dyn ProviderClient>,
    ) -> Self {
        self.clients.insert(provider.into(), client);
        self
    }

    pub fn insert(&mut self, provider: ProviderName, client: Arc<dyn ProviderClient>) {
        self.clients.insert(provider, client);
    }

    pub fn get(&self, provider: &ProviderName) -> Option<&Arc<dyn ProviderClient>> {
        self.clients.get(provider)
    }

    pub fn contains(&self, provider: &ProviderName) -> bool {
        self.clients.contains_key(provider)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
