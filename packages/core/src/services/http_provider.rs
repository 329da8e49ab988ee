//! reqwest-backed provider client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::engine::error::ProviderError;
use crate::engine::provider::ProviderClient;
use crate::engine::types::{CallerCredentials, EndpointDescriptor, ProviderName};

/// Where a provider expects its API key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialPlacement {
    /// Sent as a query parameter with this name.
    Query(String),
    /// Sent as a request header with this name.
    Header(String),
}

#[derive(Clone)]
pub struct HttpProviderClient {
    provider: ProviderName,
    base_url: String,
    credential: Option<CredentialPlacement>,
    http: Client,
}

impl HttpProviderClient {
    pub fn new(provider: ProviderName, base_url: impl Into<String>) -> Self {
        Self {
            provider,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential: None,
            http: Client::new(),
        }
    }

    pub fn with_credential(mut self, placement: CredentialPlacement) -> Self {
        self.credential = Some(placement);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, endpoint: &EndpointDescriptor) -> String {
        match &endpoint.resource_id {
            Some(resource_id) => format!(
                "{}{}/{}",
                self.base_url,
                endpoint.path,
                urlencoding::encode(resource_id)
            ),
            None => format!("{}{}", self.base_url, endpoint.path),
        }
    }
}

fn classify_status(status: StatusCode) -> Option<ProviderError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::unauthorized(format!("provider returned HTTP {}", status))
        }
        other => ProviderError::Server {
            status: other.as_u16(),
        },
    })
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn fetch(
        &self,
        endpoint: &EndpointDescriptor,
        credentials: &CallerCredentials,
    ) -> Result<Value, ProviderError> {
        let mut query: Vec<(String, String)> = endpoint
            .params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut request = self.http.get(self.url_for(endpoint));

        if let Some(placement) = &self.credential {
            let key = credentials
                .get(&self.provider)
                .filter(|key| !key.is_empty())
                .ok_or(ProviderError::MissingCredential)?;
            match placement {
                CredentialPlacement::Query(name) => query.push((name.clone(), key.to_string())),
                CredentialPlacement::Header(name) => request = request.header(name.as_str(), key),
            }
        }

        let response = request
            .query(&query)
            .send()
            .await
            .map_err(|err| ProviderError::network(err.to_string()))?;

        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| ProviderError::malformed(err.to_string()))
    }
}
