//! HTTP cloud provider client.
//!
//! This module provides the REST client for the provider's resource API.
//! The client maps HTTP failures onto the provider error taxonomy and does
//! no retrying of its own; the executor decides what to do with a transient
//! error.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::ResourceKind;
use crate::error::{ProviderError, Result, StratoError};

use super::api::{CloudProvider, CreatedResource, ResourceStatus};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP client for the provider's resource API.
#[derive(Debug, Clone)]
pub struct HttpCloudProvider {
    /// HTTP client.
    client: Client,
    /// API base URL.
    base_url: String,
    /// API token.
    token: String,
}

/// Request body for resource creation.
#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    kind: &'a str,
    name: &'a str,
    attributes: &'a BTreeMap<String, String>,
}

/// Request body for in-place updates.
#[derive(Debug, Serialize)]
struct UpdateRequest<'a> {
    attributes: &'a BTreeMap<String, String>,
}

/// Resource representation returned by the API.
#[derive(Debug, Deserialize)]
struct ResourceResponse {
    id: String,
    status: ResourceStatus,
    #[serde(default)]
    outputs: BTreeMap<String, String>,
    #[serde(default)]
    message: Option<String>,
}

impl HttpCloudProvider {
    /// Creates a new provider client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a provider client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(base_url: &str, token: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                StratoError::Provider(ProviderError::network(format!(
                    "Failed to create HTTP client: {e}"
                )))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Builds the URL for a resource path.
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Maps a non-success status to a provider error.
    async fn error_from_response(
        response: reqwest::Response,
        resource_id: Option<&str>,
    ) -> StratoError {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or_default();
            let retry_after = if retry_after == 0 { 60 } else { retry_after };

            return StratoError::Provider(ProviderError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return StratoError::Provider(ProviderError::AuthenticationFailed {
                message: String::from("Invalid API token"),
            });
        }

        if status == StatusCode::NOT_FOUND {
            return StratoError::Provider(ProviderError::ResourceNotFound {
                resource_id: resource_id.unwrap_or("unknown").to_string(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        StratoError::Provider(ProviderError::api_error(status.as_u16(), body))
    }

    /// Parses a resource body, surfacing terminal error states.
    fn parse_resource(body: ResourceResponse) -> Result<CreatedResource> {
        if body.status == ResourceStatus::Error {
            return Err(StratoError::Provider(ProviderError::ResourceErrored {
                resource_id: body.id,
                message: body
                    .message
                    .unwrap_or_else(|| String::from("no detail provided")),
            }));
        }

        Ok(CreatedResource {
            id: body.id,
            status: body.status,
            outputs: body.outputs,
        })
    }

    /// Sends a request and decodes the resource body.
    async fn send_resource_request(
        &self,
        request: reqwest::RequestBuilder,
        resource_id: Option<&str>,
    ) -> Result<CreatedResource> {
        let response = request
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .await
            .map_err(|e| {
                StratoError::Provider(ProviderError::network(format!("Request failed: {e}")))
            })?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response, resource_id).await);
        }

        let body: ResourceResponse = response.json().await.map_err(|e| {
            StratoError::Provider(ProviderError::InvalidResponse {
                message: format!("Failed to parse response: {e}"),
            })
        })?;

        Self::parse_resource(body)
    }
}

#[async_trait]
impl CloudProvider for HttpCloudProvider {
    async fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<CreatedResource> {
        debug!("Creating {kind} '{name}'");
        trace!("Attributes: {attributes:?}");

        let request = self.client.post(self.url("/v1/resources")).json(&CreateRequest {
            kind: kind.as_str(),
            name,
            attributes,
        });

        self.send_resource_request(request, None).await
    }

    async fn update(
        &self,
        resource_id: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<CreatedResource> {
        debug!("Updating resource {resource_id}");
        trace!("Attributes: {attributes:?}");

        let request = self
            .client
            .patch(self.url(&format!("/v1/resources/{resource_id}")))
            .json(&UpdateRequest { attributes });

        self.send_resource_request(request, Some(resource_id)).await
    }

    async fn delete(&self, resource_id: &str) -> Result<()> {
        debug!("Deleting resource {resource_id}");

        let response = self
            .client
            .delete(self.url(&format!("/v1/resources/{resource_id}")))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .await
            .map_err(|e| {
                StratoError::Provider(ProviderError::network(format!("Request failed: {e}")))
            })?;

        // Deleting an already-gone resource is a success for idempotence
        if response.status() == StatusCode::NOT_FOUND {
            debug!("Resource {resource_id} already gone");
            return Ok(());
        }

        if !response.status().is_success() {
            return Err(Self::error_from_response(response, Some(resource_id)).await);
        }

        Ok(())
    }

    async fn get_status(&self, resource_id: &str) -> Result<CreatedResource> {
        trace!("Polling status of resource {resource_id}");

        let request = self
            .client
            .get(self.url(&format!("/v1/resources/{resource_id}")));

        self.send_resource_request(request, Some(resource_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider_for(server: &MockServer) -> HttpCloudProvider {
        HttpCloudProvider::new(&server.uri(), "test-token").expect("create provider")
    }

    fn attrs(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_create_settled_resource() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/resources"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "net-1",
                "status": "settled",
                "outputs": { "id": "net-1" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let created = provider
            .create(
                ResourceKind::Network,
                "core-network",
                &attrs(&[("cidr", "10.0.0.0/16")]),
            )
            .await
            .expect("create should succeed");

        assert_eq!(created.id, "net-1");
        assert_eq!(created.status, ResourceStatus::Settled);
        assert_eq!(created.outputs.get("id").map(String::as_str), Some("net-1"));
    }

    #[tokio::test]
    async fn test_error_state_surfaces_as_resource_errored() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/resources/db-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "db-1",
                "status": "error",
                "message": "quota exceeded"
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let err = provider
            .get_status("db-1")
            .await
            .expect_err("error state must fail");

        assert!(matches!(
            err,
            StratoError::Provider(ProviderError::ResourceErrored { .. })
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_rate_limit_is_transient() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/resources"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("retry-after", "13"),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let err = provider
            .create(ResourceKind::Network, "core-network", &BTreeMap::new())
            .await
            .expect_err("429 must fail");

        assert!(err.is_retryable());
        assert_eq!(err.retry_delay_secs(), Some(13));
    }

    #[tokio::test]
    async fn test_auth_failure_is_permanent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/resources"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let err = provider
            .create(ResourceKind::Network, "core-network", &BTreeMap::new())
            .await
            .expect_err("401 must fail");

        assert!(matches!(
            err,
            StratoError::Provider(ProviderError::AuthenticationFailed { .. })
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/v1/resources/fn-1"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let err = provider
            .update("fn-1", &attrs(&[("timeout_seconds", "60")]))
            .await
            .expect_err("503 must fail");

        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_resource() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/v1/resources/gone-1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        provider
            .delete("gone-1")
            .await
            .expect("deleting a missing resource succeeds");
    }
}
