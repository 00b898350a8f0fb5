//! API client for the shopdesk GraphQL backend.
//!
//! `ApiClient` is the envelope codec layered over a transport stack:
//! it serializes the `{query, variables}` request, posts it through the
//! configured [`Transport`], and decodes the `{data, errors}` envelope.
//! The same client type serves both pipelines: the authenticated one
//! (bearer over retry) and the retry-only one the auth orchestrator
//! uses for login itself.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::envelope::{self, GraphqlRequest};
use super::request::ApiRequest;
use super::transport::Transport;
use super::ApiError;

#[derive(Clone)]
pub struct ApiClient {
    endpoint: String,
    transport: Arc<dyn Transport>,
}

impl ApiClient {
    pub fn new(endpoint: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST a query and decode the envelope's `data` as `T`.
    pub async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
        cancel: &CancellationToken,
    ) -> Result<T, ApiError> {
        let request = ApiRequest::post_json(
            &self.endpoint,
            &GraphqlRequest { query, variables },
        )?;
        self.post_and_decode(request, cancel).await
    }

    /// Upload a file through the GraphQL multipart convention and decode
    /// the response envelope the same way as [`graphql`](Self::graphql).
    pub async fn upload<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
        file_var: &str,
        filename: &str,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<T, ApiError> {
        let part = envelope::upload_body(query, &variables, file_var, filename, bytes)?;
        let request = ApiRequest::post_bytes(&self.endpoint, &part.content_type, part.body)?;
        self.post_and_decode(request, cancel).await
    }

    async fn post_and_decode<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<T, ApiError> {
        let response = self.transport.execute(&request, cancel).await?;
        debug!(status = %response.status, url = request.url(), "GraphQL response received");

        if !response.is_success() {
            return Err(ApiError::from_status(response.status, &response.body));
        }
        envelope::decode(&response.body)
    }
}
