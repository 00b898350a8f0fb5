//! Request and response value objects for the API pipeline.
//!
//! Requests are immutable values with a fully buffered body, so the
//! retry and bearer layers can replay one by cloning it and swapping a
//! header. There is no single-read body stream anywhere in the pipeline.

use reqwest::header::{self, HeaderMap, HeaderValue, InvalidHeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;

use super::ApiError;

#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
}

impl ApiRequest {
    /// Build a POST request with a JSON body.
    pub fn post_json<B: Serialize>(url: &str, body: &B) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(Self {
            method: Method::POST,
            url: url.to_string(),
            headers,
            body: Some(serde_json::to_vec(body)?),
        })
    }

    /// Build a POST request with a pre-assembled body and content type
    /// (used for multipart uploads).
    pub fn post_bytes(url: &str, content_type: &str, body: Vec<u8>) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(content_type)
                .map_err(|e| ApiError::InvalidResponse(format!("Invalid content type: {}", e)))?,
        );
        Ok(Self {
            method: Method::POST,
            url: url.to_string(),
            headers,
            body: Some(body),
        })
    }

    /// Return a copy of this request with the given bearer token attached,
    /// replacing any previous authorization header.
    pub fn with_bearer(&self, token: &str) -> Result<Self, InvalidHeaderValue> {
        let mut cloned = self.clone();
        cloned.headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))?,
        );
        Ok(cloned)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
