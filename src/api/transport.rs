//! Transport seam for the API pipeline.
//!
//! `Transport` is the single abstraction the retry and bearer layers
//! stack on. Failures carry an explicit classification tag, so retry
//! decisions are made on data rather than by inspecting error types.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::request::{ApiRequest, ApiResponse};

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// How a transport failure should be treated by the layers above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Likely to succeed on retry: I/O blip, timeout, connection reset.
    Transient,
    /// The caller's own cancellation signal fired.
    Cancelled,
    /// Everything else; never retried.
    Fatal,
}

#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct TransportError {
    pub class: FailureClass,
    pub message: String,
}

impl TransportError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Transient,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            class: FailureClass::Cancelled,
            message: "request cancelled".to_string(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Fatal,
            message: message.into(),
        }
    }
}

/// A single outbound request attempt. Implementations must not retry;
/// that is the retry layer's job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, TransportError>;
}

/// `reqwest`-backed transport.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, super::ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    /// Classify a reqwest failure. Timeouts, connection failures and
    /// request-level I/O errors are transient; builder and redirect
    /// errors are not going to improve on retry.
    fn classify(error: reqwest::Error) -> TransportError {
        let transient = error.is_timeout()
            || error.is_connect()
            || error.is_request()
            || error.is_body()
            || error.is_decode();
        if transient {
            TransportError::transient(error.to_string())
        } else {
            TransportError::fatal(error.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url())
            .headers(request.headers().clone());
        if let Some(body) = request.body() {
            builder = builder.body(body.to_vec());
        }

        let send = async {
            let response = builder.send().await.map_err(Self::classify)?;
            let status = response.status();
            let body = response.text().await.map_err(Self::classify)?;
            Ok(ApiResponse { status, body })
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::cancelled()),
            result = send => result,
        }
    }
}
