//! Bounded retry with exponential backoff and jitter.
//!
//! Wraps any [`Transport`]. Server errors (5xx) and transient transport
//! failures are retried up to `max_retries` times; a 4xx response is
//! handed back to the caller untouched, and caller-initiated
//! cancellation aborts immediately, including mid-backoff.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::request::{ApiRequest, ApiResponse};
use super::transport::{FailureClass, Transport, TransportError};

/// Maximum number of retries after the initial attempt.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds.
const DEFAULT_BASE_DELAY_MS: u64 = 200;

/// Upper bound (exclusive) on the random jitter added to each backoff.
const MAX_JITTER_MS: u64 = 200;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

/// Backoff before retrying a failed attempt: `base * 2^attempt` plus
/// up to `MAX_JITTER_MS` of jitter to avoid thundering herds.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(attempt));
    let jitter = rand::thread_rng().gen_range(0..MAX_JITTER_MS);
    exponential + Duration::from_millis(jitter)
}

pub struct RetryingTransport {
    inner: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RetryingTransport {
    pub fn new(inner: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Wait out the backoff for `attempt`, aborting if the caller cancels.
    async fn wait(&self, attempt: u32, cancel: &CancellationToken) -> Result<(), TransportError> {
        let delay = backoff_delay(self.policy.base_delay, attempt);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::cancelled()),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

#[async_trait]
impl Transport for RetryingTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, TransportError> {
        let mut attempt = 0;
        loop {
            match self.inner.execute(request, cancel).await {
                Ok(response) => {
                    if response.status.is_server_error() && attempt < self.policy.max_retries {
                        warn!(
                            status = %response.status,
                            attempt,
                            url = request.url(),
                            "Server error, backing off"
                        );
                    } else {
                        // Success, 4xx, or a 5xx with retries exhausted:
                        // the response goes back to the caller as-is.
                        return Ok(response);
                    }
                }
                Err(error) => match error.class {
                    FailureClass::Transient if attempt < self.policy.max_retries => {
                        warn!(
                            error = %error,
                            attempt,
                            url = request.url(),
                            "Transient transport failure, backing off"
                        );
                    }
                    // Cancellation, fatal failures, and transient
                    // exhaustion all surface immediately.
                    _ => return Err(error),
                },
            }

            self.wait(attempt, cancel).await?;
            attempt += 1;
        }
    }
}
