//! Bearer token attachment and one-shot refresh-and-replay.
//!
//! Sits between the envelope codec and the retry layer. When the
//! backend answers 401, the token source is asked to refresh once and
//! the original request value is replayed with the new token. Whatever
//! response the replay produces is handed back; a failed refresh hands
//! back the original 401. Refresh never happens more than once per
//! logical request.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::request::{ApiRequest, ApiResponse};
use super::transport::{Transport, TransportError};

/// Where the bearer layer gets its credentials.
///
/// `refresh` implementations must swallow their own errors and report
/// plain success or failure; the pipeline treats any failure as "return
/// the original unauthorized response".
#[async_trait]
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> Option<String>;
    async fn refresh(&self) -> bool;
}

pub struct BearerTransport {
    inner: Arc<dyn Transport>,
    tokens: Arc<dyn TokenSource>,
}

impl BearerTransport {
    pub fn new(inner: Arc<dyn Transport>, tokens: Arc<dyn TokenSource>) -> Self {
        Self { inner, tokens }
    }

    fn attach(request: &ApiRequest, token: &str) -> Result<ApiRequest, TransportError> {
        request
            .with_bearer(token)
            .map_err(|e| TransportError::fatal(format!("Invalid bearer token: {}", e)))
    }
}

#[async_trait]
impl Transport for BearerTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, TransportError> {
        let outbound = match self.tokens.access_token() {
            Some(token) => Self::attach(request, &token)?,
            None => request.clone(),
        };

        let response = self.inner.execute(&outbound, cancel).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(url = request.url(), "Unauthorized response, refreshing token");
        if !self.tokens.refresh().await {
            warn!("Token refresh failed, returning unauthorized response");
            return Ok(response);
        }

        let Some(token) = self.tokens.access_token() else {
            warn!("Token refresh reported success but no token is available");
            return Ok(response);
        };

        // Replay the immutable request value exactly once with the new
        // token; the original 401 is discarded.
        let replay = Self::attach(request, &token)?;
        self.inner.execute(&replay, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::api::transport::testing::MockTransport;
    use reqwest::header;

    struct FakeTokens {
        token: Mutex<Option<String>>,
        next_token: Option<String>,
        refreshes: AtomicUsize,
    }

    impl FakeTokens {
        fn new(current: Option<&str>, next: Option<&str>) -> Self {
            Self {
                token: Mutex::new(current.map(String::from)),
                next_token: next.map(String::from),
                refreshes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TokenSource for FakeTokens {
        fn access_token(&self) -> Option<String> {
            self.token.lock().unwrap().clone()
        }

        async fn refresh(&self) -> bool {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            match &self.next_token {
                Some(next) => {
                    *self.token.lock().unwrap() = Some(next.clone());
                    true
                }
                None => false,
            }
        }
    }

    fn request() -> ApiRequest {
        ApiRequest::post_json("https://example.test/graphql", &serde_json::json!({}))
            .expect("request")
    }

    fn auth_header(req: &ApiRequest) -> Option<String> {
        req.headers()
            .get(header::AUTHORIZATION)
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_refresh_and_replay_on_401() {
        let mock = Arc::new(MockTransport::scripted(vec![
            MockTransport::response(401, ""),
            MockTransport::response(200, r#"{"data":{}}"#),
        ]));
        let tokens = Arc::new(FakeTokens::new(Some("stale"), Some("fresh")));
        let transport = BearerTransport::new(mock.clone(), tokens.clone());

        let response = transport
            .execute(&request(), &CancellationToken::new())
            .await
            .expect("response");

        assert_eq!(response.status.as_u16(), 200);
        assert_eq!(mock.call_count(), 2);
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);

        let seen = mock.requests.lock().unwrap();
        assert_eq!(auth_header(&seen[0]).as_deref(), Some("Bearer stale"));
        assert_eq!(auth_header(&seen[1]).as_deref(), Some("Bearer fresh"));
    }

    #[tokio::test]
    async fn test_failed_refresh_returns_original_401() {
        let mock = Arc::new(MockTransport::scripted(vec![MockTransport::response(
            401,
            "token expired",
        )]));
        let tokens = Arc::new(FakeTokens::new(Some("stale"), None));
        let transport = BearerTransport::new(mock.clone(), tokens.clone());

        let response = transport
            .execute(&request(), &CancellationToken::new())
            .await
            .expect("response");

        assert_eq!(response.status.as_u16(), 401);
        assert_eq!(response.body, "token expired");
        assert_eq!(mock.call_count(), 1);
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_replay_happens_exactly_once() {
        // Even when the replay comes back 401 again, there is no second
        // refresh round.
        let mock = Arc::new(MockTransport::scripted(vec![
            MockTransport::response(401, "first"),
            MockTransport::response(401, "second"),
        ]));
        let tokens = Arc::new(FakeTokens::new(Some("stale"), Some("fresh")));
        let transport = BearerTransport::new(mock.clone(), tokens.clone());

        let response = transport
            .execute(&request(), &CancellationToken::new())
            .await
            .expect("response");

        assert_eq!(response.status.as_u16(), 401);
        assert_eq!(response.body, "second");
        assert_eq!(mock.call_count(), 2);
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_token_sends_without_authorization_header() {
        let mock = Arc::new(MockTransport::scripted(vec![MockTransport::response(
            200,
            r#"{"data":{}}"#,
        )]));
        let tokens = Arc::new(FakeTokens::new(None, None));
        let transport = BearerTransport::new(mock.clone(), tokens);

        transport
            .execute(&request(), &CancellationToken::new())
            .await
            .expect("response");

        let seen = mock.requests.lock().unwrap();
        assert!(auth_header(&seen[0]).is_none());
    }
}
