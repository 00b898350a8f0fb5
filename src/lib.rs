//! Core library for shopdesk - a desktop client for a shop-management
//! GraphQL backend.
//!
//! The heart of the crate is the resilient authenticated API pipeline:
//! an envelope codec over a bearer-auth layer over a retrying transport,
//! plus the auth orchestrator and the encrypted credential vault that
//! make silent re-authentication work. See the `api` and `auth` module
//! docs for the layer-by-layer picture.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

use std::sync::Arc;

use anyhow::Result;

use api::{ApiClient, BearerTransport, HttpTransport, RetryPolicy, RetryingTransport};
use auth::{AuthManager, CredentialVault};
use config::Config;

/// Assemble the full pipeline for a configured backend.
///
/// Returns the authenticated client (codec -> bearer -> retry -> http)
/// and the auth manager, which shares the same retrying transport for
/// its login traffic and serves as the client's token source.
pub fn connect(config: &Config) -> Result<(ApiClient, Arc<AuthManager>)> {
    let http = Arc::new(HttpTransport::new()?);
    let retry = Arc::new(RetryingTransport::new(http, RetryPolicy::default()));

    let endpoint = config.endpoint();
    let vault = CredentialVault::new(config.vault_dir()?)?;
    let auth = Arc::new(AuthManager::new(
        ApiClient::new(&endpoint, retry.clone()),
        vault,
    ));

    let bearer = Arc::new(BearerTransport::new(retry, auth.clone()));
    let client = ApiClient::new(&endpoint, bearer);
    Ok((client, auth))
}

#[cfg(test)]
mod tests {
    //! Whole-pipeline tests: codec over bearer over retry, with a real
    //! auth manager refreshing from the vault.

    use std::sync::Arc;

    use serde::Deserialize;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use crate::api::transport::testing::MockTransport;
    use crate::api::{ApiClient, BearerTransport, RetryPolicy, RetryingTransport};
    use crate::auth::vault::testing::test_vault;
    use crate::auth::{AuthManager, SessionData, CREDENTIAL_SLOT};
    use crate::models::AuthUser;

    const ENDPOINT: &str = "https://example.test/graphql";

    #[derive(Debug, Deserialize)]
    struct ShopData {
        shop: Shop,
    }

    #[derive(Debug, Deserialize)]
    struct Shop {
        name: String,
    }

    fn seeded_session(token: &str) -> SessionData {
        SessionData::new(
            token.to_string(),
            AuthUser {
                id: "u1".to_string(),
                username: "alice".to_string(),
                display_name: "Alice".to_string(),
                roles: vec![],
            },
        )
    }

    /// An expired token on a flaky backend: the request rides out a 503,
    /// hits a 401, the manager re-logs-in from the vault, and the replay
    /// delivers the data.
    #[tokio::test(start_paused = true)]
    async fn test_expired_token_on_flaky_backend_recovers() {
        let mock = Arc::new(MockTransport::scripted(vec![
            MockTransport::response(503, ""),
            MockTransport::response(401, ""),
            MockTransport::response(
                200,
                r#"{"data":{"login":{"succeeded":true,"accessToken":"fresh","user":{"id":"u1","username":"alice","displayName":"Alice"}}}}"#,
            ),
            MockTransport::response(200, r#"{"data":{"shop":{"name":"Main Street"}}}"#),
        ]));

        let retry = Arc::new(RetryingTransport::new(mock.clone(), RetryPolicy::default()));
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = test_vault(dir.path());
        vault.save(CREDENTIAL_SLOT, "alice\nhunter2").expect("save");

        let auth = Arc::new(AuthManager::new(
            ApiClient::new(ENDPOINT, retry.clone()),
            vault,
        ));
        auth.session().set(seeded_session("stale"));

        let bearer = Arc::new(BearerTransport::new(retry, auth.clone()));
        let client = ApiClient::new(ENDPOINT, bearer);

        let data: ShopData = client
            .graphql(
                "query { shop { name } }",
                json!({}),
                &CancellationToken::new(),
            )
            .await
            .expect("data");

        assert_eq!(data.shop.name, "Main Street");
        assert_eq!(auth.session().token().as_deref(), Some("fresh"));
        assert_eq!(mock.call_count(), 4);
    }
}

