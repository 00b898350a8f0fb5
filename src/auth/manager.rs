//! Auth orchestrator: login, logout, silent auto-login, refresh.
//!
//! Owns the one [`SessionHandle`] and is the only component that
//! mutates it. Login runs through a retry-only pipeline (no bearer
//! layer; the login mutation carries no token), and the manager itself
//! is the [`TokenSource`] the bearer layer consults for authenticated
//! traffic.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError, TokenSource};
use crate::models::AuthUser;

use super::credentials::{CredentialRecord, CREDENTIAL_SLOT};
use super::session::{SessionData, SessionHandle};
use super::vault::CredentialVault;

const LOGIN_MUTATION: &str = "\
mutation Login($username: String!, $password: String!) {
  login(username: $username, password: $password) {
    succeeded
    message
    accessToken
    user {
      id
      username
      displayName
      roles
    }
  }
}";

#[derive(Debug, Deserialize)]
struct LoginData {
    login: LoginPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginPayload {
    succeeded: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    user: Option<AuthUser>,
}

/// What a login attempt produced. Failures carry a user-displayable
/// message rather than an error; transport and protocol failures are
/// folded into that message too.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Success(SessionData),
    Failed { message: String },
}

impl LoginOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, LoginOutcome::Success(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            LoginOutcome::Success(_) => None,
            LoginOutcome::Failed { message } => Some(message),
        }
    }
}

pub struct AuthManager {
    session: SessionHandle,
    vault: CredentialVault,
    client: ApiClient,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl AuthManager {
    /// `client` must be the retry-only pipeline; routing login through
    /// the bearer layer would recurse into refresh.
    pub fn new(client: ApiClient, vault: CredentialVault) -> Self {
        Self {
            session: SessionHandle::new(),
            vault,
            client,
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Log in and, on success, populate the session. With `remember`
    /// the credential pair is vaulted for silent auto-login; without it
    /// any previously vaulted pair is deleted. Never raises: connection
    /// and protocol failures degrade to a `Failed` outcome.
    pub async fn login(&self, username: &str, password: &str, remember: bool) -> LoginOutcome {
        match self.login_inner(username, password, remember).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Login request failed");
                LoginOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn login_inner(
        &self,
        username: &str,
        password: &str,
        remember: bool,
    ) -> Result<LoginOutcome, ApiError> {
        let cancel = CancellationToken::new();
        let variables = json!({ "username": username, "password": password });
        let data: LoginData = self
            .client
            .graphql(LOGIN_MUTATION, variables, &cancel)
            .await?;

        let payload = data.login;
        if !payload.succeeded {
            debug!(username, "Login rejected by backend");
            return Ok(LoginOutcome::Failed {
                message: payload
                    .message
                    .unwrap_or_else(|| "Login failed".to_string()),
            });
        }

        let (Some(token), Some(user)) = (payload.access_token, payload.user) else {
            return Ok(LoginOutcome::Failed {
                message: "Login succeeded but returned no session".to_string(),
            });
        };

        let session = SessionData::new(token, user);
        self.session.set(session.clone());

        if remember {
            let record = CredentialRecord::new(username, password);
            if let Err(e) = self.vault.save(CREDENTIAL_SLOT, &record.encode()) {
                warn!(error = %e, "Failed to store remembered credentials");
            }
        } else if let Err(e) = self.vault.delete(CREDENTIAL_SLOT) {
            warn!(error = %e, "Failed to delete stored credentials");
        }

        Ok(LoginOutcome::Success(session))
    }

    /// Silent login from the vaulted credential record. Absent or
    /// malformed records return `false` without touching the network.
    pub async fn try_auto_login(&self) -> bool {
        let Some(record) = self.vaulted_record() else {
            return false;
        };
        self.login(&record.username, &record.password, true)
            .await
            .succeeded()
    }

    /// Clear the session (which also detaches the bearer token, since
    /// the bearer layer reads through the session handle) and delete
    /// the vaulted credentials.
    pub fn logout(&self) {
        self.session.clear();
        if let Err(e) = self.vault.delete(CREDENTIAL_SLOT) {
            warn!(error = %e, "Failed to delete stored credentials");
        }
        debug!("Logged out");
    }

    fn vaulted_record(&self) -> Option<CredentialRecord> {
        match self.vault.load(CREDENTIAL_SLOT) {
            Ok(Some(raw)) => match CredentialRecord::decode(&raw) {
                Some(record) => Some(record),
                None => {
                    warn!("Stored credential record is malformed");
                    None
                }
            },
            Ok(None) => {
                debug!("No stored credentials");
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to load stored credentials");
                None
            }
        }
    }

    /// Re-run login with the vaulted credentials. Concurrent refreshes
    /// are coalesced: a caller that finds the token already rotated
    /// while it waited for the lock reports success without a redundant
    /// login round trip. A failed refresh leaves any existing session
    /// in place; only an explicit logout clears it.
    async fn refresh_session(&self) -> bool {
        let stale = self.session.token();
        let _guard = self.refresh_lock.lock().await;
        if self.session.token() != stale {
            debug!("Token already refreshed by a concurrent request");
            return self.session.is_authenticated();
        }

        let Some(record) = self.vaulted_record() else {
            return false;
        };
        self.login(&record.username, &record.password, true)
            .await
            .succeeded()
    }
}

#[async_trait]
impl TokenSource for AuthManager {
    fn access_token(&self) -> Option<String> {
        self.session.token()
    }

    async fn refresh(&self) -> bool {
        self.refresh_session().await
    }
}
