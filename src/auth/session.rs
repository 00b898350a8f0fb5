//! Session state shared across the pipeline.
//!
//! There is exactly one session per running client. It is either empty
//! or fully populated (token + user); readers get snapshots and all
//! mutation goes through the auth manager in this module's parent.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::AuthUser;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub access_token: String,
    pub user: AuthUser,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(access_token: String, user: AuthUser) -> Self {
        Self {
            access_token,
            user,
            created_at: Utc::now(),
        }
    }

    /// Age of the session, for display.
    pub fn age(&self) -> Duration {
        Utc::now() - self.created_at
    }
}

/// Cheap-to-clone handle to the one process-wide session.
#[derive(Clone, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<Option<SessionData>>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<SessionData>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<SessionData>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Option<SessionData> {
        self.read().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.read().as_ref().map(|d| d.access_token.clone())
    }

    pub fn user(&self) -> Option<AuthUser> {
        self.read().as_ref().map(|d| d.user.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    pub(crate) fn set(&self, data: SessionData) {
        *self.write() = Some(data);
    }

    pub(crate) fn clear(&self) {
        *self.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> AuthUser {
        AuthUser {
            id: "u1".to_string(),
            username: "alice".to_string(),
            display_name: "Alice".to_string(),
            roles: vec!["manager".to_string()],
        }
    }

    #[test]
    fn test_session_is_all_or_nothing() {
        let handle = SessionHandle::new();
        assert!(!handle.is_authenticated());
        assert!(handle.token().is_none());
        assert!(handle.user().is_none());

        handle.set(SessionData::new("tok-1".to_string(), user()));
        assert!(handle.is_authenticated());
        assert_eq!(handle.token().as_deref(), Some("tok-1"));
        assert_eq!(handle.user().map(|u| u.username).as_deref(), Some("alice"));

        handle.clear();
        assert!(!handle.is_authenticated());
        assert!(handle.token().is_none());
        assert!(handle.user().is_none());
    }

    #[test]
    fn test_snapshots_are_detached() {
        let handle = SessionHandle::new();
        handle.set(SessionData::new("tok-1".to_string(), user()));
        let snapshot = handle.snapshot().expect("snapshot");
        handle.clear();
        // The snapshot survives later mutation.
        assert_eq!(snapshot.access_token, "tok-1");
    }
}
