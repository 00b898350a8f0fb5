//! Authentication: session state, credential vault, and the orchestrator.
//!
//! This module provides:
//! - `SessionHandle` / `SessionData`: the one process-wide session
//! - `CredentialVault`: encrypted at-rest storage, keyed off the OS keychain
//! - `AuthManager`: login, logout, silent auto-login, and token refresh

pub mod credentials;
pub mod manager;
pub mod session;
pub mod vault;

pub use credentials::{CredentialRecord, CREDENTIAL_SLOT};
pub use manager::{AuthManager, LoginOutcome};
pub use session::{SessionData, SessionHandle};
pub use vault::CredentialVault;
