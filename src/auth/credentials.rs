//! The remembered login credential record.
//!
//! A username/password pair serialized as a single newline-delimited
//! string; the vault encrypts the whole record before it reaches disk.

/// The one vault slot used for remembered credentials.
pub const CREDENTIAL_SLOT: &str = "login_credentials";

const DELIMITER: char = '\n';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub username: String,
    pub password: String,
}

impl CredentialRecord {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn encode(&self) -> String {
        format!("{}{}{}", self.username, DELIMITER, self.password)
    }

    /// Parse a stored record. The string must split into exactly two
    /// non-empty parts; anything else is treated as malformed.
    pub fn decode(raw: &str) -> Option<Self> {
        let (username, password) = raw.split_once(DELIMITER)?;
        if username.is_empty() || password.is_empty() || password.contains(DELIMITER) {
            return None;
        }
        Some(Self::new(username, password))
    }
}
