//! Pass-through DTOs the pipeline itself speaks.
//!
//! Everything else the desktop client renders (products, orders,
//! reports) lives with the UI layer; only the auth payload and the
//! upload result cross the pipeline boundary as typed values.

use serde::{Deserialize, Serialize};

/// The authenticated user identity returned by the login mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Result of a multipart file upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct UploadedAsset {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}
