//! Broker re-authentication types.

use serde::{Deserialize, Serialize};

/// Request body for `POST /auth/upstox`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUrlRequest {
    /// Ask the broker for a fresh consent even if a session exists.
    pub force_reauth: bool,
}

/// Response from `POST /auth/upstox`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUrlResponse {
    /// Broker consent page to open in the popup.
    pub url: String,
}

/// Response from `GET /upstox/token-status`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatus {
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub expires_at: Option<String>,
}
