//! Broker re-authentication endpoints.

use serde_json::Value;

use crate::client::BackendClient;
use crate::constants::paths;
use crate::error::Result;
use crate::types::auth::{AuthUrlRequest, AuthUrlResponse, TokenStatus};

impl BackendClient {
    /// Request the broker consent URL to open in the re-authentication popup.
    ///
    /// **Endpoint:** `POST /auth/upstox`
    pub async fn request_auth_url(&self, force_reauth: bool) -> Result<AuthUrlResponse> {
        self.post(paths::AUTH_URL, &AuthUrlRequest { force_reauth })
            .await
    }

    /// Exchange a completed consent for a fresh broker token.
    ///
    /// **Endpoint:** `POST /upstox/refresh-token`
    pub async fn refresh_broker_token(&self) -> Result<Value> {
        self.post(paths::REFRESH_TOKEN, &Value::Object(Default::default()))
            .await
    }

    /// Check whether the stored broker token is still valid.
    ///
    /// **Endpoint:** `GET /upstox/token-status`
    pub async fn get_token_status(&self) -> Result<TokenStatus> {
        self.get(paths::TOKEN_STATUS).await
    }
}
