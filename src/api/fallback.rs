//! HTTP fallback for subscribe requests.

use serde_json::Value;

use crate::client::BackendClient;
use crate::error::Result;
use crate::types::channel::HttpFallback;

impl BackendClient {
    /// Issue the POST described by a `useHttpEndpoint` instruction.
    ///
    /// The response body is returned untouched; ladder data still arrives
    /// over the push channel.
    pub async fn post_fallback(&self, fallback: &HttpFallback) -> Result<Value> {
        tracing::info!(endpoint = %fallback.endpoint, "Issuing HTTP subscribe fallback");
        self.post(&fallback.endpoint, &fallback.payload).await
    }
}
