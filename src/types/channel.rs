//! Push-channel message payloads: subscribe requests and HTTP fallbacks.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::SUBSCRIBE_METHOD;

/// Body of the `subscribe` message.
///
/// ```json
/// {"method":"sub","instrumentKeys":["NSE_INDEX|Nifty 50"],"mode":"ltpc","expiry":"2026-10-20"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub method: String,
    pub instrument_keys: Vec<String>,
    pub mode: String,
    pub expiry: NaiveDate,
}

impl SubscribeRequest {
    pub fn new(underlying_key: &str, mode: &str, expiry: NaiveDate) -> Self {
        Self {
            method: SUBSCRIBE_METHOD.to_owned(),
            instrument_keys: vec![underlying_key.to_owned()],
            mode: mode.to_owned(),
            expiry,
        }
    }
}

/// `useHttpEndpoint` instruction: POST `payload` to `endpoint`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpFallback {
    pub endpoint: String,
    #[serde(default)]
    pub payload: Value,
}

/// `error` notice pushed by the server.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServerNotice {
    #[serde(default)]
    pub message: Option<String>,
}
