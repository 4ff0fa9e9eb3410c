//! Runtime configuration for the live option-chain view.

use std::time::Duration;

use crate::constants::{
    API_BASE_URL, STRIKE_STEP, SUBSCRIBE_MODE, UNDERLYING_KEY, WS_CHANNEL_URL, timing,
};

/// Configuration shared by the channel, the coordinator and the view driver.
///
/// Every field has a default matching the reference deployment; use
/// [`ChainViewBuilder`](crate::chain::view::ChainViewBuilder) to override
/// individual values.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Base URL for REST requests.
    pub api_base_url: String,
    /// WebSocket endpoint of the push channel.
    pub ws_url: String,
    /// Instrument key of the underlying the chain is built around.
    pub underlying_key: String,
    /// Strike spacing used to round the underlying price to the ATM strike.
    pub strike_step: f64,
    /// Subscription mode sent with every subscribe request.
    pub subscribe_mode: String,
    /// An unconfirmed subscribe is considered settled after this many ms.
    pub subscribe_timeout_ms: u64,
    /// Delay between an account switch to live and the resubscribe (ms).
    pub settle_delay_ms: u64,
    /// Hard cap on the re-authentication popup flow (seconds).
    pub reauth_timeout_secs: u64,
    /// Interval of the broker token-status poll (seconds). `0` disables it.
    pub token_poll_interval_secs: u64,
    /// Interval of the market-session clock (seconds).
    pub session_refresh_secs: u64,
    /// Whether the transport re-dials after the channel drops.
    pub auto_reconnect: bool,
    /// Delay before re-dialing (ms).
    pub reconnect_delay_ms: u64,
    /// Capacity of the channel event queue.
    pub event_channel_capacity: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            api_base_url: API_BASE_URL.to_owned(),
            ws_url: WS_CHANNEL_URL.to_owned(),
            underlying_key: UNDERLYING_KEY.to_owned(),
            strike_step: STRIKE_STEP,
            subscribe_mode: SUBSCRIBE_MODE.to_owned(),
            subscribe_timeout_ms: timing::SUBSCRIBE_TIMEOUT_MS,
            settle_delay_ms: timing::ACCOUNT_SETTLE_DELAY_MS,
            reauth_timeout_secs: timing::REAUTH_TIMEOUT_SECS,
            token_poll_interval_secs: timing::TOKEN_POLL_INTERVAL_SECS,
            session_refresh_secs: timing::SESSION_REFRESH_SECS,
            auto_reconnect: true,
            reconnect_delay_ms: timing::RECONNECT_DELAY_MS,
            event_channel_capacity: 1024,
        }
    }
}

impl ChainConfig {
    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_millis(self.subscribe_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn reauth_timeout(&self) -> Duration {
        Duration::from_secs(self.reauth_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
