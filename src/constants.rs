//! Constants for the option-chain backend.
//!
//! Contains default endpoints, REST paths, the reference underlying, and the
//! timing values used by the subscription coordinator and the view driver.
//! All of them can be overridden through [`ChainConfig`](crate::config::ChainConfig).

// ---------------------------------------------------------------------------
// Base URLs
// ---------------------------------------------------------------------------

/// Default base URL for the backend REST API.
pub const API_BASE_URL: &str = "http://localhost:8000";

/// Default WebSocket endpoint for the push channel.
pub const WS_CHANNEL_URL: &str = "ws://localhost:8000/ws/option-chain";

// ---------------------------------------------------------------------------
// REST paths
// ---------------------------------------------------------------------------

/// REST paths consumed by [`BackendClient`](crate::client::BackendClient).
pub mod paths {
    /// `GET`: available expiry dates for the reference underlying.
    pub const EXPIRY_DATES: &str = "/upstox/expiry-dates";
    /// `POST`: broker consent URL for the re-authentication popup.
    pub const AUTH_URL: &str = "/auth/upstox";
    /// `POST`: exchange the completed consent for a fresh broker token.
    pub const REFRESH_TOKEN: &str = "/upstox/refresh-token";
    /// `GET`: validity of the stored broker token.
    pub const TOKEN_STATUS: &str = "/upstox/token-status";
}

// ---------------------------------------------------------------------------
// Instrument universe
// ---------------------------------------------------------------------------

/// Instrument key of the reference underlying index.
pub const UNDERLYING_KEY: &str = "NSE_INDEX|Nifty 50";

/// Strike spacing of the reference underlying.
pub const STRIKE_STEP: f64 = 50.0;

/// Subscription mode sent with every subscribe request.
pub const SUBSCRIBE_MODE: &str = "ltpc";

/// `method` field of a subscribe request.
pub const SUBSCRIBE_METHOD: &str = "sub";

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Timing defaults used by the coordinator and the view driver.
pub mod timing {
    /// An unconfirmed subscribe is considered settled after this long.
    pub const SUBSCRIBE_TIMEOUT_MS: u64 = 5_000;
    /// Delay between an account switch to live and the resubscribe.
    pub const ACCOUNT_SETTLE_DELAY_MS: u64 = 2_000;
    /// Hard cap on the re-authentication popup flow.
    pub const REAUTH_TIMEOUT_SECS: u64 = 5 * 60;
    /// Fixed interval of the broker token-status poll.
    pub const TOKEN_POLL_INTERVAL_SECS: u64 = 60;
    /// Market-session clock refresh interval.
    pub const SESSION_REFRESH_SECS: u64 = 60;
    /// Delay before the transport re-dials a dropped channel.
    pub const RECONNECT_DELAY_MS: u64 = 2_000;
}

// ---------------------------------------------------------------------------
// Trading hours (IST, UTC+05:30)
// ---------------------------------------------------------------------------

/// Weekday trading window of the reference exchange.
pub mod session {
    /// Offset of exchange local time from UTC, in seconds.
    pub const UTC_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;
    /// Pre-open auction start (minutes after midnight).
    pub const PRE_OPEN_MINUTE: u32 = 9 * 60;
    /// Continuous trading start (minutes after midnight).
    pub const OPEN_MINUTE: u32 = 9 * 60 + 15;
    /// Continuous trading end (minutes after midnight).
    pub const CLOSE_MINUTE: u32 = 15 * 60 + 30;
    /// Minutes before the close that count as "closing soon".
    pub const CLOSING_SOON_MINUTES: u32 = 15;
}
