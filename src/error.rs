//! Error types for the `chainwatch` crate.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an
//! alias for `std::result::Result<T, ChainError>`.
//!
//! [`ChainError`] covers:
//! - **API errors**: Structured error bodies returned by the trading backend
//! - **HTTP status errors**: Unexpected status codes with response body
//! - **HTTP transport errors**: Network, TLS, timeout failures
//! - **JSON errors**: Deserialization failures
//! - **WebSocket errors**: Connection and protocol errors on the push channel
//! - **Server notices**: `error` messages pushed over the channel
//! - **Credential errors**: No bearer credential available at connect time
//!
//! [`classify`] maps any of these onto the three user-facing [`ErrorKind`]s.

use std::fmt;

use reqwest::StatusCode;

/// Error body returned by the backend on a failed request.
///
/// The backend is not consistent about which field carries the text, so every
/// field is optional.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    /// Human-readable description (`message`).
    #[serde(default)]
    pub message: Option<String>,
    /// Alternate description field (`error`).
    #[serde(default)]
    pub error: Option<String>,
    /// Machine-readable category tag (e.g. `"TOKEN_EXPIRED"`).
    #[serde(default)]
    pub error_type: Option<String>,
    /// Set when the broker session must be re-established through the
    /// consent popup.
    #[serde(default)]
    pub require_reauth: Option<bool>,
}

impl ApiErrorBody {
    /// The best available description text.
    pub fn text(&self) -> &str {
        self.message
            .as_deref()
            .or(self.error.as_deref())
            .unwrap_or("No message")
    }

    fn is_meaningful(&self) -> bool {
        self.message.is_some()
            || self.error.is_some()
            || self.error_type.is_some()
            || self.require_reauth.is_some()
    }
}

impl fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.error_type.as_deref().unwrap_or("Unknown Error"),
            self.text(),
        )
    }
}

/// All possible errors produced by the `chainwatch` client.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// A structured error response returned by the backend REST API.
    #[error("API error (HTTP {status}): {body}")]
    Api {
        /// The HTTP status code.
        status: StatusCode,
        /// The parsed error body.
        body: ApiErrorBody,
    },

    /// The server returned an unexpected HTTP status code.
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// The HTTP status code.
        status: StatusCode,
        /// The response body text.
        body: String,
    },

    /// A network or transport-level error from `reqwest`.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to (de)serialize a JSON payload.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A WebSocket-level error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// An error building or parsing a URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// An `error` notice pushed by the server over the channel.
    #[error("server error: {0}")]
    Server(String),

    /// The push channel is not connected.
    #[error("channel not connected")]
    NotConnected,

    /// No bearer credential was available from the authentication context.
    #[error("no bearer credential available")]
    MissingCredential,

    /// The caller provided an invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl ChainError {
    /// Whether the backend rejected the bearer credential itself, as opposed
    /// to the broker session behind it. These go to
    /// [`AuthContext::on_fatal_credential_error`](crate::collab::AuthContext::on_fatal_credential_error).
    pub fn is_fatal_credential(&self) -> bool {
        match self {
            ChainError::MissingCredential => true,
            ChainError::Api { status, body } => {
                *status == StatusCode::UNAUTHORIZED
                    && body.require_reauth != Some(true)
                    && !body
                        .error_type
                        .as_deref()
                        .is_some_and(is_reauth_error_type)
            }
            ChainError::HttpStatus { status, .. } => *status == StatusCode::UNAUTHORIZED,
            _ => false,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ChainError>;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// User-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ErrorKind {
    /// The push channel failed to connect or dropped.
    Connectivity,
    /// The broker session must be re-established; never retried silently.
    Authentication,
    /// Any other failure of a subscribe round-trip.
    Subscription,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Connectivity => write!(f, "connectivity"),
            ErrorKind::Authentication => write!(f, "authentication"),
            ErrorKind::Subscription => write!(f, "subscription"),
        }
    }
}

/// `errorType` tags the backend uses for an expired or revoked broker session.
pub const REAUTH_ERROR_TYPES: &[&str] = &[
    "TOKEN_EXPIRED",
    "INVALID_TOKEN",
    "UPSTOX_AUTH_REQUIRED",
    "REAUTH_REQUIRED",
    "UNAUTHORIZED",
];

/// Lower-case phrases that indicate an expired session when no structured
/// marker is present. Only consulted as a last resort.
pub const REAUTH_PHRASES: &[&str] = &[
    "token expired",
    "token has expired",
    "invalid token",
    "invalid access token",
    "session expired",
    "re-authenticate",
    "reauthenticate",
];

/// Map an error onto its [`ErrorKind`].
///
/// Structured markers win: 401/403, `requireReauth`, then known `errorType`
/// tags. Free-text matching against [`REAUTH_PHRASES`] runs only on the text
/// of API bodies and server notices.
pub fn classify(err: &ChainError) -> ErrorKind {
    match err {
        ChainError::Api { status, body } => {
            if is_auth_status(*status)
                || body.require_reauth == Some(true)
                || body
                    .error_type
                    .as_deref()
                    .is_some_and(is_reauth_error_type)
                || mentions_expired_session(body.text())
            {
                ErrorKind::Authentication
            } else {
                ErrorKind::Subscription
            }
        }
        ChainError::HttpStatus { status, body } => {
            if is_auth_status(*status) || mentions_expired_session(body) {
                ErrorKind::Authentication
            } else {
                ErrorKind::Subscription
            }
        }
        ChainError::Server(message) => {
            if mentions_expired_session(message) {
                ErrorKind::Authentication
            } else {
                ErrorKind::Subscription
            }
        }
        ChainError::MissingCredential => ErrorKind::Authentication,
        ChainError::WebSocket(_) | ChainError::NotConnected => ErrorKind::Connectivity,
        ChainError::Http(e) if e.is_connect() || e.is_timeout() => ErrorKind::Connectivity,
        ChainError::Http(e) if e.status().is_some_and(is_auth_status) => {
            ErrorKind::Authentication
        }
        ChainError::Http(_)
        | ChainError::Json(_)
        | ChainError::Url(_)
        | ChainError::InvalidArgument(_) => ErrorKind::Subscription,
    }
}

fn is_auth_status(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

fn is_reauth_error_type(tag: &str) -> bool {
    REAUTH_ERROR_TYPES
        .iter()
        .any(|known| known.eq_ignore_ascii_case(tag))
}

fn mentions_expired_session(text: &str) -> bool {
    let lower = text.to_lowercase();
    REAUTH_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// Parse a failed response body into the most specific [`ChainError`].
pub(crate) fn error_from_body(status: StatusCode, body: &str) -> ChainError {
    if let Ok(api_err) = serde_json::from_str::<ApiErrorBody>(body) {
        if api_err.is_meaningful() {
            return ChainError::Api {
                status,
                body: api_err,
            };
        }
    }
    ChainError::HttpStatus {
        status,
        body: body.to_owned(),
    }
}
