//! Core HTTP client for the option-chain backend.
//!
//! The [`BackendClient`] struct wraps [`reqwest::Client`] with the bearer
//! credential and provides typed `get` and `post` helpers. Endpoint methods
//! are added to `BackendClient` via `impl` blocks in the [`crate::api`] module.

use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::constants::API_BASE_URL;
use crate::error::{ChainError, Result, error_from_body};

/// HTTP client for the backend REST API.
///
/// The `Authorization` header value is cached at construction time so each
/// request only clones a [`HeaderValue`].
///
/// # Example
///
/// ```no_run
/// use chainwatch::client::BackendClient;
///
/// # #[tokio::main]
/// # async fn main() -> chainwatch::error::Result<()> {
/// let client = BackendClient::new("your-bearer-token")?;
/// let expiries = client.get_expiry_dates().await?;
/// println!("{} expiries", expiries.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    /// Bearer credential attached to every request.
    token: String,
    /// Base URL for REST requests (defaults to [`API_BASE_URL`]).
    base_url: String,
    auth_header: HeaderValue,
}

impl BackendClient {
    /// Create a client for the default base URL.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, API_BASE_URL)
    }

    /// Create a client pointing at a custom base URL.
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .default_headers(Self::default_headers())
            .build()?;

        let token = token.into();
        let auth_header = Self::bearer(&token)?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        url::Url::parse(&base_url)?;

        Ok(Self {
            http,
            token,
            base_url,
            auth_header,
        })
    }

    /// Returns the current bearer credential.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Replace the bearer credential.
    pub fn set_token(&mut self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        self.auth_header = Self::bearer(&token)?;
        self.token = token;
        Ok(())
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -----------------------------------------------------------------------
    // Generic HTTP helpers
    // -----------------------------------------------------------------------

    /// Perform a GET request and deserialize the JSON response.
    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");

        let resp = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, self.auth_header.clone())
            .send()
            .await?;

        Self::handle_response(resp).await
    }

    /// Perform a POST request with a JSON body and deserialize the response.
    ///
    /// `path` may also be an absolute `http(s)://` URL, which is used as-is.
    pub async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let url = self.url(path);
        tracing::debug!(%url, "POST");

        let resp = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, self.auth_header.clone())
            .json(body)
            .send()
            .await?;

        Self::handle_response(resp).await
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn bearer(token: &str) -> Result<HeaderValue> {
        HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            ChainError::InvalidArgument("token contains invalid header characters".into())
        })
    }

    /// Build the full URL from a path segment.
    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_owned()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Default headers applied to every request.
    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    /// Read a response, returning either the deserialized body or a `ChainError`.
    ///
    /// An empty success body deserializes as JSON `null`, so endpoints that
    /// reply with `204 No Content` can be read into `Option<T>` or `Value`.
    async fn handle_response<R: DeserializeOwned>(resp: reqwest::Response) -> Result<R> {
        let status = resp.status();
        let bytes = resp.bytes().await?;

        if status.is_success() {
            if bytes.is_empty() {
                return serde_json::from_slice(b"null").map_err(ChainError::Json);
            }
            serde_json::from_slice(&bytes).map_err(ChainError::Json)
        } else {
            let body = String::from_utf8_lossy(&bytes);
            Err(error_from_body(status, &body))
        }
    }
}
