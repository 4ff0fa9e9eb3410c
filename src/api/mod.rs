//! REST endpoint implementations.
//!
//! Each sub-module adds `async` methods to
//! [`BackendClient`](crate::client::BackendClient) via `impl` blocks. All
//! methods handle JSON serialization, HTTP transport, and error mapping.
//!
//! | Module | Endpoints | Description |
//! |---|---|---|
//! | [`expiry`] | 1 | Expiry dates of the reference underlying |
//! | [`fallback`] | 1 | Server-directed subscribe over HTTP |
//! | [`auth`] | 3 | Broker consent URL, token refresh, token status |

pub mod auth;
pub mod expiry;
pub mod fallback;
