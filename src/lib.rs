//! # chainwatch
//!
//! Live option-chain client: keeps one push channel open to the backend,
//! subscribes to the strike ladder of the selected expiry and keeps it
//! grouped around the at-the-money strike as ticks arrive.
//!
//! ## Quick Start
//!
//! ```no_run
//! use chainwatch::client::BackendClient;
//!
//! #[tokio::main]
//! async fn main() -> chainwatch::error::Result<()> {
//!     let client = BackendClient::with_base_url("your-bearer-token", "http://localhost:8000")?;
//!     let expiries = client.get_expiry_dates().await?;
//!     println!("next expiry: {:?}", expiries.first());
//!     Ok(())
//! }
//! ```
//!
//! For the live view see [`chain::view::ChainViewBuilder`].

pub mod api;
pub mod chain;
pub mod client;
pub mod collab;
pub mod config;
pub mod constants;
pub mod error;
pub mod types;
pub mod ws;

/// Re-export the main client type at crate root for convenience.
pub use client::BackendClient;
/// Re-export the configuration.
pub use config::ChainConfig;
/// Re-export the error type and Result alias.
pub use error::{ChainError, Result};
