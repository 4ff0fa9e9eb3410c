//! Request, response and wire types for the option-chain backend.
//!
//! ## Organization
//!
//! - [`enums`]: Instrument type, tick kind, moneyness
//! - [`option_chain`]: Contracts, ladder snapshots, ticks, expiries
//! - [`channel`]: Subscribe requests and HTTP fallback instructions
//! - [`auth`]: Broker re-authentication and token status
//!
//! All enums are re-exported at the module root via `pub use enums::*`.

pub mod auth;
pub mod channel;
pub mod enums;
pub mod option_chain;

pub use enums::*;
