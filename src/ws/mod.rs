//! WebSocket transport.
//!
//! ## [`channel`]: Option-chain push channel
//!
//! One JSON WebSocket per view, authenticated with the bearer credential in
//! the upgrade request. Carries subscribe requests upstream and strike
//! snapshots, ticks and server notices downstream. The connection task
//! re-dials after a drop and numbers every successful connection with an
//! increasing epoch.

pub mod channel;
