//! Live option-chain subsystem.
//!
//! | Module | Role |
//! |---|---|
//! | [`ladder`] | ATM rounding and ITM/OTM/ATM partitioning |
//! | [`store`] | Current ladder and underlying quote |
//! | [`coordinator`] | When and how to (re)subscribe |
//! | [`live`] | Synchronous wiring of coordinator, store and expiry selection |
//! | [`view`] | Async driver owning the push channel |
//! | [`reauth`] | Broker re-authentication popup flow |
//! | [`display`] | Render order and formatting helpers |
//! | [`session`] | Exchange session clock |

pub mod coordinator;
pub mod display;
pub mod ladder;
pub mod live;
pub mod reauth;
pub mod session;
pub mod store;
pub mod view;
