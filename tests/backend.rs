//! Integration tests against a running option-chain backend.
//!
//! # Running
//!
//! These tests need a reachable backend and a valid bearer credential:
//!
//! ```sh
//! export CHAIN_API_URL="http://localhost:8000"
//! export CHAIN_WS_URL="ws://localhost:8000/ws/option-chain"
//! export CHAIN_TOKEN="your-bearer-token"
//! cargo test --test backend -- --nocapture
//! ```
//!
//! Without these env vars, every test is silently skipped.
//!
//! # What is tested
//!
//! - **Expiries**: expiry list loads and parses
//! - **Token status**: broker session check
//! - **Push channel**: connect, subscribe, first ladder snapshot
//! - **Error handling**: bad credential produces an authentication error

use std::time::Duration;

use chainwatch::client::BackendClient;
use chainwatch::config::ChainConfig;
use chainwatch::error::{ErrorKind, classify};
use chainwatch::types::channel::SubscribeRequest;
use chainwatch::ws::channel::{ChainChannel, ChannelEvent};

struct Backend {
    client: BackendClient,
    config: ChainConfig,
}

/// Helper: build a client for the configured backend or skip the test.
fn backend() -> Option<Backend> {
    let api_url = std::env::var("CHAIN_API_URL").ok()?;
    let token = std::env::var("CHAIN_TOKEN").ok()?;
    if api_url.is_empty() || token.is_empty() {
        return None;
    }
    let mut config = ChainConfig {
        api_base_url: api_url.clone(),
        auto_reconnect: false,
        ..ChainConfig::default()
    };
    if let Ok(ws_url) = std::env::var("CHAIN_WS_URL") {
        config.ws_url = ws_url;
    }
    let client = BackendClient::with_base_url(token, api_url).ok()?;
    Some(Backend { client, config })
}

/// Macro to skip a test when the backend is not configured.
macro_rules! require_backend {
    () => {
        match backend() {
            Some(b) => b,
            None => {
                eprintln!("⏭  Skipped (CHAIN_API_URL / CHAIN_TOKEN not set)");
                return;
            }
        }
    };
}

// ===================================================================
// REST
// ===================================================================

#[tokio::test]
async fn test_expiry_dates() {
    let backend = require_backend!();
    let dates = backend
        .client
        .get_expiry_dates()
        .await
        .expect("get_expiry_dates failed");
    assert!(!dates.is_empty(), "backend should list at least one expiry");
    assert!(dates.windows(2).all(|w| w[0] < w[1]));
    println!("✔ Expiries: {} (first {})", dates.len(), dates[0]);
}

#[tokio::test]
async fn test_token_status() {
    let backend = require_backend!();
    let status = backend
        .client
        .get_token_status()
        .await
        .expect("get_token_status failed");
    println!("✔ Token status: valid={} expires_at={:?}", status.valid, status.expires_at);
}

#[tokio::test]
async fn test_bad_credential_is_authentication_error() {
    let backend = require_backend!();
    let client = BackendClient::with_base_url("definitely-not-valid", backend.client.base_url())
        .expect("client");
    match client.get_expiry_dates().await {
        Err(e) => {
            assert_eq!(classify(&e), ErrorKind::Authentication, "{e}");
            println!("✔ Bad credential rejected: {e}");
        }
        Ok(_) => println!("⚠ Backend accepted an invalid credential"),
    }
}

// ===================================================================
// Push channel
// ===================================================================

#[tokio::test]
async fn test_channel_delivers_snapshot() {
    let backend = require_backend!();
    let dates = backend
        .client
        .get_expiry_dates()
        .await
        .expect("get_expiry_dates failed");
    let expiry = dates[0];

    let (channel, mut events) =
        ChainChannel::open(&backend.config, backend.client.token()).expect("open failed");

    let outcome = tokio::time::timeout(Duration::from_secs(30), async {
        while let Some(event) = events.recv().await {
            match event {
                ChannelEvent::Connected { epoch } => {
                    println!("✔ Connected (epoch {epoch})");
                    let request = SubscribeRequest::new(
                        &backend.config.underlying_key,
                        &backend.config.subscribe_mode,
                        expiry,
                    );
                    channel.subscribe(&request).await.expect("subscribe failed");
                }
                ChannelEvent::Snapshot(snap) => return Some(snap),
                ChannelEvent::ServerError { message } => {
                    println!("⚠ Server error: {message}");
                    return None;
                }
                ChannelEvent::ConnectionError { message } => {
                    panic!("connect failed: {message}");
                }
                other => println!("  {other:?}"),
            }
        }
        None
    })
    .await;

    match outcome {
        Ok(Some(snap)) => println!(
            "✔ Snapshot: {} contracts, ATM {:?}",
            snap.len(),
            snap.atm_strike
        ),
        Ok(None) => println!("⚠ No snapshot (broker session may need re-authentication)"),
        Err(_) => println!("⚠ No snapshot within 30s (market may be closed)"),
    }
    channel.close().await;
}
