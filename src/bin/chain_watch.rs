//! Binary that opens the live option-chain view against a backend and prints
//! the ladder whenever it changes.
//!
//! # Usage
//!
//! ```sh
//! export CHAIN_TOKEN="your-bearer-token"
//! export CHAIN_API_URL="http://localhost:8000"                  # optional
//! export CHAIN_WS_URL="ws://localhost:8000/ws/option-chain"     # optional
//! cargo run --bin chain_watch --features cli
//! ```
//!
//! If the broker session has expired, the consent URL is printed; finish the
//! login in a browser and press Enter.

use std::env;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use chainwatch::chain::display::{Direction, format_change, format_countdown};
use chainwatch::chain::reauth::{PopupOutcome, ReauthPopup};
use chainwatch::chain::view::{ChainSnapshot, ChainViewBuilder};
use chainwatch::collab::{StaticToken, TracingNotifier};
use chainwatch::constants::{API_BASE_URL, WS_CHANNEL_URL};
use tokio::sync::oneshot;
use tokio::time;

/// Prints the consent URL and waits for Enter on stdin.
struct TerminalPopup;

impl ReauthPopup for TerminalPopup {
    fn open(&self, url: &str) -> oneshot::Receiver<PopupOutcome> {
        println!("\nOpen this URL to reconnect the broker session:\n  {url}");
        println!("Press Enter when done…");
        let (tx, rx) = oneshot::channel();
        std::thread::spawn(move || {
            let mut line = String::new();
            let outcome = match std::io::stdin().lock().read_line(&mut line) {
                Ok(n) if n > 0 => PopupOutcome::Completed,
                _ => PopupOutcome::Cancelled,
            };
            let _ = tx.send(outcome);
        });
        rx
    }

    fn close(&self) {
        println!("Re-authentication window closed.");
    }
}

fn print_snapshot(s: &ChainSnapshot) {
    println!(
        "\n[{:?}] phase={:?} expiry={} session={:?} ({})",
        s.connection,
        s.phase,
        s.selected_expiry
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".into()),
        s.session.status,
        format_countdown(s.session.countdown_minutes),
    );
    if let Some(q) = &s.quote {
        let arrow = match Direction::of(q.change) {
            Direction::Up => "▲",
            Direction::Down => "▼",
            Direction::Flat => "=",
        };
        println!(
            "Underlying {:.2} {arrow} {}  ATM {:?}  PCR {:?}",
            q.ltp,
            format_change(q),
            s.atm_strike,
            s.put_call_ratio.map(|r| (r * 100.0).round() / 100.0),
        );
    }
    for row in &s.rows {
        let call = row.call.as_ref().map(|c| c.market.ltp).unwrap_or_default();
        let put = row.put.as_ref().map(|c| c.market.ltp).unwrap_or_default();
        println!(
            "{:>10.2} | {:>9.1} | {:>3} | {:>10.2}",
            call, row.strike, row.moneyness, put
        );
    }
}

#[tokio::main]
async fn main() -> chainwatch::error::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let token = env::var("CHAIN_TOKEN").expect("set CHAIN_TOKEN env var before running");
    let api_url = env::var("CHAIN_API_URL").unwrap_or_else(|_| API_BASE_URL.to_owned());
    let ws_url = env::var("CHAIN_WS_URL").unwrap_or_else(|_| WS_CHANNEL_URL.to_owned());

    let (view, handle) = ChainViewBuilder::new(
        Arc::new(StaticToken(token)),
        Arc::new(TracingNotifier),
        Arc::new(TerminalPopup),
    )
    .api_base_url(api_url)
    .ws_url(ws_url)
    .build()?;

    println!("Connecting to option-chain backend…");
    let runner = tokio::spawn(view.run());
    let mut updates = handle.updates();
    let mut reauth_requested = false;

    let deadline = time::sleep(Duration::from_secs(300));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                println!("\nTime is up, disconnecting…");
                break;
            }
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                print_snapshot(&snapshot);
                if snapshot.requires_reauth && !reauth_requested {
                    reauth_requested = true;
                    handle.reauthenticate(false).await?;
                } else if !snapshot.requires_reauth {
                    reauth_requested = false;
                }
            }
        }
    }

    let _ = handle.shutdown().await;
    if let Ok(result) = runner.await {
        result?;
    }
    println!("Done.");
    Ok(())
}
