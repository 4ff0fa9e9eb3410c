//! Live option-chain view driver.
//!
//! [`ChainView`] owns the push channel for as long as [`ChainView::run`] is
//! running and processes everything on one task: channel events, user
//! commands, completions of background work, and the two timers (session
//! clock, token-status poll). Handlers never overlap, so the state in
//! [`LiveChain`] needs no locking.
//!
//! ```text
//!   ChainHandle ──commands──▶ ┌────────────┐ ◀──events── ChainChannel
//!                              │ ChainView  │
//!   spawned work ──internal──▶ │ (one task) │ ──Command──▶ subscribe / HTTP / timers
//!                              └─────┬──────┘
//!                                    │ watch
//!                                    ▼
//!                              ChainSnapshot
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chainwatch::chain::view::ChainViewBuilder;
//! use chainwatch::collab::{StaticToken, TracingNotifier};
//! # use chainwatch::chain::reauth::{PopupOutcome, ReauthPopup};
//! # struct NoPopup;
//! # impl ReauthPopup for NoPopup {
//! #     fn open(&self, _url: &str) -> tokio::sync::oneshot::Receiver<PopupOutcome> {
//! #         tokio::sync::oneshot::channel().1
//! #     }
//! #     fn close(&self) {}
//! # }
//!
//! # #[tokio::main]
//! # async fn main() -> chainwatch::error::Result<()> {
//! let (view, handle) = ChainViewBuilder::new(
//!     Arc::new(StaticToken("bearer".into())),
//!     Arc::new(TracingNotifier),
//!     Arc::new(NoPopup),
//! )
//! .api_base_url("https://backend.example.com")
//! .ws_url("wss://backend.example.com/ws/option-chain")
//! .build()?;
//!
//! let mut updates = handle.updates();
//! tokio::spawn(view.run());
//! while updates.changed().await.is_ok() {
//!     let snapshot = updates.borrow().clone();
//!     println!("{} rows, ATM {:?}", snapshot.rows.len(), snapshot.atm_strike);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::chain::coordinator::{Command, Phase, RequestTicket, SubscriptionError};
use crate::chain::display::{StrikeRow, put_call_ratio};
use crate::chain::live::LiveChain;
use crate::chain::reauth::{ReauthOutcome, ReauthPopup, reauthenticate};
use crate::chain::session::{EXCHANGE_OFFSET, MarketSession};
use crate::client::BackendClient;
use crate::collab::{AuthContext, NoticeLevel, Notifier};
use crate::config::ChainConfig;
use crate::error::{ChainError, ErrorKind, Result};
use crate::types::auth::TokenStatus;
use crate::types::option_chain::{ExpiryOption, UnderlyingQuote};
use crate::ws::channel::{ChainChannel, ConnectionState};

// ---------------------------------------------------------------------------
// Published state
// ---------------------------------------------------------------------------

/// Everything a renderer needs, published after every handled input.
#[derive(Debug, Clone, Serialize)]
pub struct ChainSnapshot {
    pub connection: ConnectionState,
    pub phase: Phase,
    pub last_error: Option<SubscriptionError>,
    pub requires_reauth: bool,
    pub expiries: Vec<ExpiryOption>,
    pub selected_expiry: Option<NaiveDate>,
    pub quote: Option<UnderlyingQuote>,
    pub atm_strike: Option<f64>,
    pub rows: Vec<StrikeRow>,
    pub put_call_ratio: Option<f64>,
    pub session: MarketSession,
    pub broker_token_valid: Option<bool>,
}

impl ChainSnapshot {
    fn initial() -> Self {
        Self {
            connection: ConnectionState::Connecting,
            phase: Phase::Idle,
            last_error: None,
            requires_reauth: false,
            expiries: Vec::new(),
            selected_expiry: None,
            quote: None,
            atm_strike: None,
            rows: Vec::new(),
            put_call_ratio: None,
            session: MarketSession::at(&Utc::now()),
            broker_token_valid: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Commands and internal events
// ---------------------------------------------------------------------------

/// Inputs from the user-facing side.
#[derive(Debug, Clone)]
pub enum ViewCommand {
    SelectExpiry(NaiveDate),
    AccountSwitchedToLive,
    Retry,
    Reauthenticate { force: bool },
    Shutdown,
}

/// Completions of background work, posted back into the view's queue.
#[derive(Debug)]
enum Internal {
    ExpiriesLoaded(Result<Vec<NaiveDate>>),
    FallbackFinished {
        ticket: RequestTicket,
        result: Result<()>,
    },
    SettleElapsed {
        generation: u64,
    },
    ReauthFinished(Result<ReauthOutcome>),
    TokenStatus(Result<TokenStatus>),
}

/// Cloneable handle for driving a running [`ChainView`].
#[derive(Debug, Clone)]
pub struct ChainHandle {
    commands: mpsc::Sender<ViewCommand>,
    snapshots: watch::Receiver<ChainSnapshot>,
}

impl ChainHandle {
    pub async fn select_expiry(&self, expiry: NaiveDate) -> Result<()> {
        self.send(ViewCommand::SelectExpiry(expiry)).await
    }

    pub async fn account_switched_to_live(&self) -> Result<()> {
        self.send(ViewCommand::AccountSwitchedToLive).await
    }

    pub async fn retry(&self) -> Result<()> {
        self.send(ViewCommand::Retry).await
    }

    pub async fn reauthenticate(&self, force: bool) -> Result<()> {
        self.send(ViewCommand::Reauthenticate { force }).await
    }

    /// Ask the view to stop; the channel is closed on the way out.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(ViewCommand::Shutdown).await
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> ChainSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver notified on every publish.
    pub fn updates(&self) -> watch::Receiver<ChainSnapshot> {
        self.snapshots.clone()
    }

    async fn send(&self, command: ViewCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ChainError::InvalidArgument("view is no longer running".into()))
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a [`ChainView`].
pub struct ChainViewBuilder {
    auth: Arc<dyn AuthContext>,
    notifier: Arc<dyn Notifier>,
    popup: Arc<dyn ReauthPopup>,
    config: ChainConfig,
}

impl ChainViewBuilder {
    pub fn new(
        auth: Arc<dyn AuthContext>,
        notifier: Arc<dyn Notifier>,
        popup: Arc<dyn ReauthPopup>,
    ) -> Self {
        Self {
            auth,
            notifier,
            popup,
            config: ChainConfig::default(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ChainConfig) -> Self {
        self.config = config;
        self
    }

    /// Base URL for REST requests.
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    /// WebSocket endpoint of the push channel.
    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.config.ws_url = url.into();
        self
    }

    /// Instrument key of the underlying. Default: `NSE_INDEX|Nifty 50`.
    pub fn underlying_key(mut self, key: impl Into<String>) -> Self {
        self.config.underlying_key = key.into();
        self
    }

    /// Strike spacing. Default: 50.
    pub fn strike_step(mut self, step: f64) -> Self {
        self.config.strike_step = step;
        self
    }

    /// Unconfirmed-subscribe timeout in ms. Default: 5,000.
    pub fn subscribe_timeout_ms(mut self, ms: u64) -> Self {
        self.config.subscribe_timeout_ms = ms;
        self
    }

    /// Account-switch settle delay in ms. Default: 2,000.
    pub fn settle_delay_ms(mut self, ms: u64) -> Self {
        self.config.settle_delay_ms = ms;
        self
    }

    /// Token-status poll interval in seconds; `0` disables the poll.
    /// Default: 60.
    pub fn token_poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.token_poll_interval_secs = secs;
        self
    }

    /// Enable or disable transport re-dialing. Default: true.
    pub fn auto_reconnect(mut self, enable: bool) -> Self {
        self.config.auto_reconnect = enable;
        self
    }

    /// Re-dial delay in ms. Default: 2,000.
    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    /// Build the view and its handle.
    ///
    /// Fails with [`ChainError::MissingCredential`] (after escalating to the
    /// auth context) when no bearer credential is available.
    pub fn build(self) -> Result<(ChainView, ChainHandle)> {
        let step = self.config.strike_step;
        if step.is_nan() || step <= 0.0 {
            return Err(ChainError::InvalidArgument(format!(
                "strike step must be positive, got {step}"
            )));
        }
        let Some(token) = self.auth.bearer_token() else {
            let err = ChainError::MissingCredential;
            self.auth.on_fatal_credential_error(&err);
            return Err(err);
        };
        let client = BackendClient::with_base_url(token, &self.config.api_base_url)?;

        let (commands_tx, commands_rx) = mpsc::channel(64);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (published, snapshots) = watch::channel(ChainSnapshot::initial());

        let view = ChainView {
            chain: LiveChain::new(&self.config),
            config: self.config,
            client,
            auth: self.auth,
            notifier: self.notifier,
            popup: self.popup,
            commands: commands_rx,
            internal_tx,
            internal_rx,
            published,
            connection: ConnectionState::Connecting,
            session: MarketSession::at(&Utc::now()),
            broker_token_valid: None,
            reauth_running: false,
        };
        let handle = ChainHandle {
            commands: commands_tx,
            snapshots,
        };
        Ok((view, handle))
    }
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

/// The live option-chain view. Consumed by [`run`](Self::run).
pub struct ChainView {
    config: ChainConfig,
    client: BackendClient,
    auth: Arc<dyn AuthContext>,
    notifier: Arc<dyn Notifier>,
    popup: Arc<dyn ReauthPopup>,
    chain: LiveChain,
    commands: mpsc::Receiver<ViewCommand>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    published: watch::Sender<ChainSnapshot>,
    connection: ConnectionState,
    session: MarketSession,
    broker_token_valid: Option<bool>,
    reauth_running: bool,
}

impl ChainView {
    /// Connect, then process inputs until shutdown or until every
    /// [`ChainHandle`] is dropped. The channel is closed on return.
    pub async fn run(mut self) -> Result<()> {
        let (channel, mut events) = ChainChannel::open(&self.config, self.client.token())?;
        self.spawn_expiry_load();

        let mut session_clock = tokio::time::interval(Duration::from_secs(
            self.config.session_refresh_secs.max(1),
        ));
        session_clock.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let poll_enabled = self.config.token_poll_interval_secs > 0;
        let mut token_poll = tokio::time::interval(Duration::from_secs(
            self.config.token_poll_interval_secs.max(1),
        ));

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::info!("Push channel task finished");
                        break;
                    };
                    let commands = self.chain.handle(event, Instant::now());
                    self.execute(&channel, commands).await;
                }
                Some(internal) = self.internal_rx.recv() => {
                    self.on_internal(&channel, internal).await;
                }
                command = self.commands.recv() => match command {
                    None | Some(ViewCommand::Shutdown) => break,
                    Some(command) => self.on_command(&channel, command).await,
                },
                _ = session_clock.tick() => {
                    self.session = MarketSession::at(&Utc::now());
                }
                _ = token_poll.tick(), if poll_enabled => {
                    self.spawn_token_poll();
                }
            }
            self.connection = channel.state();
            self.publish();
        }

        channel.close().await;
        self.connection = ConnectionState::Disconnected;
        self.publish();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Handlers
    // -----------------------------------------------------------------------

    async fn on_command(&mut self, channel: &ChainChannel, command: ViewCommand) {
        let now = Instant::now();
        let commands = match command {
            ViewCommand::SelectExpiry(expiry) => self.chain.select_expiry(expiry, now),
            ViewCommand::AccountSwitchedToLive => self.chain.account_switched_to_live(),
            ViewCommand::Retry => self.chain.retry(now),
            ViewCommand::Reauthenticate { force } => {
                self.spawn_reauth(force);
                Vec::new()
            }
            ViewCommand::Shutdown => Vec::new(),
        };
        self.execute(channel, commands).await;
    }

    async fn on_internal(&mut self, channel: &ChainChannel, internal: Internal) {
        let now = Instant::now();
        let commands = match internal {
            Internal::ExpiriesLoaded(Ok(dates)) => {
                let today = Utc::now().with_timezone(&EXCHANGE_OFFSET).date_naive();
                self.chain.set_expiries(dates, today, now)
            }
            Internal::ExpiriesLoaded(Err(e)) => {
                self.report_request_error("Failed to load expiry dates", &e);
                Vec::new()
            }
            Internal::FallbackFinished { ticket, result } => {
                if let Err(e) = &result {
                    if e.is_fatal_credential() && self.chain.coordinator().is_current(ticket) {
                        self.auth.on_fatal_credential_error(e);
                    }
                }
                let accepted = self.chain.on_fallback_result(ticket, result);
                if accepted {
                    self.notify_phase_error();
                }
                Vec::new()
            }
            Internal::SettleElapsed { generation } => self.chain.on_settle_elapsed(generation, now),
            Internal::ReauthFinished(result) => {
                self.reauth_running = false;
                match result {
                    Ok(ReauthOutcome::Reauthenticated) => {
                        self.broker_token_valid = Some(true);
                        self.notifier
                            .notify(NoticeLevel::Success, "Broker session reconnected");
                        self.chain.on_reauthenticated(now)
                    }
                    Ok(ReauthOutcome::Cancelled) => {
                        self.notifier
                            .notify(NoticeLevel::Warning, "Broker re-authentication cancelled");
                        Vec::new()
                    }
                    Ok(ReauthOutcome::TimedOut) => {
                        self.notifier
                            .notify(NoticeLevel::Warning, "Broker re-authentication timed out");
                        Vec::new()
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Re-authentication failed");
                        self.notifier.notify(
                            NoticeLevel::Error,
                            &format!("Re-authentication failed: {e}"),
                        );
                        Vec::new()
                    }
                }
            }
            Internal::TokenStatus(Ok(status)) => {
                if !status.valid && self.broker_token_valid != Some(false) {
                    self.notifier.notify(
                        NoticeLevel::Warning,
                        "Broker session expired; reconnect to resume live data",
                    );
                }
                self.broker_token_valid = Some(status.valid);
                Vec::new()
            }
            Internal::TokenStatus(Err(e)) => {
                if e.is_fatal_credential() {
                    self.auth.on_fatal_credential_error(&e);
                } else {
                    tracing::debug!(error = %e, "Token status poll failed");
                }
                Vec::new()
            }
        };
        self.execute(channel, commands).await;
    }

    /// Carry out coordinator commands.
    async fn execute(&mut self, channel: &ChainChannel, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::Subscribe { ticket, request } => {
                    if let Err(e) = channel.subscribe(&request).await {
                        // The lifecycle events that follow a dead socket move
                        // the coordinator back to Idle.
                        tracing::warn!(?ticket, error = %e, "Failed to send subscribe");
                    }
                }
                Command::HttpFallback { ticket, fallback } => {
                    let client = self.client.clone();
                    let tx = self.internal_tx.clone();
                    tokio::spawn(async move {
                        let result = client.post_fallback(&fallback).await.map(|_| ());
                        let _ = tx.send(Internal::FallbackFinished { ticket, result });
                    });
                }
                Command::ScheduleResubscribe { generation, after } => {
                    let tx = self.internal_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = tx.send(Internal::SettleElapsed { generation });
                    });
                }
                // Applied by LiveChain before commands reach the driver.
                Command::ClearLadder => {}
            }
        }
    }

    // -----------------------------------------------------------------------
    // Background work
    // -----------------------------------------------------------------------

    fn spawn_expiry_load(&self) {
        let client = self.client.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = client.get_expiry_dates().await;
            let _ = tx.send(Internal::ExpiriesLoaded(result));
        });
    }

    fn spawn_token_poll(&self) {
        let client = self.client.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = client.get_token_status().await;
            let _ = tx.send(Internal::TokenStatus(result));
        });
    }

    fn spawn_reauth(&mut self, force: bool) {
        if self.reauth_running {
            tracing::debug!("Re-authentication already running");
            return;
        }
        self.reauth_running = true;
        let client = self.client.clone();
        let popup = self.popup.clone();
        let cap = self.config.reauth_timeout();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = reauthenticate(&client, popup.as_ref(), force, cap).await;
            let _ = tx.send(Internal::ReauthFinished(result));
        });
    }

    // -----------------------------------------------------------------------
    // Reporting
    // -----------------------------------------------------------------------

    fn report_request_error(&self, context: &str, err: &ChainError) {
        if err.is_fatal_credential() {
            self.auth.on_fatal_credential_error(err);
            return;
        }
        let message = match crate::error::classify(err) {
            ErrorKind::Authentication => {
                format!("{context}: broker session expired, reconnect to continue")
            }
            _ => format!("{context}: {err}"),
        };
        self.notifier.notify(NoticeLevel::Error, &message);
    }

    fn notify_phase_error(&self) {
        if let Phase::Error(error) = self.chain.coordinator().phase() {
            let message = if error.requires_reauth {
                "Broker session expired; reconnect to resume live data".to_owned()
            } else {
                format!("Subscription failed: {}", error.message)
            };
            self.notifier.notify(NoticeLevel::Error, &message);
        }
    }

    fn publish(&self) {
        let store = self.chain.store();
        let coordinator = self.chain.coordinator();
        let snapshot = ChainSnapshot {
            connection: self.connection,
            phase: coordinator.phase().clone(),
            last_error: coordinator.last_error().cloned(),
            requires_reauth: coordinator.requires_reauth(),
            expiries: self.chain.expiries().to_vec(),
            selected_expiry: self.chain.selected_expiry(),
            quote: store.quote().cloned(),
            atm_strike: store.ladder().map(|l| l.atm_strike()),
            rows: self.chain.rows(),
            put_call_ratio: store.ladder().and_then(put_call_ratio),
            session: self.session,
            broker_token_valid: self.broker_token_valid,
        };
        self.published.send_replace(snapshot);
    }
}
