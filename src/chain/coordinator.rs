//! Subscription coordinator.
//!
//! A sans-IO state machine deciding when a subscribe request must be
//! (re)issued and over which transport. It never performs I/O itself: every
//! operation returns the [`Command`]s the caller must carry out, and results
//! of asynchronous work are fed back in with the [`RequestTicket`] they were
//! issued under so that results of superseded requests can be dropped.
//!
//! ```text
//!            connect / select expiry / retry
//!   Idle ─────────────────────────────────────▶ Requesting
//!    ▲                                            │    │
//!    │ disconnect                       snapshot  │    │ fallback failed /
//!    │                                            ▼    ▼ server error
//!    └──────────────────────────────────── Subscribed  Error
//!          (account switch: clear, settle, then Requesting)
//! ```

use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::ChainConfig;
use crate::error::{ChainError, ErrorKind, classify};
use crate::types::channel::{HttpFallback, SubscribeRequest};

/// Monotonic counter identifying one successful channel connection.
pub type ConnectionEpoch = u64;

/// Identifies one subscribe cycle: the connection it was issued on and the
/// expiry it asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RequestTicket {
    pub epoch: ConnectionEpoch,
    pub expiry: NaiveDate,
}

/// Error held by the coordinator and shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionError {
    pub kind: ErrorKind,
    pub message: String,
    pub requires_reauth: bool,
}

impl SubscriptionError {
    pub fn from_error(err: &ChainError) -> Self {
        let kind = classify(err);
        Self {
            kind,
            message: err.to_string(),
            requires_reauth: kind == ErrorKind::Authentication,
        }
    }

    fn connectivity(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Connectivity,
            message: message.into(),
            requires_reauth: false,
        }
    }
}

/// Coordinator phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    Requesting,
    Subscribed,
    Error(SubscriptionError),
}

/// Work the caller must perform on behalf of the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Send a subscribe message over the channel.
    Subscribe {
        ticket: RequestTicket,
        request: SubscribeRequest,
    },
    /// POST the fallback payload; report the outcome with
    /// [`SubscriptionCoordinator::on_fallback_result`].
    HttpFallback {
        ticket: RequestTicket,
        fallback: HttpFallback,
    },
    /// Drop the current ladder; it no longer matches the subscription.
    ClearLadder,
    /// Call [`SubscriptionCoordinator::on_settle_elapsed`] after `after`.
    ScheduleResubscribe { generation: u64, after: Duration },
}

#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    ticket: RequestTicket,
    issued_at: Instant,
    confirmed: bool,
}

/// Decides when to subscribe and guards against redundant requests.
#[derive(Debug, Clone)]
pub struct SubscriptionCoordinator {
    underlying_key: String,
    mode: String,
    subscribe_timeout: Duration,
    settle_delay: Duration,

    phase: Phase,
    /// `Some` while the channel is connected.
    epoch: Option<ConnectionEpoch>,
    /// The subscribe cycle currently trusted, if any.
    current: Option<PendingRequest>,
    last_error: Option<SubscriptionError>,
    settle_generation: u64,
    settle_pending: bool,
}

impl SubscriptionCoordinator {
    pub fn new(config: &ChainConfig) -> Self {
        Self {
            underlying_key: config.underlying_key.clone(),
            mode: config.subscribe_mode.clone(),
            subscribe_timeout: config.subscribe_timeout(),
            settle_delay: config.settle_delay(),
            phase: Phase::Idle,
            epoch: None,
            current: None,
            last_error: None,
            settle_generation: 0,
            settle_pending: false,
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_connected(&self) -> bool {
        self.epoch.is_some()
    }

    pub fn epoch(&self) -> Option<ConnectionEpoch> {
        self.epoch
    }

    pub fn last_error(&self) -> Option<&SubscriptionError> {
        self.last_error.as_ref()
    }

    pub fn requires_reauth(&self) -> bool {
        self.last_error.as_ref().is_some_and(|e| e.requires_reauth)
    }

    /// Whether a subscribe is outstanding: issued, unconfirmed, and younger
    /// than the subscribe timeout.
    pub fn is_in_flight(&self, now: Instant) -> bool {
        self.phase == Phase::Requesting
            && self
                .current
                .is_some_and(|p| !p.confirmed && !self.timed_out(&p, now))
    }

    /// The ticket results must carry to be trusted.
    pub fn current_ticket(&self) -> Option<RequestTicket> {
        self.current
            .filter(|p| Some(p.ticket.epoch) == self.epoch)
            .map(|p| p.ticket)
    }

    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        self.current_ticket() == Some(ticket)
    }

    pub fn accepts_snapshot(&self) -> bool {
        matches!(self.phase, Phase::Requesting | Phase::Subscribed)
    }

    pub fn accepts_ticks(&self) -> bool {
        self.phase == Phase::Subscribed
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// The channel connected. Subscribes if an expiry is selected, unless an
    /// error is waiting on the user or an account-switch settle is pending.
    pub fn on_connected(
        &mut self,
        epoch: ConnectionEpoch,
        expiry: Option<NaiveDate>,
        now: Instant,
    ) -> Vec<Command> {
        tracing::info!(epoch, "Channel connected");
        self.epoch = Some(epoch);
        if self
            .last_error
            .as_ref()
            .is_some_and(|e| e.kind == ErrorKind::Connectivity)
        {
            self.last_error = None;
        }

        if matches!(self.phase, Phase::Error(_)) || self.settle_pending {
            return Vec::new();
        }
        match expiry {
            Some(expiry) => self.request(expiry, now),
            None => Vec::new(),
        }
    }

    /// The channel dropped. Nothing received so far is trusted any more.
    pub fn on_disconnected(&mut self, reason: &str) -> Vec<Command> {
        tracing::warn!(reason, "Channel disconnected");
        self.drop_connection();
        vec![Command::ClearLadder]
    }

    /// The channel failed to connect.
    pub fn on_connection_error(&mut self, message: &str) -> Vec<Command> {
        tracing::warn!(message, "Channel connection error");
        self.drop_connection();
        if !matches!(self.phase, Phase::Error(_)) {
            self.last_error = Some(SubscriptionError::connectivity(message));
        }
        vec![Command::ClearLadder]
    }

    fn drop_connection(&mut self) {
        self.epoch = None;
        self.current = None;
        if !matches!(self.phase, Phase::Error(_)) {
            self.phase = Phase::Idle;
        }
    }

    // -----------------------------------------------------------------------
    // User / external signals
    // -----------------------------------------------------------------------

    /// The selected expiry changed (or was re-selected).
    ///
    /// Re-selecting the expiry that is already subscribed, or that has a
    /// subscribe in flight, is dropped. Any other selection clears the ladder
    /// and subscribes; from `Error` this acts as a manual retry.
    pub fn select_expiry(&mut self, expiry: NaiveDate, now: Instant) -> Vec<Command> {
        if self.is_duplicate(expiry, now) {
            tracing::debug!(%expiry, "Expiry unchanged; subscribe suppressed");
            return Vec::new();
        }

        let mut commands = vec![Command::ClearLadder];
        self.current = None;
        if self.settle_pending {
            // The pending resubscribe picks up the new selection.
            self.phase = Phase::Idle;
            return commands;
        }
        self.leave_error();
        commands.extend(self.request(expiry, now));
        commands
    }

    /// The account was switched to live trading: clear the ladder, wait for
    /// the backend to settle, then resubscribe.
    pub fn account_switched_to_live(&mut self) -> Vec<Command> {
        self.settle_generation += 1;
        self.settle_pending = true;
        self.current = None;
        self.leave_error();
        self.phase = Phase::Idle;
        tracing::info!(
            generation = self.settle_generation,
            delay_ms = self.settle_delay.as_millis() as u64,
            "Account switched to live; resubscribing after settle delay"
        );
        vec![
            Command::ClearLadder,
            Command::ScheduleResubscribe {
                generation: self.settle_generation,
                after: self.settle_delay,
            },
        ]
    }

    /// A scheduled resubscribe fired. Timers from superseded switches are
    /// ignored.
    pub fn on_settle_elapsed(
        &mut self,
        generation: u64,
        expiry: Option<NaiveDate>,
        now: Instant,
    ) -> Vec<Command> {
        if !self.settle_pending || generation != self.settle_generation {
            tracing::debug!(generation, "Ignoring stale settle timer");
            return Vec::new();
        }
        self.settle_pending = false;
        match expiry {
            Some(expiry) => self.request(expiry, now),
            None => Vec::new(),
        }
    }

    /// Manual retry from the error state (or from an idle, connected view).
    pub fn retry(&mut self, expiry: Option<NaiveDate>, now: Instant) -> Vec<Command> {
        match (&self.phase, expiry) {
            (Phase::Error(_) | Phase::Idle, Some(expiry)) => {
                self.leave_error();
                self.current = None;
                self.request(expiry, now)
            }
            _ => Vec::new(),
        }
    }

    /// The re-authentication flow completed successfully.
    pub fn on_reauthenticated(&mut self, expiry: Option<NaiveDate>, now: Instant) -> Vec<Command> {
        if !self.requires_reauth() {
            return Vec::new();
        }
        self.last_error = None;
        self.retry(expiry, now)
    }

    // -----------------------------------------------------------------------
    // Server messages
    // -----------------------------------------------------------------------

    /// The server acknowledged the subscribe.
    pub fn on_subscription_confirmed(&mut self) {
        if let Some(p) = self.current.as_mut() {
            p.confirmed = true;
        }
    }

    /// The server asked for the subscribe to go over HTTP instead.
    pub fn on_http_fallback(&mut self, fallback: HttpFallback) -> Vec<Command> {
        match (&self.phase, self.current_ticket()) {
            (Phase::Requesting, Some(ticket)) => vec![Command::HttpFallback { ticket, fallback }],
            _ => {
                tracing::debug!(endpoint = %fallback.endpoint, "Ignoring HTTP fallback outside a request");
                Vec::new()
            }
        }
    }

    /// Outcome of a fallback POST. Returns `false` if the result belongs to a
    /// superseded request and was dropped.
    pub fn on_fallback_result(
        &mut self,
        ticket: RequestTicket,
        result: Result<(), ChainError>,
    ) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(?ticket, "Dropping fallback result for superseded request");
            return false;
        }
        match result {
            Ok(()) => {
                tracing::debug!(?ticket, "HTTP fallback accepted; awaiting data");
            }
            // Our own credential was rejected; the request is abandoned and
            // escalation is left to the caller.
            Err(e) if e.is_fatal_credential() => {
                tracing::error!(error = %e, "HTTP fallback rejected the bearer credential");
                self.current = None;
                if self.phase == Phase::Requesting {
                    self.phase = Phase::Idle;
                }
            }
            Err(e) => {
                let error = SubscriptionError::from_error(&e);
                tracing::warn!(kind = %error.kind, error = %e, "HTTP fallback failed");
                if self.phase == Phase::Requesting {
                    self.fail(error);
                } else {
                    self.last_error = Some(error);
                }
            }
        }
        true
    }

    /// A ladder snapshot for the active expiry was applied.
    pub fn on_snapshot_applied(&mut self) {
        if let Some(p) = self.current.as_mut() {
            p.confirmed = true;
        }
        if self.phase == Phase::Requesting {
            tracing::info!("Subscribed");
            self.phase = Phase::Subscribed;
            self.last_error = None;
        }
    }

    /// The server pushed an `error` notice.
    pub fn on_server_error(&mut self, message: &str) {
        let error = SubscriptionError::from_error(&ChainError::Server(message.to_owned()));
        tracing::warn!(kind = %error.kind, message, "Server error");
        if self.phase == Phase::Requesting {
            self.fail(error);
        } else {
            self.last_error = Some(error);
        }
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn request(&mut self, expiry: NaiveDate, now: Instant) -> Vec<Command> {
        let Some(epoch) = self.epoch else {
            tracing::debug!(%expiry, "Not connected; subscribe deferred until connect");
            self.phase = Phase::Idle;
            return Vec::new();
        };
        let ticket = RequestTicket { epoch, expiry };

        if let Some(p) = &self.current {
            if p.ticket == ticket && !p.confirmed && !self.timed_out(p, now) {
                tracing::debug!(?ticket, "Subscribe already in flight; suppressed");
                return Vec::new();
            }
        }

        self.current = Some(PendingRequest {
            ticket,
            issued_at: now,
            confirmed: false,
        });
        self.phase = Phase::Requesting;
        tracing::info!(epoch, %expiry, "Subscribing");
        vec![Command::Subscribe {
            ticket,
            request: SubscribeRequest::new(&self.underlying_key, &self.mode, expiry),
        }]
    }

    fn is_duplicate(&self, expiry: NaiveDate, now: Instant) -> bool {
        let Some(p) = &self.current else {
            return false;
        };
        if p.ticket.expiry != expiry || Some(p.ticket.epoch) != self.epoch {
            return false;
        }
        match self.phase {
            Phase::Subscribed => true,
            Phase::Requesting => !self.timed_out(p, now),
            _ => false,
        }
    }

    fn timed_out(&self, p: &PendingRequest, now: Instant) -> bool {
        now.saturating_duration_since(p.issued_at) >= self.subscribe_timeout
    }

    fn fail(&mut self, error: SubscriptionError) {
        self.current = None;
        self.last_error = Some(error.clone());
        self.phase = Phase::Error(error);
    }

    fn leave_error(&mut self) {
        if matches!(self.phase, Phase::Error(_)) {
            self.phase = Phase::Idle;
            self.last_error = None;
        }
    }
}
