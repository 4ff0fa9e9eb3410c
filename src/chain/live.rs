//! Synchronous core of the live option-chain view.
//!
//! [`LiveChain`] wires the [`SubscriptionCoordinator`], the
//! [`OptionChainStore`] and the expiry selection together. Each input is
//! handled to completion before the next; whatever I/O is needed comes back
//! as [`Command`]s for the driver in [`crate::chain::view`].

use chrono::{NaiveDate, Utc};
use tokio::time::Instant;

use crate::chain::coordinator::{Command, RequestTicket, SubscriptionCoordinator};
use crate::chain::display::StrikeRow;
use crate::chain::store::OptionChainStore;
use crate::config::ChainConfig;
use crate::error::ChainError;
use crate::types::enums::TickKind;
use crate::types::option_chain::{ExpiryOption, UnderlyingQuote};
use crate::ws::channel::ChannelEvent;

#[derive(Debug, Clone)]
pub struct LiveChain {
    coordinator: SubscriptionCoordinator,
    store: OptionChainStore,
    expiries: Vec<ExpiryOption>,
    selected: Option<NaiveDate>,
}

impl LiveChain {
    pub fn new(config: &ChainConfig) -> Self {
        Self {
            coordinator: SubscriptionCoordinator::new(config),
            store: OptionChainStore::new(config.strike_step),
            expiries: Vec::new(),
            selected: None,
        }
    }

    pub fn coordinator(&self) -> &SubscriptionCoordinator {
        &self.coordinator
    }

    pub fn store(&self) -> &OptionChainStore {
        &self.store
    }

    pub fn expiries(&self) -> &[ExpiryOption] {
        &self.expiries
    }

    pub fn selected_expiry(&self) -> Option<NaiveDate> {
        self.selected
    }

    pub fn rows(&self) -> Vec<StrikeRow> {
        self.store.rows()
    }

    // -----------------------------------------------------------------------
    // Expiry selection
    // -----------------------------------------------------------------------

    /// Install the expiry list. If nothing valid is selected yet, the nearest
    /// unexpired date is selected (or the first date if all have expired).
    pub fn set_expiries(
        &mut self,
        dates: Vec<NaiveDate>,
        today: NaiveDate,
        now: Instant,
    ) -> Vec<Command> {
        self.expiries = dates
            .into_iter()
            .map(|d| ExpiryOption::new(d, today))
            .collect();

        let still_listed = self
            .selected
            .is_some_and(|s| self.expiries.iter().any(|e| e.date == s));
        if still_listed {
            return Vec::new();
        }

        let auto = self
            .expiries
            .iter()
            .find(|e| !e.is_expired())
            .or_else(|| self.expiries.first())
            .map(|e| e.date);
        match auto {
            Some(date) => {
                tracing::info!(%date, "Auto-selected expiry");
                self.select_expiry(date, now)
            }
            None => {
                tracing::warn!("Backend returned no expiry dates");
                Vec::new()
            }
        }
    }

    pub fn select_expiry(&mut self, date: NaiveDate, now: Instant) -> Vec<Command> {
        self.selected = Some(date);
        let commands = self.coordinator.select_expiry(date, now);
        self.apply(commands)
    }

    // -----------------------------------------------------------------------
    // External signals
    // -----------------------------------------------------------------------

    pub fn account_switched_to_live(&mut self) -> Vec<Command> {
        let commands = self.coordinator.account_switched_to_live();
        self.apply(commands)
    }

    pub fn on_settle_elapsed(&mut self, generation: u64, now: Instant) -> Vec<Command> {
        let commands = self
            .coordinator
            .on_settle_elapsed(generation, self.selected, now);
        self.apply(commands)
    }

    pub fn retry(&mut self, now: Instant) -> Vec<Command> {
        let commands = self.coordinator.retry(self.selected, now);
        self.apply(commands)
    }

    pub fn on_reauthenticated(&mut self, now: Instant) -> Vec<Command> {
        let commands = self.coordinator.on_reauthenticated(self.selected, now);
        self.apply(commands)
    }

    pub fn on_fallback_result(
        &mut self,
        ticket: RequestTicket,
        result: Result<(), ChainError>,
    ) -> bool {
        self.coordinator.on_fallback_result(ticket, result)
    }

    // -----------------------------------------------------------------------
    // Channel events
    // -----------------------------------------------------------------------

    /// Handle one channel event.
    pub fn handle(&mut self, event: ChannelEvent, now: Instant) -> Vec<Command> {
        match event {
            ChannelEvent::Connected { epoch } => {
                let commands = self.coordinator.on_connected(epoch, self.selected, now);
                self.apply(commands)
            }
            ChannelEvent::Disconnected { reason } => {
                let commands = self.coordinator.on_disconnected(&reason);
                self.store.reset();
                self.apply(commands)
            }
            ChannelEvent::ConnectionError { message } => {
                let commands = self.coordinator.on_connection_error(&message);
                self.store.reset();
                self.apply(commands)
            }
            ChannelEvent::ServerError { message } => {
                self.coordinator.on_server_error(&message);
                Vec::new()
            }
            ChannelEvent::UseHttpFallback(fallback) => {
                let commands = self.coordinator.on_http_fallback(fallback);
                self.apply(commands)
            }
            ChannelEvent::SubscriptionConfirmed(_) => {
                self.coordinator.on_subscription_confirmed();
                Vec::new()
            }
            ChannelEvent::Snapshot(snapshot) => {
                if !self.coordinator.accepts_snapshot() {
                    tracing::debug!("Dropping snapshot outside an active subscription");
                } else if self.store.apply_snapshot(snapshot, self.selected) {
                    self.coordinator.on_snapshot_applied();
                }
                Vec::new()
            }
            ChannelEvent::Tick(update) => {
                if !self.coordinator.accepts_ticks() {
                    tracing::trace!(key = %update.instrument_key, "Dropping tick while not subscribed");
                    return Vec::new();
                }
                match update.kind {
                    TickKind::Underlying => {
                        if let Some(quote) = UnderlyingQuote::from_update(&update, Utc::now()) {
                            self.store.apply_underlying_tick(quote);
                        }
                    }
                    TickKind::Contract => {
                        self.store.apply_contract_tick(&update);
                    }
                }
                Vec::new()
            }
            ChannelEvent::MarketData(_) => Vec::new(),
        }
    }

    /// Carry out store-local commands; return the rest for the driver.
    fn apply(&mut self, commands: Vec<Command>) -> Vec<Command> {
        commands
            .into_iter()
            .filter(|c| {
                if matches!(c, Command::ClearLadder) {
                    self.store.clear();
                    false
                } else {
                    true
                }
            })
            .collect()
    }
}
