//! Option-chain state store.
//!
//! Owns the current [`StrikeLadder`] and [`UnderlyingQuote`] and applies the
//! three kinds of incoming data: full snapshots, underlying ticks, and
//! per-contract ticks.

use chrono::NaiveDate;

use crate::chain::display::{StrikeRow, render_rows};
use crate::chain::ladder::{StrikeLadder, atm_strike, partition};
use crate::types::option_chain::{StrikeSnapshot, SymbolUpdate, UnderlyingQuote};

/// Holds the ladder and underlying quote for one view.
#[derive(Debug, Clone)]
pub struct OptionChainStore {
    strike_step: f64,
    ladder: Option<StrikeLadder>,
    quote: Option<UnderlyingQuote>,
}

impl OptionChainStore {
    pub fn new(strike_step: f64) -> Self {
        Self {
            strike_step,
            ladder: None,
            quote: None,
        }
    }

    pub fn ladder(&self) -> Option<&StrikeLadder> {
        self.ladder.as_ref()
    }

    pub fn quote(&self) -> Option<&UnderlyingQuote> {
        self.quote.as_ref()
    }

    pub fn strike_step(&self) -> f64 {
        self.strike_step
    }

    /// ATM strike implied by the current underlying quote, if any.
    pub fn underlying_atm(&self) -> Option<f64> {
        self.quote
            .as_ref()
            .map(|q| atm_strike(q.ltp, self.strike_step))
    }

    /// Replace the ladder with `snapshot`.
    ///
    /// A snapshot tagged with an expiry other than `active_expiry` is stale and
    /// is dropped (returns `false`, the current ladder is untouched). An
    /// untagged snapshot is attributed to `active_expiry`.
    ///
    /// The ATM strike comes from the live underlying quote when one is known,
    /// otherwise from the snapshot's `atmStrike` rounded to the strike step.
    pub fn apply_snapshot(
        &mut self,
        snapshot: StrikeSnapshot,
        active_expiry: Option<NaiveDate>,
    ) -> bool {
        let expiry = match (snapshot.expiry_date, active_expiry) {
            (Some(tagged), Some(active)) if tagged != active => {
                tracing::debug!(%tagged, %active, "Dropping snapshot for stale expiry");
                return false;
            }
            (Some(tagged), _) => Some(tagged),
            (None, active) => active,
        };

        let atm = match (self.underlying_atm(), snapshot.atm_strike) {
            (Some(live), _) => live,
            (None, Some(sent)) => atm_strike(sent, self.strike_step),
            (None, None) => {
                tracing::warn!("Snapshot without atmStrike before any underlying tick");
                return false;
            }
        };

        let count = snapshot.len();
        self.ladder = Some(partition(snapshot.into_contracts(), atm, expiry));
        tracing::debug!(atm, contracts = count, "Applied strike snapshot");
        true
    }

    /// Replace the underlying quote; regroup the ladder if the ATM strike moved.
    ///
    /// Returns `true` when a regroup happened.
    pub fn apply_underlying_tick(&mut self, quote: UnderlyingQuote) -> bool {
        let atm = atm_strike(quote.ltp, self.strike_step);
        self.quote = Some(quote);

        match self.ladder.as_mut() {
            Some(ladder) if ladder.atm_strike() != atm => {
                tracing::debug!(from = ladder.atm_strike(), to = atm, "ATM strike moved");
                ladder.repartition(atm);
                true
            }
            _ => false,
        }
    }

    /// Merge a contract tick into the ladder.
    ///
    /// Returns `false` (and changes nothing) if the contract is not on the
    /// ladder.
    pub fn apply_contract_tick(&mut self, update: &SymbolUpdate) -> bool {
        let Some(contract) = self
            .ladder
            .as_mut()
            .and_then(|l| l.get_mut(&update.instrument_key))
        else {
            tracing::trace!(key = %update.instrument_key, "Tick for contract not on ladder");
            return false;
        };
        contract.merge(update);
        true
    }

    /// Drop the ladder. The underlying quote is kept.
    pub fn clear(&mut self) {
        self.ladder = None;
    }

    /// Drop the ladder and the underlying quote.
    pub fn reset(&mut self) {
        self.ladder = None;
        self.quote = None;
    }

    /// Render-ordered rows of the current ladder.
    pub fn rows(&self) -> Vec<StrikeRow> {
        self.ladder.as_ref().map(render_rows).unwrap_or_default()
    }
}
