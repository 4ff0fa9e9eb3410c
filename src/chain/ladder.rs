//! Strike ladder partitioned around the at-the-money strike.
//!
//! Partition membership is a pure function of a contract's strike and side and
//! the ATM strike, so the ladder is always rebuilt through [`partition`]
//! instead of being patched group by group.

use chrono::NaiveDate;
use serde::Serialize;

use crate::types::enums::{InstrumentType, Moneyness};
use crate::types::option_chain::OptionContract;

/// Round an underlying price to the nearest multiple of `step`.
///
/// Halves round away from zero, so `24_975.0` with a step of `50.0` gives
/// `25_000.0`.
pub fn atm_strike(price: f64, step: f64) -> f64 {
    (price / step).round() * step
}

/// The five disjoint groups of a [`StrikeLadder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    ItmCalls,
    ItmPuts,
    OtmCalls,
    OtmPuts,
    Atm,
}

impl Partition {
    /// Which group a contract belongs to for a given ATM strike.
    pub fn of(contract: &OptionContract, atm_strike: f64) -> Self {
        match (
            contract.instrument_type,
            Moneyness::of(contract.instrument_type, contract.strike_price, atm_strike),
        ) {
            (_, Moneyness::AtTheMoney) => Partition::Atm,
            (InstrumentType::Call, Moneyness::InTheMoney) => Partition::ItmCalls,
            (InstrumentType::Call, Moneyness::OutOfTheMoney) => Partition::OtmCalls,
            (InstrumentType::Put, Moneyness::InTheMoney) => Partition::ItmPuts,
            (InstrumentType::Put, Moneyness::OutOfTheMoney) => Partition::OtmPuts,
        }
    }
}

/// All contracts of one expiry, grouped relative to the ATM strike.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StrikeLadder {
    expiry: Option<NaiveDate>,
    atm_strike: f64,
    itm_calls: Vec<OptionContract>,
    itm_puts: Vec<OptionContract>,
    otm_calls: Vec<OptionContract>,
    otm_puts: Vec<OptionContract>,
    atm: Vec<OptionContract>,
}

/// Group `contracts` around `atm_strike`.
///
/// Within each group contracts are ordered by strike ascending, so the
/// result does not depend on input order.
pub fn partition(
    contracts: impl IntoIterator<Item = OptionContract>,
    atm_strike: f64,
    expiry: Option<NaiveDate>,
) -> StrikeLadder {
    let mut ladder = StrikeLadder {
        expiry,
        atm_strike,
        ..StrikeLadder::default()
    };
    for contract in contracts {
        let group = match Partition::of(&contract, atm_strike) {
            Partition::ItmCalls => &mut ladder.itm_calls,
            Partition::ItmPuts => &mut ladder.itm_puts,
            Partition::OtmCalls => &mut ladder.otm_calls,
            Partition::OtmPuts => &mut ladder.otm_puts,
            Partition::Atm => &mut ladder.atm,
        };
        group.push(contract);
    }
    for group in ladder.groups_mut() {
        group.sort_by(|a, b| {
            a.strike_price
                .total_cmp(&b.strike_price)
                .then_with(|| a.instrument_key.cmp(&b.instrument_key))
        });
    }
    ladder
}

impl StrikeLadder {
    pub fn expiry(&self) -> Option<NaiveDate> {
        self.expiry
    }

    pub fn atm_strike(&self) -> f64 {
        self.atm_strike
    }

    pub fn itm_calls(&self) -> &[OptionContract] {
        &self.itm_calls
    }

    pub fn itm_puts(&self) -> &[OptionContract] {
        &self.itm_puts
    }

    pub fn otm_calls(&self) -> &[OptionContract] {
        &self.otm_calls
    }

    pub fn otm_puts(&self) -> &[OptionContract] {
        &self.otm_puts
    }

    /// The ATM call and put (empty if the ladder has no contract at the ATM
    /// strike).
    pub fn atm(&self) -> &[OptionContract] {
        &self.atm
    }

    /// The group a partition names.
    pub fn group(&self, partition: Partition) -> &[OptionContract] {
        match partition {
            Partition::ItmCalls => &self.itm_calls,
            Partition::ItmPuts => &self.itm_puts,
            Partition::OtmCalls => &self.otm_calls,
            Partition::OtmPuts => &self.otm_puts,
            Partition::Atm => &self.atm,
        }
    }

    /// Number of contracts across all groups.
    pub fn len(&self) -> usize {
        self.groups().map(<[OptionContract]>::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over every contract, group by group.
    pub fn contracts(&self) -> impl Iterator<Item = &OptionContract> {
        self.groups().flat_map(|g| g.iter())
    }

    /// Find a contract by instrument key in any group.
    pub fn get(&self, instrument_key: &str) -> Option<&OptionContract> {
        self.contracts()
            .find(|c| c.instrument_key == instrument_key)
    }

    /// Mutable lookup by instrument key in any group.
    pub fn get_mut(&mut self, instrument_key: &str) -> Option<&mut OptionContract> {
        self.groups_mut()
            .flat_map(|g| g.iter_mut())
            .find(|c| c.instrument_key == instrument_key)
    }

    /// Regroup every contract around a new ATM strike.
    pub fn repartition(&mut self, atm_strike: f64) {
        let expiry = self.expiry;
        let contracts = self.take_contracts();
        *self = partition(contracts, atm_strike, expiry);
    }

    fn take_contracts(&mut self) -> Vec<OptionContract> {
        let mut all = Vec::with_capacity(self.len());
        for group in self.groups_mut() {
            all.append(group);
        }
        all
    }

    fn groups(&self) -> impl Iterator<Item = &[OptionContract]> {
        [
            self.itm_calls.as_slice(),
            self.itm_puts.as_slice(),
            self.otm_calls.as_slice(),
            self.otm_puts.as_slice(),
            self.atm.as_slice(),
        ]
        .into_iter()
    }

    fn groups_mut(&mut self) -> impl Iterator<Item = &mut Vec<OptionContract>> {
        [
            &mut self.itm_calls,
            &mut self.itm_puts,
            &mut self.otm_calls,
            &mut self.otm_puts,
            &mut self.atm,
        ]
        .into_iter()
    }
}
