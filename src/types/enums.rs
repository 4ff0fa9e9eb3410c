//! Shared enum types that map to wire values of the option-chain backend.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Instrument Type
// ---------------------------------------------------------------------------

/// Call or put side of an option contract.
///
/// Serialized as `"CALL"` / `"PUT"`; the exchange abbreviations `"CE"` /
/// `"PE"` are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentType {
    #[serde(rename = "CALL", alias = "CE", alias = "call")]
    Call,
    #[serde(rename = "PUT", alias = "PE", alias = "put")]
    Put,
}

impl fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentType::Call => write!(f, "CALL"),
            InstrumentType::Put => write!(f, "PUT"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tick Kind
// ---------------------------------------------------------------------------

/// Which instrument a `symbolUpdate` tick is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TickKind {
    /// The underlying index.
    #[serde(rename = "index")]
    Underlying,
    /// An option contract on the ladder.
    #[serde(rename = "option")]
    Contract,
}

// ---------------------------------------------------------------------------
// Moneyness
// ---------------------------------------------------------------------------

/// Position of a strike relative to the at-the-money strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Moneyness {
    InTheMoney,
    AtTheMoney,
    OutOfTheMoney,
}

impl Moneyness {
    /// Classify one contract side against the ATM strike.
    pub fn of(instrument_type: InstrumentType, strike: f64, atm_strike: f64) -> Self {
        if strike == atm_strike {
            return Moneyness::AtTheMoney;
        }
        let below = strike < atm_strike;
        match (instrument_type, below) {
            (InstrumentType::Call, true) | (InstrumentType::Put, false) => Moneyness::InTheMoney,
            (InstrumentType::Call, false) | (InstrumentType::Put, true) => {
                Moneyness::OutOfTheMoney
            }
        }
    }
}

impl fmt::Display for Moneyness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Moneyness::InTheMoney => write!(f, "ITM"),
            Moneyness::AtTheMoney => write!(f, "ATM"),
            Moneyness::OutOfTheMoney => write!(f, "OTM"),
        }
    }
}
