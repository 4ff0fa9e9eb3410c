//! Presentation helpers derived from the ladder and quote.
//!
//! Nothing here is stored state: rows and labels are recomputed from the
//! current ladder whenever it changes.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::chain::ladder::StrikeLadder;
use crate::types::enums::{InstrumentType, Moneyness};
use crate::types::option_chain::{OptionContract, UnderlyingQuote};

/// One strike of the rendered chain: call on the left, put on the right.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrikeRow {
    pub strike: f64,
    /// Moneyness of the call side; the put side is the mirror image.
    pub moneyness: Moneyness,
    pub call: Option<OptionContract>,
    pub put: Option<OptionContract>,
}

/// Lay out the ladder for rendering.
///
/// Strikes are collected ascending, then arranged as: out-of-the-money
/// strikes (above the ATM) from the highest down, the ATM row, then
/// in-the-money strikes from the highest down.
pub fn render_rows(ladder: &StrikeLadder) -> Vec<StrikeRow> {
    let atm = ladder.atm_strike();

    let mut by_strike: BTreeMap<i64, StrikeRow> = BTreeMap::new();
    for contract in ladder.contracts() {
        let row = by_strike
            .entry(strike_key(contract.strike_price))
            .or_insert_with(|| StrikeRow {
                strike: contract.strike_price,
                moneyness: Moneyness::of(InstrumentType::Call, contract.strike_price, atm),
                call: None,
                put: None,
            });
        match contract.instrument_type {
            InstrumentType::Call => row.call = Some(contract.clone()),
            InstrumentType::Put => row.put = Some(contract.clone()),
        }
    }

    let ascending: Vec<StrikeRow> = by_strike.into_values().collect();
    let mut otm = Vec::new();
    let mut at = Vec::new();
    let mut itm = Vec::new();
    for row in ascending {
        match row.moneyness {
            Moneyness::OutOfTheMoney => otm.push(row),
            Moneyness::AtTheMoney => at.push(row),
            Moneyness::InTheMoney => itm.push(row),
        }
    }
    otm.reverse();
    itm.reverse();

    let mut rows = otm;
    rows.append(&mut at);
    rows.append(&mut itm);
    rows
}

/// Strikes are quoted to at most two decimals; key them in hundredths.
fn strike_key(strike: f64) -> i64 {
    (strike * 100.0).round() as i64
}

/// Direction of the underlying's move, for colouring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    pub fn of(change: f64) -> Self {
        if change > 0.0 {
            Direction::Up
        } else if change < 0.0 {
            Direction::Down
        } else {
            Direction::Flat
        }
    }
}

/// `"+52.30 (+0.21%)"` style change label.
pub fn format_change(quote: &UnderlyingQuote) -> String {
    format!("{:+.2} ({:+.2}%)", quote.change, quote.change_percent)
}

/// `"2h 05m"` / `"45m"` countdown label.
pub fn format_countdown(minutes: i64) -> String {
    let minutes = minutes.max(0);
    let (days, rem) = (minutes / (24 * 60), minutes % (24 * 60));
    let (hours, mins) = (rem / 60, rem % 60);
    let mut out = String::new();
    if days > 0 {
        let _ = write!(out, "{days}d ");
    }
    if days > 0 || hours > 0 {
        let _ = write!(out, "{hours}h {mins:02}m");
    } else {
        let _ = write!(out, "{mins}m");
    }
    out
}

/// Put/call ratio of total open interest on the ladder.
///
/// `None` when there is no call open interest.
pub fn put_call_ratio(ladder: &StrikeLadder) -> Option<f64> {
    let (calls, puts) = ladder
        .contracts()
        .fold((0.0, 0.0), |(c, p), contract| match contract.instrument_type {
            InstrumentType::Call => (c + contract.market.oi, p),
            InstrumentType::Put => (c, p + contract.market.oi),
        });
    (calls > 0.0).then(|| puts / calls)
}
