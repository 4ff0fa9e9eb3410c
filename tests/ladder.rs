//! Strike ladder partitioning and render order.

use chainwatch::chain::display::{
    Direction, format_change, format_countdown, put_call_ratio, render_rows,
};
use chainwatch::chain::ladder::{Partition, atm_strike, partition};
use chainwatch::types::option_chain::{OptionContract, UnderlyingQuote};
use chainwatch::types::{InstrumentType, Moneyness};
use chrono::{NaiveDate, Utc};

fn contract(strike: f64, side: InstrumentType) -> OptionContract {
    let suffix = match side {
        InstrumentType::Call => "CE",
        InstrumentType::Put => "PE",
    };
    OptionContract::new(format!("NSE_FO|{strike}{suffix}"), strike, side)
}

/// Calls and puts at every strike from `low` to `high` in steps of 50.
fn chain(low: f64, high: f64) -> Vec<OptionContract> {
    let mut all = Vec::new();
    let mut strike = low;
    while strike <= high {
        all.push(contract(strike, InstrumentType::Call));
        all.push(contract(strike, InstrumentType::Put));
        strike += 50.0;
    }
    all
}

fn strikes(contracts: &[OptionContract]) -> Vec<f64> {
    contracts.iter().map(|c| c.strike_price).collect()
}

#[test]
fn test_atm_strike_rounds_to_nearest_step() {
    assert_eq!(atm_strike(24_980.0, 50.0), 25_000.0);
    assert_eq!(atm_strike(25_032.0, 50.0), 25_050.0);
    assert_eq!(atm_strike(25_024.9, 50.0), 25_000.0);
    assert_eq!(atm_strike(24_975.0, 50.0), 25_000.0);
    assert_eq!(atm_strike(25_000.0, 50.0), 25_000.0);
}

#[test]
fn test_atm_strike_stays_within_half_a_step() {
    let mut price = 24_000.0;
    while price < 26_000.0 {
        let atm = atm_strike(price, 50.0);
        assert_eq!(atm % 50.0, 0.0, "{atm} not a multiple of 50");
        assert!((atm - price).abs() <= 25.0, "{price} -> {atm}");
        price += 3.7;
    }
}

#[test]
fn test_partition_groups_around_atm() {
    let ladder = partition(chain(24_900.0, 25_100.0), 25_000.0, None);

    assert_eq!(strikes(ladder.itm_calls()), vec![24_900.0, 24_950.0]);
    assert_eq!(strikes(ladder.otm_calls()), vec![25_050.0, 25_100.0]);
    assert_eq!(strikes(ladder.itm_puts()), vec![25_050.0, 25_100.0]);
    assert_eq!(strikes(ladder.otm_puts()), vec![24_900.0, 24_950.0]);
    assert_eq!(ladder.atm().len(), 2);
    assert!(ladder.atm().iter().all(|c| c.strike_price == 25_000.0));
    assert_eq!(ladder.len(), 10);
}

#[test]
fn test_partition_places_every_contract_exactly_once() {
    let input = chain(24_500.0, 25_500.0);
    let ladder = partition(input.clone(), 25_050.0, None);

    assert_eq!(ladder.len(), input.len());
    for c in &input {
        let expected = Partition::of(c, 25_050.0);
        let hits = [
            Partition::ItmCalls,
            Partition::ItmPuts,
            Partition::OtmCalls,
            Partition::OtmPuts,
            Partition::Atm,
        ]
        .into_iter()
        .filter(|p| {
            ladder
                .group(*p)
                .iter()
                .any(|g| g.instrument_key == c.instrument_key)
        })
        .collect::<Vec<_>>();
        assert_eq!(hits, vec![expected], "{}", c.instrument_key);
    }
}

#[test]
fn test_partition_does_not_depend_on_input_order() {
    let forward = chain(24_800.0, 25_200.0);
    let mut backward = forward.clone();
    backward.reverse();

    assert_eq!(
        partition(forward, 25_000.0, None),
        partition(backward, 25_000.0, None)
    );
}

#[test]
fn test_repartition_matches_fresh_partition() {
    let expiry = NaiveDate::from_ymd_opt(2026, 10, 20);
    let mut ladder = partition(chain(24_800.0, 25_200.0), 25_000.0, expiry);
    ladder.repartition(25_050.0);

    assert_eq!(ladder, partition(chain(24_800.0, 25_200.0), 25_050.0, expiry));
    assert_eq!(ladder.expiry(), expiry);

    let again = ladder.clone();
    ladder.repartition(25_050.0);
    assert_eq!(ladder, again);
}

#[test]
fn test_underlying_move_shifts_atm_group() {
    // 24,980 rounds to 25,000; 25,032 rounds to 25,050.
    let mut ladder = partition(chain(24_900.0, 25_200.0), atm_strike(24_980.0, 50.0), None);
    assert!(ladder.atm().iter().all(|c| c.strike_price == 25_000.0));

    ladder.repartition(atm_strike(25_032.0, 50.0));

    assert!(ladder.atm().iter().all(|c| c.strike_price == 25_050.0));
    assert!(ladder.itm_calls().iter().any(|c| c.strike_price == 25_000.0));
    assert!(ladder.otm_puts().iter().any(|c| c.strike_price == 25_000.0));
}

#[test]
fn test_ladder_without_atm_contract_has_empty_atm_group() {
    let ladder = partition(chain(24_900.0, 25_100.0), 25_025.0, None);
    assert!(ladder.atm().is_empty());
    assert_eq!(ladder.len(), 10);
}

#[test]
fn test_render_rows_order() {
    let ladder = partition(chain(24_900.0, 25_100.0), 25_000.0, None);
    let rows = render_rows(&ladder);

    let order: Vec<f64> = rows.iter().map(|r| r.strike).collect();
    assert_eq!(order, vec![25_100.0, 25_050.0, 25_000.0, 24_950.0, 24_900.0]);

    let moneyness: Vec<Moneyness> = rows.iter().map(|r| r.moneyness).collect();
    assert_eq!(
        moneyness,
        vec![
            Moneyness::OutOfTheMoney,
            Moneyness::OutOfTheMoney,
            Moneyness::AtTheMoney,
            Moneyness::InTheMoney,
            Moneyness::InTheMoney,
        ]
    );
    assert!(rows.iter().all(|r| r.call.is_some() && r.put.is_some()));
}

#[test]
fn test_render_rows_with_one_sided_strike() {
    let mut contracts = chain(24_950.0, 25_050.0);
    contracts.push(contract(25_100.0, InstrumentType::Call));
    let rows = render_rows(&partition(contracts, 25_000.0, None));

    assert_eq!(rows[0].strike, 25_100.0);
    assert!(rows[0].call.is_some());
    assert!(rows[0].put.is_none());
}

#[test]
fn test_put_call_ratio() {
    let mut contracts = chain(25_000.0, 25_000.0);
    contracts[0].market.oi = 200.0;
    contracts[1].market.oi = 300.0;
    let ladder = partition(contracts, 25_000.0, None);
    assert_eq!(put_call_ratio(&ladder), Some(1.5));

    let empty = partition(chain(25_000.0, 25_000.0), 25_000.0, None);
    assert_eq!(put_call_ratio(&empty), None);
}

#[test]
fn test_change_and_countdown_labels() {
    let quote = UnderlyingQuote::new(25_032.0, 52.3, 0.21, Utc::now());
    assert_eq!(format_change(&quote), "+52.30 (+0.21%)");
    assert_eq!(Direction::of(quote.change), Direction::Up);
    assert_eq!(Direction::of(-1.0), Direction::Down);
    assert_eq!(Direction::of(0.0), Direction::Flat);

    assert_eq!(format_countdown(45), "45m");
    assert_eq!(format_countdown(125), "2h 05m");
    assert_eq!(format_countdown(2 * 24 * 60 + 61), "2d 1h 01m");
    assert_eq!(format_countdown(-3), "0m");
}
