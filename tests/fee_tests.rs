//! Tests for fee schedule functionality and fee flow into accounts.

use exchange_sim::account::Account;
use exchange_sim::orderbook::FeeSchedule;
use exchange_sim::types::{Instrument, Side};

#[test]
fn fee_schedule_creation() {
    let schedule = FeeSchedule::new(-200, 500);
    assert_eq!(schedule.maker_ppm, -200);
    assert_eq!(schedule.taker_ppm, 500);
    assert!(!schedule.is_zero());
}

#[test]
fn fractional_rates_scale_to_ppm() {
    let schedule = FeeSchedule::from_fractional(-0.0001, 0.0002);
    assert_eq!(schedule.maker_ppm, -100);
    assert_eq!(schedule.taker_ppm, 200);

    let bps = FeeSchedule::from_fractional(-0.0002, 0.0005);
    assert_eq!(bps.maker_ppm, -200);
    assert_eq!(bps.taker_ppm, 500);
}

#[test]
fn zero_fee_schedule() {
    let schedule = FeeSchedule::zero();
    assert!(schedule.is_zero());
    assert_eq!(schedule.maker_fee(1_000_000), 0);
    assert_eq!(schedule.taker_fee(1_000_000), 0);
}

#[test]
fn taker_fee_rounds_up() {
    let schedule = FeeSchedule::from_fractional(-0.0001, 0.0002);
    // Exact: 30_000 * 0.0002 = 6.
    assert_eq!(schedule.taker_fee(30_000), 6);
    // Fractional remainders always round against the taker.
    assert_eq!(schedule.taker_fee(30_001), 7);
    assert_eq!(schedule.taker_fee(1), 1);
    assert_eq!(schedule.taker_fee(0), 0);
}

#[test]
fn maker_rebate_magnitude_rounds_down() {
    let schedule = FeeSchedule::from_fractional(-0.0001, 0.0002);
    // 10_100 * 0.0001 = 1.01: the maker receives 1, never 2.
    assert_eq!(schedule.maker_fee(10_100), -1);
    assert_eq!(schedule.maker_fee(10_000), -1);
    assert_eq!(schedule.maker_fee(9_999), 0);
}

#[test]
fn fee_recomputation_matches_stored_values() {
    // Property: a (price, volume, rate) triple always reproduces the fee.
    let schedule = FeeSchedule::from_fractional(-0.0001, 0.0002);
    for (price, volume) in [(10_000u32, 3u32), (10_100, 1), (9_900, 250), (100, 1)] {
        let notional = price as i64 * volume as i64;
        let maker = schedule.maker_fee(notional);
        let taker = schedule.taker_fee(notional);
        // Ceiling bounds: fee * 1e6 >= notional * ppm > (fee - 1) * 1e6.
        assert!(taker as i128 * 1_000_000 >= notional as i128 * schedule.taker_ppm as i128);
        assert!((taker as i128 - 1) * 1_000_000 < notional as i128 * schedule.taker_ppm as i128);
        assert!(maker as i128 * 1_000_000 >= notional as i128 * schedule.maker_ppm as i128);
        assert!((maker as i128 - 1) * 1_000_000 < notional as i128 * schedule.maker_ppm as i128);
    }
}

#[test]
fn fees_accumulate_separately_from_balance() {
    let schedule = FeeSchedule::from_fractional(-0.0001, 0.0002);
    let mut taker = Account::new();
    let mut maker = Account::new();

    let notional = 30_000;
    taker.apply_trade(Instrument::Etf, Side::Buy, 10_000, 3, schedule.taker_fee(notional));
    maker.apply_trade(Instrument::Etf, Side::Sell, 10_000, 3, schedule.maker_fee(notional));

    assert_eq!(taker.balance(), -30_000);
    assert_eq!(taker.fees(), 6);
    assert_eq!(maker.balance(), 30_000);
    assert_eq!(maker.fees(), -3);

    // The cash legs cancel; only the fee legs separate the two books.
    assert_eq!(taker.balance() + maker.balance(), 0);

    taker.mark_to_market(Instrument::Etf, 10_000);
    maker.mark_to_market(Instrument::Etf, 10_000);
    assert_eq!(taker.profit(), -6);
    assert_eq!(maker.profit(), 3);
}

#[test]
fn large_notionals_do_not_overflow() {
    let schedule = FeeSchedule::new(10_000, 10_000);
    // Far beyond any real notional; the intermediate product needs i128.
    let notional = 4_000_000_000_000_000_001_i64;
    let fee = schedule.taker_fee(notional);
    assert_eq!(fee, notional / 100 + 1);
}
