//! Fee schedule for trades executed on a book.
//!
//! Rates are carried as pre-scaled parts-per-million integers so that every
//! fee is computed in exact integer arithmetic. Rounding is exchange
//! favourable: a taker's charge rounds up, a maker's rebate rounds down in
//! magnitude. Both cases are the signed ceiling of `notional * rate / 1e6`.

use serde::{Deserialize, Serialize};

const PPM: i128 = 1_000_000;

/// Maker/taker fee rates for one order book.
///
/// A negative maker rate is a rebate: the maker is credited rather than
/// charged. The FUTURE book is frictionless and uses [`FeeSchedule::zero`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Maker rate in parts per million of notional (negative = rebate).
    pub maker_ppm: i64,
    /// Taker rate in parts per million of notional.
    pub taker_ppm: i64,
}

impl FeeSchedule {
    /// Create a schedule from pre-scaled ppm rates.
    #[must_use]
    pub const fn new(maker_ppm: i64, taker_ppm: i64) -> Self {
        Self {
            maker_ppm,
            taker_ppm,
        }
    }

    /// Convert fractional rates from configuration (e.g. `-0.0001`, `0.0002`)
    /// to ppm. Conversion happens once at startup; nothing downstream touches
    /// floating point.
    #[must_use]
    pub fn from_fractional(maker: f64, taker: f64) -> Self {
        Self {
            maker_ppm: (maker * 1e6).round() as i64,
            taker_ppm: (taker * 1e6).round() as i64,
        }
    }

    /// A schedule that charges nothing on either side.
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0, 0)
    }

    /// True if neither side is ever charged.
    #[must_use]
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.maker_ppm == 0 && self.taker_ppm == 0
    }

    /// Fee charged to the maker for a trade of the given notional.
    ///
    /// Negative results are rebates. A rebate's magnitude rounds down, so the
    /// exchange never over-credits: `maker_ppm = -100` on notional `10_100`
    /// yields `-1` (the maker receives 1).
    #[must_use]
    #[inline]
    pub fn maker_fee(&self, notional: i64) -> i64 {
        charge(notional, self.maker_ppm)
    }

    /// Fee charged to the taker, rounded up: `taker_ppm = 200` on notional
    /// `30_000` yields `6`.
    #[must_use]
    #[inline]
    pub fn taker_fee(&self, notional: i64) -> i64 {
        charge(notional, self.taker_ppm)
    }
}

/// Signed ceiling of `notional * ppm / 1e6`.
#[inline]
fn charge(notional: i64, ppm: i64) -> i64 {
    let product = notional as i128 * ppm as i128;
    let quotient = product / PPM;
    let remainder = product % PPM;
    if remainder > 0 {
        (quotient + 1) as i64
    } else {
        quotient as i64
    }
}
