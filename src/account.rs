//! Per-competitor trading account.
//!
//! Tracks signed positions per instrument, the cash balance and cumulative
//! fees, all in exact integer arithmetic. Fees are kept out of the balance so
//! profit recomputes bit-for-bit from the stored pieces.

use crate::types::{Instrument, Side};

/// Position, cash and fee state for one competitor.
#[derive(Clone, Debug, Default)]
pub struct Account {
    positions: [i64; Instrument::COUNT],
    balance: i64,
    fees: i64,
    marks: [i64; Instrument::COUNT],
}

impl Account {
    /// A fresh zeroed account, handed out at login.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one trade: BUY adds to the position and pays the notional, SELL
    /// subtracts and receives it. `fee` is the signed charge from the book's
    /// fee schedule (negative = rebate) and accumulates separately.
    pub fn apply_trade(&mut self, instrument: Instrument, side: Side, price: u32, volume: u32, fee: i64) {
        let lots = volume as i64;
        let notional = price as i64 * lots;
        match side {
            Side::Buy => {
                self.positions[instrument.index()] += lots;
                self.balance -= notional;
            }
            Side::Sell => {
                self.positions[instrument.index()] -= lots;
                self.balance += notional;
            }
        }
        self.fees += fee;
    }

    /// Update the instrument's mark price used for unrealised valuation.
    pub fn mark_to_market(&mut self, instrument: Instrument, price: i64) {
        self.marks[instrument.index()] = price;
    }

    /// Signed position in lots.
    #[must_use]
    #[inline]
    pub fn position(&self, instrument: Instrument) -> i64 {
        self.positions[instrument.index()]
    }

    /// Cash balance in cents (excludes fees).
    #[must_use]
    #[inline]
    pub fn balance(&self) -> i64 {
        self.balance
    }

    /// Cumulative fees charged in cents (negative = net rebates).
    #[must_use]
    #[inline]
    pub fn fees(&self) -> i64 {
        self.fees
    }

    /// Mark-to-market profit: balance plus positions at their last marks,
    /// minus cumulative fees.
    #[must_use]
    pub fn profit(&self) -> i64 {
        let mut profit = self.balance - self.fees;
        for instrument in Instrument::ALL {
            profit += self.positions[instrument.index()] * self.marks[instrument.index()];
        }
        profit
    }
}
