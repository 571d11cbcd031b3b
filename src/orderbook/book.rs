//! Core order book: price levels, snapshots and the trade-tick buffer.
//!
//! One book per instrument. Sides are price-indexed `BTreeMap`s so the best
//! level is always the first (asks) or last (bids) key; resting orders within
//! a level are a strict FIFO of arena handles. Everything is mutated from the
//! single exchange thread, so there is no interior locking anywhere.

use super::error::OrderBookError;
use super::fees::FeeSchedule;
use super::order::{OrderArena, OrderRef};
use crate::types::{Instrument, Side, TOP_LEVEL_COUNT};
use std::collections::BTreeMap;
use std::collections::VecDeque;

/// A single price level: FIFO of resting orders plus the aggregate volume,
/// maintained incrementally so snapshots never walk the queue.
#[derive(Debug, Default)]
pub struct Level {
    pub(super) orders: VecDeque<OrderRef>,
    pub(super) volume: u64,
}

impl Level {
    /// Aggregate resting volume at this price.
    #[must_use]
    #[inline]
    pub fn volume(&self) -> u64 {
        self.volume
    }

    /// Number of resting orders at this price.
    #[must_use]
    #[inline]
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

/// Five best levels per side, zero padded. Shared by book snapshots and
/// drained trade ticks, which use the same wire shape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TopLevels {
    /// Best ask prices, ascending; zero when fewer than five levels exist.
    pub ask_prices: [u32; TOP_LEVEL_COUNT],
    /// Aggregate volumes matching `ask_prices`.
    pub ask_volumes: [u32; TOP_LEVEL_COUNT],
    /// Best bid prices, descending; zero when fewer than five levels exist.
    pub bid_prices: [u32; TOP_LEVEL_COUNT],
    /// Aggregate volumes matching `bid_prices`.
    pub bid_volumes: [u32; TOP_LEVEL_COUNT],
}

/// Price-time-priority limit order book for one instrument.
pub struct OrderBook {
    pub(super) instrument: Instrument,
    pub(super) tick_size: u32,
    pub(super) fees: FeeSchedule,
    pub(super) arena: OrderArena,
    pub(super) bids: BTreeMap<u32, Level>,
    pub(super) asks: BTreeMap<u32, Level>,
    pub(super) next_sequence: u64,
    pub(super) last_trade_price: Option<u32>,
    /// Per-price aggregates of volume traded with a sell-side taker since the
    /// last drain.
    pub(super) ask_ticks: BTreeMap<u32, u64>,
    /// Per-price aggregates of volume traded with a buy-side taker since the
    /// last drain.
    pub(super) bid_ticks: BTreeMap<u32, u64>,
    /// Edge trigger for the information publisher's coalesced emission.
    pub(super) traded: bool,
}

impl OrderBook {
    /// Create an empty book.
    #[must_use]
    pub fn new(instrument: Instrument, tick_size: u32, fees: FeeSchedule) -> Self {
        Self {
            instrument,
            tick_size,
            fees,
            arena: OrderArena::new(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            next_sequence: 0,
            last_trade_price: None,
            ask_ticks: BTreeMap::new(),
            bid_ticks: BTreeMap::new(),
            traded: false,
        }
    }

    /// The instrument this book trades.
    #[must_use]
    #[inline]
    pub fn instrument(&self) -> Instrument {
        self.instrument
    }

    /// Minimum price increment; all order prices must be multiples of it.
    #[must_use]
    #[inline]
    pub fn tick_size(&self) -> u32 {
        self.tick_size
    }

    /// The book's fee schedule.
    #[must_use]
    #[inline]
    pub fn fees(&self) -> FeeSchedule {
        self.fees
    }

    /// Best (highest) bid price, if any.
    #[must_use]
    pub fn best_bid(&self) -> Option<u32> {
        self.bids.keys().next_back().copied()
    }

    /// Best (lowest) ask price, if any.
    #[must_use]
    pub fn best_ask(&self) -> Option<u32> {
        self.asks.keys().next().copied()
    }

    /// Twice the midpoint in cents, keeping the half-tick exact in integer
    /// arithmetic. `None` until both sides have a level.
    #[must_use]
    pub fn midpoint_cents2(&self) -> Option<u64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(bid as u64 + ask as u64),
            _ => None,
        }
    }

    /// Price of the most recent trade on this book.
    #[must_use]
    #[inline]
    pub fn last_trade_price(&self) -> Option<u32> {
        self.last_trade_price
    }

    /// Number of alive orders across both sides.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.arena.len()
    }

    /// Resting volume at a price, zero if the level is absent.
    #[must_use]
    pub fn volume_at(&self, side: Side, price: u32) -> u64 {
        self.levels(side)
            .get(&price)
            .map(Level::volume)
            .unwrap_or(0)
    }

    /// Snapshot of the five best levels per side, zero padded.
    #[must_use]
    pub fn top_levels(&self) -> TopLevels {
        let mut top = TopLevels::default();
        for (i, (price, level)) in self.asks.iter().take(TOP_LEVEL_COUNT).enumerate() {
            top.ask_prices[i] = *price;
            top.ask_volumes[i] = clamp_volume(level.volume);
        }
        for (i, (price, level)) in self.bids.iter().rev().take(TOP_LEVEL_COUNT).enumerate() {
            top.bid_prices[i] = *price;
            top.bid_volumes[i] = clamp_volume(level.volume);
        }
        top
    }

    /// Drain the trade-tick buffer: per-price volumes of trades since the
    /// last drain, best prices first, zero padded. Returns `None` when no
    /// trade occurred, and always leaves the buffer empty.
    pub fn drain_trade_ticks(&mut self) -> Option<TopLevels> {
        if self.ask_ticks.is_empty() && self.bid_ticks.is_empty() {
            return None;
        }
        let mut ticks = TopLevels::default();
        for (i, (price, volume)) in self.ask_ticks.iter().take(TOP_LEVEL_COUNT).enumerate() {
            ticks.ask_prices[i] = *price;
            ticks.ask_volumes[i] = clamp_volume(*volume);
        }
        for (i, (price, volume)) in self.bid_ticks.iter().rev().take(TOP_LEVEL_COUNT).enumerate() {
            ticks.bid_prices[i] = *price;
            ticks.bid_volumes[i] = clamp_volume(*volume);
        }
        self.ask_ticks.clear();
        self.bid_ticks.clear();
        Some(ticks)
    }

    /// Consume the edge trigger set by trades since the last call.
    pub fn take_traded(&mut self) -> bool {
        std::mem::take(&mut self.traded)
    }

    pub(super) fn levels(&self, side: Side) -> &BTreeMap<u32, Level> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    pub(super) fn levels_mut(&mut self, side: Side) -> &mut BTreeMap<u32, Level> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Best opposing price for an incoming order on `taker_side`.
    pub(super) fn best_opposing(&self, taker_side: Side) -> Option<u32> {
        match taker_side {
            Side::Buy => self.best_ask(),
            Side::Sell => self.best_bid(),
        }
    }

    pub(super) fn validate(&self, price: u32, volume: u32) -> Result<(), OrderBookError> {
        if price == 0 || price % self.tick_size != 0 {
            return Err(OrderBookError::InvalidPrice {
                price,
                tick_size: self.tick_size,
            });
        }
        if volume == 0 {
            return Err(OrderBookError::InvalidVolume { volume });
        }
        Ok(())
    }

    pub(super) fn record_trade(&mut self, taker_side: Side, price: u32, volume: u32) {
        self.last_trade_price = Some(price);
        self.traded = true;
        let bucket = match taker_side {
            Side::Buy => &mut self.bid_ticks,
            Side::Sell => &mut self.ask_ticks,
        };
        *bucket.entry(price).or_insert(0) += volume as u64;
    }
}

#[inline]
fn clamp_volume(volume: u64) -> u32 {
    volume.min(u32::MAX as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::order::Owner;
    use crate::types::Lifespan;

    fn book() -> OrderBook {
        OrderBook::new(Instrument::Etf, 100, FeeSchedule::zero())
    }

    #[test]
    fn empty_book_snapshot_is_zero_padded() {
        let top = book().top_levels();
        assert_eq!(top, TopLevels::default());
    }

    #[test]
    fn top_levels_orders_best_first() {
        let mut book = book();
        for price in [10_000, 10_200, 10_100] {
            book.insert(Owner::Market, 0, Side::Sell, price, 5, Lifespan::GoodForDay)
                .unwrap();
        }
        for price in [9_900, 9_700, 9_800] {
            book.insert(Owner::Market, 0, Side::Buy, price, 3, Lifespan::GoodForDay)
                .unwrap();
        }
        let top = book.top_levels();
        assert_eq!(&top.ask_prices[..3], &[10_000, 10_100, 10_200]);
        assert_eq!(&top.bid_prices[..3], &[9_900, 9_800, 9_700]);
        assert_eq!(top.ask_prices[3], 0);
        assert_eq!(top.bid_volumes[3], 0);
    }

    #[test]
    fn midpoint_requires_both_sides() {
        let mut book = book();
        assert_eq!(book.midpoint_cents2(), None);
        book.insert(Owner::Market, 0, Side::Buy, 9_900, 1, Lifespan::GoodForDay)
            .unwrap();
        assert_eq!(book.midpoint_cents2(), None);
        book.insert(Owner::Market, 0, Side::Sell, 10_100, 1, Lifespan::GoodForDay)
            .unwrap();
        assert_eq!(book.midpoint_cents2(), Some(20_000));
    }
}
