//! Core matching logic for the order book.
//!
//! An incoming order walks the opposing side best level first and each level
//! in strict FIFO, trading at the resting order's price: price improvement
//! accrues to the taker. Good-for-day remainders rest; fill-and-kill
//! remainders are discarded by the caller.

use super::book::OrderBook;
use super::error::OrderBookError;
use super::order::{Order, OrderRef, Owner};
use crate::types::{Lifespan, Side};
use tracing::trace;

/// One trade produced while matching an incoming order.
#[derive(Clone, Copy, Debug)]
pub struct Fill {
    /// Trade price: always the maker's resting price.
    pub price: u32,
    /// Lots traded.
    pub volume: u32,
    /// The maker's owner.
    pub maker_owner: Owner,
    /// The maker's client order id (zero for market liquidity).
    pub maker_client_order_id: u32,
    /// The maker's remaining volume after this fill; zero means the maker
    /// turned terminal and was unlinked.
    pub maker_remaining: u32,
    /// Fee charged to the maker (negative = rebate).
    pub maker_fee: i64,
    /// Fee charged to the taker.
    pub taker_fee: i64,
}

/// Outcome of inserting an order.
#[derive(Debug)]
pub struct InsertReport {
    /// Handle of the rested remainder, when the order rested.
    pub rested: Option<OrderRef>,
    /// Unfilled volume after matching (zero or the rested amount for
    /// good-for-day; discarded for fill-and-kill).
    pub remaining: u32,
    /// Trades executed, in match order.
    pub fills: Vec<Fill>,
}

/// Outcome of cancelling an order.
#[derive(Debug)]
pub struct CancelReport {
    /// Side the order was resting on.
    pub side: Side,
    /// The order's limit price.
    pub price: u32,
    /// Volume that was still open and is now cancelled.
    pub cancelled: u32,
    /// Volume filled over the order's lifetime.
    pub filled: u32,
}

/// Outcome of amending an order's volume down.
#[derive(Debug)]
pub struct AmendReport {
    /// Remaining volume after the amend; zero means the amend cancelled it.
    pub remaining: u32,
    /// Volume filled over the order's lifetime.
    pub filled: u32,
}

impl OrderBook {
    /// Insert an order: match against the opposing side, then rest any
    /// good-for-day remainder at the tail of its price level.
    ///
    /// # Errors
    /// Rejects prices that are not positive tick-size multiples and zero
    /// volumes; nothing is mutated on rejection.
    pub fn insert(
        &mut self,
        owner: Owner,
        client_order_id: u32,
        side: Side,
        price: u32,
        volume: u32,
        lifespan: Lifespan,
    ) -> Result<InsertReport, OrderBookError> {
        self.validate(price, volume)?;

        let mut fills = Vec::new();
        let mut remaining = volume;
        while remaining > 0 {
            let Some(level_price) = self.best_opposing(side) else {
                break;
            };
            let crosses = match side {
                Side::Buy => level_price <= price,
                Side::Sell => level_price >= price,
            };
            if !crosses {
                break;
            }
            remaining = self.match_at_level(side, level_price, remaining, &mut fills);
        }

        let mut rested = None;
        if remaining > 0 && lifespan == Lifespan::GoodForDay {
            let sequence = self.next_sequence;
            self.next_sequence += 1;
            let handle = self.arena.insert(Order {
                instrument: self.instrument,
                side,
                price,
                volume,
                remaining,
                lifespan,
                owner,
                client_order_id,
                sequence,
            });
            let level = self.levels_mut(side).entry(price).or_default();
            level.orders.push_back(handle);
            level.volume += remaining as u64;
            rested = Some(handle);
            trace!(
                instrument = %self.instrument,
                %side,
                price,
                remaining,
                sequence,
                "order rested"
            );
        }

        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            debug_assert!(bid < ask, "crossed book rested: bid {bid} >= ask {ask}");
        }

        Ok(InsertReport {
            rested,
            remaining,
            fills,
        })
    }

    /// Cancel an alive order: unlink it from its level and free its slot.
    ///
    /// # Errors
    /// Returns [`OrderBookError::OrderNotFound`] for stale handles.
    pub fn cancel(&mut self, handle: OrderRef) -> Result<CancelReport, OrderBookError> {
        let (side, price, remaining) = {
            let order = self.arena.get(handle).ok_or(OrderBookError::OrderNotFound)?;
            (order.side, order.price, order.remaining)
        };

        let levels = self.levels_mut(side);
        if let Some(level) = levels.get_mut(&price) {
            if let Some(position) = level.orders.iter().position(|r| *r == handle) {
                level.orders.remove(position);
                level.volume -= remaining as u64;
            }
            if level.orders.is_empty() {
                levels.remove(&price);
            }
        }

        let order = self
            .arena
            .remove(handle)
            .ok_or(OrderBookError::OrderNotFound)?;
        trace!(instrument = %self.instrument, side = %order.side, price, remaining, "order cancelled");
        Ok(CancelReport {
            side,
            price,
            cancelled: remaining,
            filled: order.filled(),
        })
    }

    /// Reduce an order's volume. Volume may never increase; the new remaining
    /// is `min(remaining, new_volume - filled)`, and an amend that drives the
    /// remaining to zero cancels the order.
    ///
    /// # Errors
    /// Returns [`OrderBookError::OrderNotFound`] for stale handles and
    /// [`OrderBookError::AmendVolumeIncrease`] when `new_volume` exceeds the
    /// original volume.
    pub fn amend(&mut self, handle: OrderRef, new_volume: u32) -> Result<AmendReport, OrderBookError> {
        let (volume, remaining, filled, side, price) = {
            let order = self.arena.get(handle).ok_or(OrderBookError::OrderNotFound)?;
            (
                order.volume,
                order.remaining,
                order.filled(),
                order.side,
                order.price,
            )
        };
        if new_volume > volume {
            return Err(OrderBookError::AmendVolumeIncrease {
                requested: new_volume,
                original: volume,
            });
        }

        let new_remaining = remaining.min(new_volume.saturating_sub(filled));
        if new_remaining == 0 {
            let report = self.cancel(handle)?;
            return Ok(AmendReport {
                remaining: 0,
                filled: report.filled,
            });
        }

        let delta = remaining - new_remaining;
        if let Some(order) = self.arena.get_mut(handle) {
            order.volume = new_volume;
            order.remaining = new_remaining;
        }
        if let Some(level) = self.levels_mut(side).get_mut(&price) {
            level.volume -= delta as u64;
        }
        trace!(instrument = %self.instrument, price, new_volume, new_remaining, "order amended");
        Ok(AmendReport {
            remaining: new_remaining,
            filled,
        })
    }

    /// Immediate-or-cancel trade that consumes best-level liquidity only;
    /// nothing ever rests. Used for hedge orders against the FUTURE book.
    ///
    /// # Errors
    /// Rejects prices that are not positive tick-size multiples and zero
    /// volumes.
    pub fn trade_at_best(
        &mut self,
        taker_side: Side,
        price: u32,
        volume: u32,
    ) -> Result<Vec<Fill>, OrderBookError> {
        self.validate(price, volume)?;
        let mut fills = Vec::new();
        if let Some(level_price) = self.best_opposing(taker_side) {
            let crosses = match taker_side {
                Side::Buy => level_price <= price,
                Side::Sell => level_price >= price,
            };
            if crosses {
                self.match_at_level(taker_side, level_price, volume, &mut fills);
            }
        }
        Ok(fills)
    }

    /// Scripted liquidity insertion: rests (or matches) as the market.
    ///
    /// # Errors
    /// Propagates price/volume validation failures.
    pub fn insert_market_level(
        &mut self,
        side: Side,
        price: u32,
        volume: u32,
    ) -> Result<InsertReport, OrderBookError> {
        self.insert(Owner::Market, 0, side, price, volume, Lifespan::GoodForDay)
    }

    /// Scripted trade: aggress the side the price crosses and report which
    /// side took. A price at or below the best bid sells into the bids; a
    /// price at or above the best ask buys from the asks.
    ///
    /// # Errors
    /// Returns [`OrderBookError::TradeDoesNotCross`] when the price sits
    /// inside the spread or the book is empty.
    pub fn market_trade(
        &mut self,
        price: u32,
        volume: u32,
    ) -> Result<(Side, InsertReport), OrderBookError> {
        if self.best_bid().is_some_and(|bid| bid >= price) {
            let report =
                self.insert(Owner::Market, 0, Side::Sell, price, volume, Lifespan::FillAndKill)?;
            Ok((Side::Sell, report))
        } else if self.best_ask().is_some_and(|ask| ask <= price) {
            let report =
                self.insert(Owner::Market, 0, Side::Buy, price, volume, Lifespan::FillAndKill)?;
            Ok((Side::Buy, report))
        } else {
            Err(OrderBookError::TradeDoesNotCross {
                price,
                side: Side::Sell,
            })
        }
    }

    /// Remove the market's resting liquidity at a price on both sides,
    /// leaving competitor orders untouched. Returns the cancelled volume.
    pub fn remove_market_level(&mut self, price: u32) -> u64 {
        let mut cancelled = 0u64;
        for side in [Side::Buy, Side::Sell] {
            let handles: Vec<OrderRef> = self
                .levels(side)
                .get(&price)
                .map(|level| {
                    level
                        .orders
                        .iter()
                        .copied()
                        .filter(|r| {
                            self.arena
                                .get(*r)
                                .is_some_and(|o| o.owner == Owner::Market)
                        })
                        .collect()
                })
                .unwrap_or_default();
            for handle in handles {
                if let Ok(report) = self.cancel(handle) {
                    cancelled += report.cancelled as u64;
                }
            }
        }
        cancelled
    }

    /// Match `remaining` lots against the FIFO of resting orders at one
    /// opposing level, returning what is left. Removes the level once empty.
    fn match_at_level(
        &mut self,
        taker_side: Side,
        level_price: u32,
        mut remaining: u32,
        fills: &mut Vec<Fill>,
    ) -> u32 {
        let fees = self.fees;
        let maker_side = taker_side.opposite();

        while remaining > 0 {
            let Some(maker_ref) = self
                .levels(maker_side)
                .get(&level_price)
                .and_then(|level| level.orders.front().copied())
            else {
                break;
            };

            let (traded, maker_remaining, maker_owner, maker_client_order_id) = {
                let Some(maker) = self.arena.get_mut(maker_ref) else {
                    // Stale handle at the front of the queue; drop it and the
                    // level too once nothing is left, so the caller's walk
                    // always makes progress.
                    let levels = self.levels_mut(maker_side);
                    if let Some(level) = levels.get_mut(&level_price) {
                        level.orders.pop_front();
                        if level.orders.is_empty() {
                            levels.remove(&level_price);
                        }
                    }
                    continue;
                };
                let traded = remaining.min(maker.remaining);
                maker.remaining -= traded;
                (
                    traded,
                    maker.remaining,
                    maker.owner,
                    maker.client_order_id,
                )
            };
            remaining -= traded;

            let levels = self.levels_mut(maker_side);
            if let Some(level) = levels.get_mut(&level_price) {
                level.volume -= traded as u64;
                if maker_remaining == 0 {
                    level.orders.pop_front();
                }
                if level.orders.is_empty() {
                    levels.remove(&level_price);
                }
            }
            if maker_remaining == 0 {
                self.arena.remove(maker_ref);
            }

            let notional = level_price as i64 * traded as i64;
            self.record_trade(taker_side, level_price, traded);
            trace!(
                instrument = %self.instrument,
                price = level_price,
                volume = traded,
                %taker_side,
                "trade"
            );
            fills.push(Fill {
                price: level_price,
                volume: traded,
                maker_owner,
                maker_client_order_id,
                maker_remaining,
                maker_fee: fees.maker_fee(notional),
                taker_fee: fees.taker_fee(notional),
            });
        }

        remaining
    }
}
