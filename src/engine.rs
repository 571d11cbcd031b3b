//! The exchange engine: books, sessions and everything that happens between
//! an inbound frame and the resulting fills, rejections and notifications.
//!
//! The engine is owned by the controller's event loop and mutated only from
//! there, which fixes a deterministic total order over matches. Methods take
//! `now` (simulated seconds) from the timer rather than reading a clock.

use crate::competitor::{CloseReason, Competitor, LoginState, RejectReason, SessionOrder};
use crate::config::{Config, ConfigError, LimitsConfig};
use crate::limiter::FrequencyLimiter;
use crate::manager::CompetitorManager;
use crate::market_events::{MarketEvent, MarketEventKind};
use crate::match_events::{MatchEvent, MatchEventSender};
use crate::messages::{ClientMessage, ServerMessage};
use crate::orderbook::{Fill, OrderBook, OrderBookError, Owner};
use crate::score_board::ScoreRecord;
use crate::types::{Instrument, Lifespan, SessionId, Side};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// The exchange core: both books plus the competitor registry.
pub struct Engine {
    /// Frictionless reference book, driven by the script and hedges.
    pub future_book: OrderBook,
    /// Fee-bearing book competitors trade.
    pub etf_book: OrderBook,
    /// Session registry and roster.
    pub manager: CompetitorManager,
    limits: LimitsConfig,
    clamp_ppm: u64,
    tick_size: u32,
    limiter_interval: f64,
    limiter_limit: usize,
    match_events: MatchEventSender,
}

impl Engine {
    /// Build the engine from validated configuration.
    pub fn new(config: &Config, match_events: MatchEventSender) -> Result<Self, ConfigError> {
        let tick_size = config.instrument.tick_size_cents()?;
        Ok(Self {
            future_book: OrderBook::new(
                Instrument::Future,
                tick_size,
                crate::orderbook::FeeSchedule::zero(),
            ),
            etf_book: OrderBook::new(Instrument::Etf, tick_size, config.fees.schedule()),
            manager: CompetitorManager::new(config.traders.clone()),
            limits: config.limits,
            clamp_ppm: config.instrument.clamp_ppm(),
            tick_size,
            // The limiter sees simulated time, so the window stays in
            // simulated seconds; real-time scaling by speed falls out.
            limiter_interval: config.limits.message_frequency_interval,
            limiter_limit: config.limits.message_frequency_limit,
            match_events,
        })
    }

    /// The book for an instrument.
    pub fn book_mut(&mut self, instrument: Instrument) -> &mut OrderBook {
        match instrument {
            Instrument::Future => &mut self.future_book,
            Instrument::Etf => &mut self.etf_book,
        }
    }

    /// Register a freshly accepted connection as a pending session.
    pub fn on_session_connected(
        &mut self,
        session_id: SessionId,
        sink: UnboundedSender<ServerMessage>,
    ) {
        let limiter = FrequencyLimiter::new(self.limiter_interval, self.limiter_limit);
        self.manager
            .register(Competitor::new(session_id, sink, limiter));
        debug!(session_id, "session connected");
    }

    /// The transport saw the connection drop.
    pub fn on_session_disconnected(&mut self, session_id: SessionId, now: f64) {
        self.close_session(session_id, CloseReason::Disconnect, now, false);
    }

    /// Handle one inbound message in arrival order.
    pub fn on_message(&mut self, session_id: SessionId, message: ClientMessage, now: f64) {
        let state = match self.manager.get(session_id) {
            Some(competitor) => competitor.state,
            None => return,
        };
        match state {
            LoginState::Closed => {}
            LoginState::Pending => match message {
                ClientMessage::Login { team, secret } => {
                    self.handle_login(session_id, &team, &secret, now);
                }
                _ => self.close_session(session_id, CloseReason::NotLoggedIn, now, true),
            },
            LoginState::Active => {
                let admitted = self
                    .manager
                    .get_mut(session_id)
                    .map(|c| c.limiter.try_admit(now))
                    .unwrap_or(false);
                if !admitted {
                    self.close_session(session_id, CloseReason::MessageRateExceeded, now, true);
                    return;
                }
                match message {
                    ClientMessage::Login { .. } => {
                        self.close_session(session_id, CloseReason::ProtocolError, now, true);
                    }
                    ClientMessage::InsertOrder {
                        client_order_id,
                        instrument,
                        side,
                        price,
                        volume,
                        lifespan,
                    } => self.handle_insert(
                        session_id,
                        client_order_id,
                        instrument,
                        side,
                        price,
                        volume,
                        lifespan,
                        now,
                    ),
                    ClientMessage::AmendOrder {
                        client_order_id,
                        new_volume,
                    } => self.handle_amend(session_id, client_order_id, new_volume),
                    ClientMessage::CancelOrder { client_order_id } => {
                        self.handle_cancel(session_id, client_order_id);
                    }
                    ClientMessage::HedgeOrder {
                        client_order_id,
                        instrument,
                        side,
                        price,
                        volume,
                    } => self.handle_hedge(
                        session_id,
                        client_order_id,
                        instrument,
                        side,
                        price,
                        volume,
                        now,
                    ),
                }
            }
        }
    }

    /// Apply one scripted market event, as the market: no risk checks, no
    /// fees, but fills against competitor orders settle normally.
    pub fn apply_market_event(&mut self, event: &MarketEvent, now: f64) {
        let outcome = {
            let book = self.book_mut(event.instrument);
            match event.kind {
                MarketEventKind::InsertBidLevel => book
                    .insert_market_level(Side::Buy, event.price, event.volume)
                    .map(|report| Some((Side::Buy, report))),
                MarketEventKind::InsertAskLevel => book
                    .insert_market_level(Side::Sell, event.price, event.volume)
                    .map(|report| Some((Side::Sell, report))),
                MarketEventKind::Trade => book
                    .market_trade(event.price, event.volume)
                    .map(|(side, report)| Some((side, report))),
                MarketEventKind::RemoveLevel => {
                    book.remove_market_level(event.price);
                    Ok(None)
                }
            }
        };
        match outcome {
            Ok(Some((taker_side, report))) => {
                if !report.fills.is_empty() {
                    self.apply_fills(
                        event.instrument,
                        Owner::Market,
                        0,
                        taker_side,
                        &report.fills,
                        now,
                    );
                }
            }
            Ok(None) => {}
            Err(err) => warn!(tick = event.tick, %err, "market event not applied"),
        }
    }

    /// Per-tick account mark-to-market at each book's last trade price,
    /// falling back to the current midpoint.
    pub fn on_tick(&mut self, _now: f64) {
        let etf_mark = mark_price(&self.etf_book);
        let future_mark = mark_price(&self.future_book);
        for competitor in self.manager.competitors_mut() {
            if let Some(mark) = etf_mark {
                competitor.account.mark_to_market(Instrument::Etf, mark);
            }
            if let Some(mark) = future_mark {
                competitor.account.mark_to_market(Instrument::Future, mark);
            }
        }
    }

    /// Close every session at match end.
    pub fn close_all_sessions(&mut self, now: f64) {
        for session_id in self.manager.session_ids() {
            self.close_session(session_id, CloseReason::Shutdown, now, false);
        }
    }

    /// Final ranking for the score board.
    #[must_use]
    pub fn finalize(&self) -> Vec<ScoreRecord> {
        self.manager.finalize()
    }

    fn handle_login(&mut self, session_id: SessionId, team: &str, secret: &str, now: f64) {
        match self.manager.login(session_id, team, secret) {
            Ok(()) => {}
            Err(err) => {
                let reason = match err {
                    crate::manager::LoginError::BadCredentials => CloseReason::BadCredentials,
                    crate::manager::LoginError::AlreadyActive => CloseReason::AlreadyActive,
                };
                warn!(session_id, team, %reason, "login rejected");
                self.close_session(session_id, reason, now, true);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_insert(
        &mut self,
        session_id: SessionId,
        client_order_id: u32,
        instrument: Instrument,
        side: Side,
        price: u32,
        volume: u32,
        lifespan: Lifespan,
        now: f64,
    ) {
        let reject = {
            let Some(competitor) = self.manager.get(session_id) else {
                return;
            };
            if competitor.orders.contains_key(&client_order_id) {
                Some(RejectReason::DuplicateOrderId)
            } else if instrument != Instrument::Etf {
                Some(RejectReason::InvalidInstrument)
            } else if price == 0 || price % self.tick_size != 0 {
                Some(RejectReason::InvalidPrice)
            } else if volume == 0 {
                Some(RejectReason::InvalidVolume)
            } else if competitor.active_order_count + 1 > self.limits.active_order_count_limit {
                Some(RejectReason::ActiveOrderCountLimit)
            } else if competitor.active_volume + volume as u64 > self.limits.active_volume_limit {
                Some(RejectReason::ActiveVolumeLimit)
            } else if competitor.would_breach_position(side, volume, self.limits.position_limit) {
                Some(RejectReason::PositionLimitExceeded)
            } else if !self.within_clamp(price) {
                Some(RejectReason::OrderRejectedClamp)
            } else {
                None
            }
        };
        if let Some(reason) = reject {
            if let Some(competitor) = self.manager.get_mut(session_id) {
                competitor.send_error(client_order_id, reason);
            }
            return;
        }

        let report = match self.etf_book.insert(
            Owner::Session(session_id),
            client_order_id,
            side,
            price,
            volume,
            lifespan,
        ) {
            Ok(report) => report,
            Err(err) => {
                warn!(session_id, client_order_id, %err, "book rejected admitted order");
                if let Some(competitor) = self.manager.get_mut(session_id) {
                    competitor.send_error(client_order_id, map_book_error(&err));
                }
                return;
            }
        };

        let rested_remaining = if report.rested.is_some() {
            report.remaining
        } else {
            0
        };
        // A killed remainder never counted as volume; keep `filled()` exact.
        let record_volume = if report.rested.is_some() {
            volume
        } else {
            volume - report.remaining
        };
        if let Some(competitor) = self.manager.get_mut(session_id) {
            competitor.orders.insert(
                client_order_id,
                SessionOrder {
                    handle: report.rested,
                    instrument,
                    side,
                    price,
                    volume: record_volume,
                    remaining: rested_remaining,
                    fees: 0,
                },
            );
            if report.rested.is_some() {
                competitor.active_order_count += 1;
                competitor.adjust_resting(side, rested_remaining as i64);
            }
        }

        self.apply_fills(
            Instrument::Etf,
            Owner::Session(session_id),
            client_order_id,
            side,
            &report.fills,
            now,
        );

        let filled_total: u32 = report.fills.iter().map(|f| f.volume).sum();
        let killed = lifespan == Lifespan::FillAndKill && report.remaining > 0;
        if let Some(competitor) = self.manager.get_mut(session_id) {
            if filled_total > 0 || killed {
                let fees = competitor
                    .orders
                    .get(&client_order_id)
                    .map(|o| o.fees)
                    .unwrap_or(0);
                competitor.send(ServerMessage::OrderStatus {
                    client_order_id,
                    fill_volume: filled_total,
                    remaining_volume: rested_remaining,
                    fees: fees as i32,
                });
            }
            if filled_total > 0 {
                let position = competitor.account.position(Instrument::Etf);
                competitor.send(ServerMessage::PositionChange {
                    instrument: Instrument::Etf,
                    position: position as i32,
                });
            }
        }
    }

    fn handle_amend(&mut self, session_id: SessionId, client_order_id: u32, new_volume: u32) {
        let handle = {
            let Some(competitor) = self.manager.get(session_id) else {
                return;
            };
            competitor
                .orders
                .get(&client_order_id)
                .and_then(|record| record.handle)
        };
        let Some(handle) = handle else {
            if let Some(competitor) = self.manager.get_mut(session_id) {
                competitor.send_error(client_order_id, RejectReason::OrderNotFound);
            }
            return;
        };

        let report = match self.etf_book.amend(handle, new_volume) {
            Ok(report) => report,
            Err(err) => {
                if let Some(competitor) = self.manager.get_mut(session_id) {
                    competitor.send_error(client_order_id, map_book_error(&err));
                }
                return;
            }
        };

        if let Some(competitor) = self.manager.get_mut(session_id) {
            let mut status = None;
            if let Some(record) = competitor.orders.get_mut(&client_order_id) {
                let delta = record.remaining - report.remaining;
                record.remaining = report.remaining;
                if report.remaining == 0 {
                    record.handle = None;
                    // Keep `filled()` truthful for terminal records.
                    record.volume = report.filled;
                } else {
                    record.volume = new_volume;
                }
                status = Some((record.side, delta, report.filled, record.fees));
            }
            if let Some((side, delta, filled, fees)) = status {
                competitor.adjust_resting(side, -(delta as i64));
                if report.remaining == 0 {
                    competitor.active_order_count -= 1;
                }
                competitor.send(ServerMessage::OrderStatus {
                    client_order_id,
                    fill_volume: filled,
                    remaining_volume: report.remaining,
                    fees: fees as i32,
                });
            }
        }
    }

    fn handle_cancel(&mut self, session_id: SessionId, client_order_id: u32) {
        let handle = {
            let Some(competitor) = self.manager.get(session_id) else {
                return;
            };
            competitor
                .orders
                .get(&client_order_id)
                .and_then(|record| record.handle)
        };
        let Some(handle) = handle else {
            if let Some(competitor) = self.manager.get_mut(session_id) {
                competitor.send_error(client_order_id, RejectReason::OrderNotFound);
            }
            return;
        };

        match self.etf_book.cancel(handle) {
            Ok(report) => {
                if let Some(competitor) = self.manager.get_mut(session_id) {
                    if let Some(record) = competitor.orders.get_mut(&client_order_id) {
                        record.remaining = 0;
                        record.handle = None;
                        record.volume = report.filled;
                    }
                    competitor.adjust_resting(report.side, -(report.cancelled as i64));
                    competitor.active_order_count -= 1;
                    let fees = competitor
                        .orders
                        .get(&client_order_id)
                        .map(|o| o.fees)
                        .unwrap_or(0);
                    competitor.send(ServerMessage::OrderStatus {
                        client_order_id,
                        fill_volume: report.filled,
                        remaining_volume: 0,
                        fees: fees as i32,
                    });
                }
            }
            Err(err) => {
                if let Some(competitor) = self.manager.get_mut(session_id) {
                    competitor.send_error(client_order_id, map_book_error(&err));
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_hedge(
        &mut self,
        session_id: SessionId,
        client_order_id: u32,
        instrument: Instrument,
        side: Side,
        price: u32,
        volume: u32,
        now: f64,
    ) {
        let reject = {
            let Some(competitor) = self.manager.get(session_id) else {
                return;
            };
            if competitor.orders.contains_key(&client_order_id) {
                Some(RejectReason::DuplicateOrderId)
            } else if instrument != Instrument::Future {
                Some(RejectReason::InvalidInstrument)
            } else if price == 0 || price % self.tick_size != 0 {
                Some(RejectReason::InvalidPrice)
            } else if volume == 0 {
                Some(RejectReason::InvalidVolume)
            } else {
                None
            }
        };
        if let Some(reason) = reject {
            if let Some(competitor) = self.manager.get_mut(session_id) {
                competitor.send_error(client_order_id, reason);
            }
            return;
        }

        let fills = match self.future_book.trade_at_best(side, price, volume) {
            Ok(fills) => fills,
            Err(err) => {
                if let Some(competitor) = self.manager.get_mut(session_id) {
                    competitor.send_error(client_order_id, map_book_error(&err));
                }
                return;
            }
        };
        let filled_total: u32 = fills.iter().map(|f| f.volume).sum();

        if let Some(competitor) = self.manager.get_mut(session_id) {
            competitor.orders.insert(
                client_order_id,
                SessionOrder {
                    handle: None,
                    instrument,
                    side,
                    price,
                    // Immediate-or-cancel: only the filled part ever existed.
                    volume: filled_total,
                    remaining: 0,
                    fees: 0,
                },
            );
        }

        self.apply_fills(
            Instrument::Future,
            Owner::Session(session_id),
            client_order_id,
            side,
            &fills,
            now,
        );

        if let Some(competitor) = self.manager.get_mut(session_id) {
            let fees = competitor
                .orders
                .get(&client_order_id)
                .map(|o| o.fees)
                .unwrap_or(0);
            competitor.send(ServerMessage::OrderStatus {
                client_order_id,
                fill_volume: filled_total,
                remaining_volume: 0,
                fees: fees as i32,
            });
            if filled_total > 0 {
                let position = competitor.account.position(Instrument::Future);
                competitor.send(ServerMessage::PositionChange {
                    instrument: Instrument::Future,
                    position: position as i32,
                });
            }
        }
    }

    /// Settle a batch of fills: maker notifications and accounting per fill,
    /// taker accounting and `ORDER_FILLED` stream, match event records in
    /// match order. The taker's `ORDER_STATUS`/`POSITION_CHANGE` summary is
    /// the caller's job.
    fn apply_fills(
        &mut self,
        instrument: Instrument,
        taker: Owner,
        taker_client_order_id: u32,
        taker_side: Side,
        fills: &[Fill],
        now: f64,
    ) {
        let maker_side = taker_side.opposite();
        for fill in fills {
            if let Owner::Session(maker_id) = fill.maker_owner {
                if let Some(maker) = self.manager.get_mut(maker_id) {
                    maker.account.apply_trade(
                        instrument,
                        maker_side,
                        fill.price,
                        fill.volume,
                        fill.maker_fee,
                    );
                    maker.trades += 1;
                    let mut status = None;
                    if let Some(record) = maker.orders.get_mut(&fill.maker_client_order_id) {
                        record.remaining = fill.maker_remaining;
                        record.fees += fill.maker_fee;
                        if fill.maker_remaining == 0 {
                            record.handle = None;
                        }
                        status = Some((record.filled(), record.fees));
                    }
                    maker.adjust_resting(maker_side, -(fill.volume as i64));
                    if fill.maker_remaining == 0 {
                        maker.active_order_count -= 1;
                    }
                    maker.send(ServerMessage::OrderFilled {
                        client_order_id: fill.maker_client_order_id,
                        price: fill.price,
                        volume: fill.volume,
                    });
                    if let Some((filled, fees)) = status {
                        maker.send(ServerMessage::OrderStatus {
                            client_order_id: fill.maker_client_order_id,
                            fill_volume: filled,
                            remaining_volume: fill.maker_remaining,
                            fees: fees as i32,
                        });
                    }
                    let position = maker.account.position(instrument);
                    maker.send(ServerMessage::PositionChange {
                        instrument,
                        position: position as i32,
                    });
                }
            }

            if let Owner::Session(taker_id) = taker {
                if let Some(competitor) = self.manager.get_mut(taker_id) {
                    competitor.account.apply_trade(
                        instrument,
                        taker_side,
                        fill.price,
                        fill.volume,
                        fill.taker_fee,
                    );
                    competitor.trades += 1;
                    if let Some(record) = competitor.orders.get_mut(&taker_client_order_id) {
                        record.fees += fill.taker_fee;
                    }
                    competitor.send(ServerMessage::OrderFilled {
                        client_order_id: taker_client_order_id,
                        price: fill.price,
                        volume: fill.volume,
                    });
                }
            }

            let maker_team = owner_team(&self.manager, fill.maker_owner);
            let taker_team = owner_team(&self.manager, taker);
            let _ = self.match_events.send(MatchEvent {
                time: now,
                instrument,
                maker: maker_team,
                taker: taker_team,
                price: fill.price,
                volume: fill.volume,
                maker_fee: fill.maker_fee,
                taker_fee: fill.taker_fee,
            });
        }
    }

    /// Close a session: optional session-level `ERROR`, force-cancel every
    /// resting order with an `ORDER_STATUS` each, release the team slot and
    /// drop the outbound sink.
    fn close_session(&mut self, session_id: SessionId, reason: CloseReason, _now: f64, notify: bool) {
        let resting: Vec<(u32, crate::orderbook::OrderRef)> = {
            let Some(competitor) = self.manager.get_mut(session_id) else {
                return;
            };
            if competitor.state == LoginState::Closed {
                return;
            }
            if notify {
                competitor.errors += 1;
                competitor.send(ServerMessage::Error {
                    client_order_id: 0,
                    reason: reason.to_string(),
                });
            }
            competitor
                .orders
                .iter()
                .filter_map(|(id, record)| record.handle.map(|handle| (*id, handle)))
                .collect()
        };

        for (client_order_id, handle) in resting {
            if let Ok(report) = self.etf_book.cancel(handle) {
                if let Some(competitor) = self.manager.get_mut(session_id) {
                    if let Some(record) = competitor.orders.get_mut(&client_order_id) {
                        record.remaining = 0;
                        record.handle = None;
                        record.volume = report.filled;
                    }
                    competitor.adjust_resting(report.side, -(report.cancelled as i64));
                    competitor.active_order_count -= 1;
                    let fees = competitor
                        .orders
                        .get(&client_order_id)
                        .map(|o| o.fees)
                        .unwrap_or(0);
                    competitor.send(ServerMessage::OrderStatus {
                        client_order_id,
                        fill_volume: report.filled,
                        remaining_volume: 0,
                        fees: fees as i32,
                    });
                }
            }
        }

        if let Some(competitor) = self.manager.get_mut(session_id) {
            competitor.detach_sink();
        }
        self.manager.release(session_id);
        info!(session_id, %reason, "session closed");
    }

    /// True when `price` lies inside the ETF clamp band around the FUTURE
    /// midpoint, both bounds rounded to the nearest tick. With no FUTURE
    /// midpoint the band is open-ended.
    fn within_clamp(&self, price: u32) -> bool {
        let Some(mid2) = self.future_book.midpoint_cents2() else {
            return true;
        };
        let mid2 = mid2 as u128;
        let tick = self.tick_size as u128;
        let clamp = self.clamp_ppm as u128;
        let den = 2_000_000 * tick;
        let lower_factor = 1_000_000u128.saturating_sub(clamp);
        let lower = (mid2 * lower_factor + den / 2) / den * tick;
        let upper = (mid2 * (1_000_000 + clamp) + den / 2) / den * tick;
        let price = price as u128;
        price >= lower && price <= upper
    }
}

/// Mark price for a book: last trade, else midpoint, else nothing.
fn mark_price(book: &OrderBook) -> Option<i64> {
    book.last_trade_price()
        .map(|p| p as i64)
        .or_else(|| book.midpoint_cents2().map(|m| (m / 2) as i64))
}

fn owner_team(manager: &CompetitorManager, owner: Owner) -> String {
    match owner {
        Owner::Market => String::new(),
        Owner::Session(session_id) => manager
            .team_name(session_id)
            .unwrap_or_default()
            .to_string(),
    }
}

fn map_book_error(err: &OrderBookError) -> RejectReason {
    match err {
        OrderBookError::OrderNotFound => RejectReason::OrderNotFound,
        OrderBookError::InvalidPrice { .. } => RejectReason::InvalidPrice,
        OrderBookError::InvalidVolume { .. } => RejectReason::InvalidVolume,
        OrderBookError::AmendVolumeIncrease { .. } => RejectReason::AmendVolumeIncrease,
        OrderBookError::TradeDoesNotCross { .. } => RejectReason::InvalidPrice,
    }
}
