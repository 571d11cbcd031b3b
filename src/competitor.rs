//! Per-session competitor state.
//!
//! A `Competitor` is the exchange-side record of one connection: login state,
//! the order table, the active-order and active-volume counters the risk
//! checks run against, the frequency limiter and the trading account. All
//! behaviour that needs the books lives in the engine; this module is pure
//! session state plus the outbound message sink.

use crate::account::Account;
use crate::limiter::FrequencyLimiter;
use crate::messages::ServerMessage;
use crate::orderbook::OrderRef;
use crate::types::{Instrument, SessionId, Side};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

/// Session lifecycle. Transitions are total: `Pending -> Active` on a valid
/// LOGIN, `Pending -> Closed` on timeout/framing/authentication failure,
/// `Active -> Closed` on disconnect, limit violation or match shutdown.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoginState {
    Pending,
    Active,
    Closed,
}

/// Request-level rejections: the reply is an `ERROR` frame carrying the
/// `Display` string and the session continues.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum RejectReason {
    #[error("DuplicateOrderId")]
    DuplicateOrderId,
    #[error("InvalidPrice")]
    InvalidPrice,
    #[error("InvalidVolume")]
    InvalidVolume,
    #[error("InvalidInstrument")]
    InvalidInstrument,
    #[error("ActiveOrderCountLimitExceeded")]
    ActiveOrderCountLimit,
    #[error("ActiveVolumeLimitExceeded")]
    ActiveVolumeLimit,
    #[error("PositionLimitExceeded")]
    PositionLimitExceeded,
    #[error("OrderRejectedClamp")]
    OrderRejectedClamp,
    #[error("OrderNotFound")]
    OrderNotFound,
    #[error("AmendVolumeIncrease")]
    AmendVolumeIncrease,
}

/// Session-fatal conditions: the session closes and its resting orders are
/// force-cancelled. The `Display` string is sent in a session-level `ERROR`
/// where a peer is still listening.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum CloseReason {
    #[error("MessageRateExceeded")]
    MessageRateExceeded,
    #[error("BadCredentials")]
    BadCredentials,
    #[error("AlreadyActive")]
    AlreadyActive,
    #[error("NotLoggedIn")]
    NotLoggedIn,
    #[error("ProtocolError")]
    ProtocolError,
    #[error("Disconnect")]
    Disconnect,
    #[error("Shutdown")]
    Shutdown,
}

/// One row of the session's order table. Records persist after the order
/// turns terminal so duplicate client ids stay detectable for the whole
/// session.
#[derive(Clone, Debug)]
pub struct SessionOrder {
    /// Book handle while the order rests; `None` once terminal.
    pub handle: Option<OrderRef>,
    pub instrument: Instrument,
    pub side: Side,
    pub price: u32,
    /// Original volume, reduced by amends.
    pub volume: u32,
    /// Unfilled volume; zero means terminal.
    pub remaining: u32,
    /// Cumulative fees charged on this order.
    pub fees: i64,
}

impl SessionOrder {
    /// Lots filled over the order's lifetime.
    #[must_use]
    #[inline]
    pub fn filled(&self) -> u32 {
        self.volume - self.remaining
    }
}

/// Exchange-side state for one competitor connection.
#[derive(Debug)]
pub struct Competitor {
    pub session_id: SessionId,
    /// Team name; set at login.
    pub team: Option<String>,
    pub state: LoginState,
    /// Outbound sink; dropped to close the connection.
    sink: Option<UnboundedSender<ServerMessage>>,
    pub orders: HashMap<u32, SessionOrder>,
    /// Count of orders with `remaining > 0`.
    pub active_order_count: u32,
    /// Sum of `remaining` over those orders.
    pub active_volume: u64,
    /// Sum of remaining volume of resting buys, for the position projection.
    pub resting_buy_volume: i64,
    /// Sum of remaining volume of resting sells.
    pub resting_sell_volume: i64,
    pub limiter: FrequencyLimiter,
    pub account: Account,
    /// Number of fills this session participated in.
    pub trades: u64,
    /// Number of `ERROR` replies sent.
    pub errors: u64,
    /// Monotonic login order, the ranking tie-breaker.
    pub login_sequence: u64,
}

impl Competitor {
    /// A fresh pending session.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        sink: UnboundedSender<ServerMessage>,
        limiter: FrequencyLimiter,
    ) -> Self {
        Self {
            session_id,
            team: None,
            state: LoginState::Pending,
            sink: Some(sink),
            orders: HashMap::new(),
            active_order_count: 0,
            active_volume: 0,
            resting_buy_volume: 0,
            resting_sell_volume: 0,
            limiter,
            account: Account::new(),
            trades: 0,
            errors: 0,
            login_sequence: 0,
        }
    }

    /// Queue an outbound message. Sends after the transport has gone away
    /// are dropped silently; the disconnect is handled on its own path.
    pub fn send(&self, message: ServerMessage) {
        if let Some(sink) = &self.sink {
            if sink.send(message).is_err() {
                trace!(session_id = self.session_id, "outbound sink closed");
            }
        }
    }

    /// Reply with a request-level `ERROR` and bump the error counter.
    pub fn send_error(&mut self, client_order_id: u32, reason: RejectReason) {
        self.errors += 1;
        self.send(ServerMessage::Error {
            client_order_id,
            reason: reason.to_string(),
        });
    }

    /// Drop the outbound sink, which closes the connection's write half.
    pub fn detach_sink(&mut self) {
        self.sink = None;
    }

    /// True if inserting `volume` lots on `side` could breach the position
    /// limit in the worst case: the current position plus every resting buy
    /// (or minus every resting sell) plus this order.
    #[must_use]
    pub fn would_breach_position(&self, side: Side, volume: u32, limit: i64) -> bool {
        let position = self.account.position(Instrument::Etf);
        match side {
            Side::Buy => position + self.resting_buy_volume + volume as i64 > limit,
            Side::Sell => position - self.resting_sell_volume - (volume as i64) < -limit,
        }
    }

    /// Account a change of `delta` lots in resting volume on `side`
    /// (negative when volume leaves the book).
    pub fn adjust_resting(&mut self, side: Side, delta: i64) {
        match side {
            Side::Buy => self.resting_buy_volume += delta,
            Side::Sell => self.resting_sell_volume += delta,
        }
        if delta < 0 {
            self.active_volume = self.active_volume.saturating_sub((-delta) as u64);
        } else {
            self.active_volume += delta as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn competitor() -> (Competitor, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Competitor::new(1, tx, FrequencyLimiter::new(1.0, 10)), rx)
    }

    #[test]
    fn position_projection_counts_resting_and_new_volume() {
        let (mut competitor, _rx) = competitor();
        competitor
            .account
            .apply_trade(Instrument::Etf, Side::Buy, 10_000, 8, 0);
        competitor.adjust_resting(Side::Buy, 3);

        // 8 held + 3 resting + 1 new = 12 > 10.
        assert!(competitor.would_breach_position(Side::Buy, 1, 10));
        // The sell side is nowhere near -10.
        assert!(!competitor.would_breach_position(Side::Sell, 1, 10));
    }

    #[test]
    fn send_error_counts_and_delivers() {
        let (mut competitor, mut rx) = competitor();
        competitor.send_error(7, RejectReason::OrderRejectedClamp);
        assert_eq!(competitor.errors, 1);
        match rx.try_recv() {
            Ok(ServerMessage::Error {
                client_order_id,
                reason,
            }) => {
                assert_eq!(client_order_id, 7);
                assert_eq!(reason, "OrderRejectedClamp");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn detached_sink_swallows_sends() {
        let (mut competitor, mut rx) = competitor();
        competitor.detach_sink();
        competitor.send(ServerMessage::PositionChange {
            instrument: Instrument::Etf,
            position: 1,
        });
        assert!(rx.try_recv().is_err());
    }
}
