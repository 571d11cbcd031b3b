//! Shared scalar types used across the exchange.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of price levels reported in book snapshots and trade ticks.
pub const TOP_LEVEL_COUNT: usize = 5;

/// Identifier of one competitor connection, assigned by the execution server.
pub type SessionId = u64;

/// The tradeable instruments.
///
/// The FUTURE is the frictionless reference driven by the market-data script;
/// only the ETF may be traded directly by competitors. Wire encoding matches
/// the discriminant.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Instrument {
    /// Reference instrument, used for ETF price clamping and hedging.
    Future = 0,
    /// Fee-bearing instrument tradeable by competitors.
    Etf = 1,
}

impl Instrument {
    /// Number of instruments in the market.
    pub const COUNT: usize = 2;

    /// Both instruments, in wire order.
    pub const ALL: [Instrument; Instrument::COUNT] = [Instrument::Future, Instrument::Etf];

    /// Dense index for per-instrument arrays.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Decode the wire representation.
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Instrument::Future),
            1 => Some(Instrument::Etf),
            _ => None,
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instrument::Future => write!(f, "FUTURE"),
            Instrument::Etf => write!(f, "ETF"),
        }
    }
}

/// Order side. Wire encoding matches the discriminant.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    /// Sell (ask) side.
    Sell = 0,
    /// Buy (bid) side.
    Buy = 1,
}

impl Side {
    /// The opposing side.
    #[inline]
    pub const fn opposite(self) -> Side {
        match self {
            Side::Sell => Side::Buy,
            Side::Buy => Side::Sell,
        }
    }

    /// Decode the wire representation.
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Side::Sell),
            1 => Some(Side::Buy),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Sell => write!(f, "SELL"),
            Side::Buy => write!(f, "BUY"),
        }
    }
}

/// How long an order remains eligible to rest on the book.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Lifespan {
    /// Any unfilled remainder is cancelled immediately after matching.
    FillAndKill = 0,
    /// The remainder rests on the book until cancelled or filled.
    GoodForDay = 1,
}

impl Lifespan {
    /// Decode the wire representation.
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Lifespan::FillAndKill),
            1 => Some(Lifespan::GoodForDay),
            _ => None,
        }
    }
}

impl fmt::Display for Lifespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifespan::FillAndKill => write!(f, "FAK"),
            Lifespan::GoodForDay => write!(f, "GFD"),
        }
    }
}
