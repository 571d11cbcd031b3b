//! # Exchange Simulator
//!
//! A low-latency exchange simulator for a two-instrument market: a FUTURE
//! (frictionless reference, driven entirely by a scripted event stream) and
//! an ETF (tradeable, fee-bearing, price-clamped around the FUTURE
//! midpoint). Competing autonomous traders connect over a length-prefixed
//! TCP protocol, trade against two price-time-priority order books, and
//! receive market data over UDP; at match end every team is scored by
//! mark-to-market profit.
//!
//! ## Key properties
//!
//! - **Deterministic**: the whole core runs on a single-threaded cooperative
//!   scheduler. There is no shared-memory concurrency and no locking; every
//!   match, fill and notification happens in one total order, which the
//!   match-events log and the final ranking rely on.
//! - **Integer money**: prices are integer cents aligned to a configured
//!   tick size, volumes are integer lots, and fee rounding is exact (taker
//!   charges round up, maker rebates round down), so accounts recompute
//!   bit-for-bit.
//! - **Per-session risk**: active order count, active volume, worst-case
//!   position projection and a sliding-window message-rate limit are
//!   enforced on every request.
//! - **Tick-driven**: a monotonic timer sequences scripted market events,
//!   book snapshots, coalesced trade-tick publication and account
//!   mark-to-market.
//!
//! ## Layout
//!
//! [`orderbook`] holds the books and matching engine; [`engine`] ties books,
//! sessions and risk checks together; [`execution`] and [`information`] are
//! the TCP and UDP edges; [`controller`] owns the match lifecycle. The
//! `exchange` binary loads a JSON configuration and runs one bounded match.

pub mod account;
pub mod competitor;
pub mod config;
pub mod controller;
pub mod engine;
pub mod execution;
pub mod information;
pub mod limiter;
pub mod manager;
pub mod market_events;
pub mod match_events;
pub mod messages;
pub mod orderbook;
pub mod prelude;
pub mod score_board;
pub mod timer;
pub mod types;

pub use account::Account;
pub use engine::Engine;
pub use limiter::FrequencyLimiter;
pub use manager::CompetitorManager;
pub use orderbook::{FeeSchedule, OrderBook, OrderBookError};
pub use types::{Instrument, Lifespan, Side};
