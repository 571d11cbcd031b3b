//! Prelude re-exporting the commonly used exchange types.
//!
//! ```rust
//! use exchange_sim::prelude::*;
//! ```

pub use crate::account::Account;
pub use crate::competitor::{CloseReason, Competitor, LoginState, RejectReason, SessionOrder};
pub use crate::config::Config;
pub use crate::engine::Engine;
pub use crate::limiter::FrequencyLimiter;
pub use crate::manager::{CompetitorManager, LoginError};
pub use crate::market_events::{MarketEvent, MarketEventKind, MarketEventsReader};
pub use crate::match_events::{MatchEvent, MatchEventsWriter};
pub use crate::messages::{ClientMessage, InfoMessage, ServerMessage};
pub use crate::orderbook::{FeeSchedule, OrderBook, OrderBookError, TopLevels};
pub use crate::score_board::{ScoreBoardWriter, ScoreRecord};
pub use crate::timer::{Timer, TimerTick};
pub use crate::types::{Instrument, Lifespan, SessionId, Side, TOP_LEVEL_COUNT};
