//! Price-time-priority order books and their matching engine.

mod book;
mod error;
mod fees;
mod matching;
mod order;

pub use book::{Level, OrderBook, TopLevels};
pub use error::OrderBookError;
pub use fees::FeeSchedule;
pub use matching::{AmendReport, CancelReport, Fill, InsertReport};
pub use order::{Order, OrderArena, OrderRef, Owner};
