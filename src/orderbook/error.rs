//! Order book error types.

use crate::types::Side;
use thiserror::Error;

/// Errors raised by order book operations.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum OrderBookError {
    /// The handle did not resolve to an alive order.
    #[error("order not found")]
    OrderNotFound,

    /// Order price is zero or not a multiple of the book's tick size.
    #[error("invalid price: {price} is not a positive multiple of tick size {tick_size}")]
    InvalidPrice {
        /// The rejected price.
        price: u32,
        /// The book's tick size.
        tick_size: u32,
    },

    /// Order volume is zero.
    #[error("invalid volume: {volume}")]
    InvalidVolume {
        /// The rejected volume.
        volume: u32,
    },

    /// Amend asked for more volume than the order originally had.
    #[error("amend may not increase volume: {requested} > {original}")]
    AmendVolumeIncrease {
        /// The requested new volume.
        requested: u32,
        /// The order's original volume.
        original: u32,
    },

    /// A market trade event did not cross either side of the book.
    #[error("market trade at {price} crosses neither side ({side} attempted)")]
    TradeDoesNotCross {
        /// The scripted trade price.
        price: u32,
        /// The side that was probed.
        side: Side,
    },
}
