//! Information publisher: market data fan-out over UDP.
//!
//! Sends `ORDER_BOOK_UPDATE` snapshots for both books on every timer tick and
//! `TRADE_TICKS` datagrams when a book reports trading activity. Trade-tick
//! emission is edge triggered and coalesced: however many fills a batch
//! produced, a book drains to at most one datagram. Sequence numbers are per
//! instrument, starting at 1, with no gaps; receivers use them to detect
//! loss.

use crate::config::{ConfigError, InformationConfig};
use crate::messages::{encode_info, InfoMessage};
use crate::orderbook::TopLevels;
use crate::types::Instrument;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{info, trace};

/// Publisher startup failures.
#[derive(Debug, Error)]
pub enum InformationError {
    /// Bad address configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The datagram endpoint could not be created.
    #[error("failed to bind information endpoint: {0}")]
    Bind(#[source] io::Error),
}

/// Owns the datagram endpoint and the per-instrument sequence counters.
pub struct InformationPublisher {
    socket: UdpSocket,
    destination: SocketAddr,
    sequences: [u32; Instrument::COUNT],
}

impl InformationPublisher {
    /// Bind the local interface and prepare the destination (multicast or
    /// broadcast) address.
    pub async fn bind(config: &InformationConfig) -> Result<Self, InformationError> {
        let destination = config.destination()?;
        let local = config.local()?;
        let socket = UdpSocket::bind(local).await.map_err(InformationError::Bind)?;
        if !destination.ip().is_multicast() {
            socket.set_broadcast(true).map_err(InformationError::Bind)?;
        }
        let bound = socket.local_addr().map_err(InformationError::Bind)?;
        info!(%destination, local = %bound, "information channel established");
        Ok(Self {
            socket,
            destination,
            sequences: [1; Instrument::COUNT],
        })
    }

    /// Send one top-of-book snapshot.
    pub async fn publish_snapshot(
        &mut self,
        instrument: Instrument,
        tick_number: u32,
        levels: TopLevels,
    ) -> io::Result<()> {
        let datagram = encode_info(&InfoMessage::OrderBookUpdate {
            instrument,
            tick_number,
            levels,
        });
        self.socket.send_to(&datagram, self.destination).await?;
        trace!(%instrument, tick_number, "order book update sent");
        Ok(())
    }

    /// Send one drained trade-tick aggregate, consuming the next sequence
    /// number for the instrument.
    pub async fn publish_trade_ticks(
        &mut self,
        instrument: Instrument,
        levels: TopLevels,
    ) -> io::Result<()> {
        let sequence_number = self.sequences[instrument.index()];
        self.sequences[instrument.index()] += 1;
        let datagram = encode_info(&InfoMessage::TradeTicks {
            instrument,
            sequence_number,
            levels,
        });
        self.socket.send_to(&datagram, self.destination).await?;
        trace!(%instrument, sequence_number, "trade ticks sent");
        Ok(())
    }
}
