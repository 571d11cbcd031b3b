//! Match event records and the CSV writer task.
//!
//! The engine pushes one record per fill into an unbounded channel, in the
//! exact order matches occur; the writer task drains the channel to disk and
//! exits, flushed, when the engine drops its sender at shutdown.

use crate::types::Instrument;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::info;

/// One executed match.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchEvent {
    /// Simulated time of the match in seconds.
    pub time: f64,
    pub instrument: Instrument,
    /// Maker team name; empty for scripted market liquidity.
    pub maker: String,
    /// Taker team name; empty for scripted market trades.
    pub taker: String,
    pub price: u32,
    pub volume: u32,
    /// Fee charged to the maker (negative = rebate).
    pub maker_fee: i64,
    /// Fee charged to the taker.
    pub taker_fee: i64,
}

/// Sender half handed to the engine.
pub type MatchEventSender = mpsc::UnboundedSender<MatchEvent>;

/// Writes match events to a CSV file as they occur.
pub struct MatchEventsWriter {
    path: PathBuf,
    receiver: mpsc::UnboundedReceiver<MatchEvent>,
}

impl MatchEventsWriter {
    /// Create the writer and the sender the engine feeds it through.
    #[must_use]
    pub fn new(path: &Path) -> (MatchEventSender, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            sender,
            Self {
                path: path.to_path_buf(),
                receiver,
            },
        )
    }

    /// Drain events to disk until every sender is gone, then flush. Run as a
    /// task on the local set; its completion signals the file is flushed.
    pub async fn run(mut self) -> std::io::Result<()> {
        let file = File::create(&self.path).await?;
        let mut out = BufWriter::new(file);
        out.write_all(b"time,instrument,maker,taker,price,volume,maker_fee,taker_fee\n")
            .await?;
        let mut written = 0u64;
        while let Some(event) = self.receiver.recv().await {
            let line = format!(
                "{:.6},{},{},{},{},{},{},{}\n",
                event.time,
                event.instrument.index(),
                event.maker,
                event.taker,
                event.price,
                event.volume,
                event.maker_fee,
                event.taker_fee,
            );
            out.write_all(line.as_bytes()).await?;
            written += 1;
        }
        out.flush().await?;
        info!(events = written, path = %self.path.display(), "match events flushed");
        Ok(())
    }
}
