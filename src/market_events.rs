//! Scripted market events: loader and tick-driven replay.
//!
//! The script is a CSV of `(tick, instrument, event_type, price, volume)`
//! rows sorted by tick. Each tick the reader applies every event whose tick
//! has been reached, mutating the books as the market. A malformed row is a
//! fatal startup error; the match never starts on a bad script.

use crate::engine::Engine;
use crate::types::Instrument;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

/// What a scripted event does to its book.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MarketEventKind {
    /// Add market liquidity on the bid side.
    InsertBidLevel,
    /// Add market liquidity on the ask side.
    InsertAskLevel,
    /// Aggress whichever side the price crosses.
    Trade,
    /// Withdraw the market's liquidity at a price.
    RemoveLevel,
}

impl FromStr for MarketEventKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT_BID_LEVEL" => Ok(MarketEventKind::InsertBidLevel),
            "INSERT_ASK_LEVEL" => Ok(MarketEventKind::InsertAskLevel),
            "TRADE" => Ok(MarketEventKind::Trade),
            "REMOVE_LEVEL" => Ok(MarketEventKind::RemoveLevel),
            _ => Err(()),
        }
    }
}

/// One scripted event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarketEvent {
    /// Tick at which the event fires.
    pub tick: u32,
    pub instrument: Instrument,
    pub kind: MarketEventKind,
    pub price: u32,
    pub volume: u32,
}

/// Script loading failures; all fatal before the event loop starts.
#[derive(Debug, Error)]
pub enum MarketEventsError {
    /// The script file could not be read.
    #[error("failed to read market data file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A row did not parse.
    #[error("market data file {path} line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// Replays the script against the engine at tick boundaries.
#[derive(Debug)]
pub struct MarketEventsReader {
    events: Vec<MarketEvent>,
    next: usize,
}

impl MarketEventsReader {
    /// Load and parse the whole script. An optional header row is skipped.
    pub fn load(path: &Path) -> Result<Self, MarketEventsError> {
        let contents = std::fs::read_to_string(path).map_err(|source| MarketEventsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut events = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            // Header rows start with a non-numeric first field.
            if index == 0 && line.split(',').next().is_some_and(|f| f.trim().parse::<u32>().is_err())
            {
                continue;
            }
            let event = parse_row(line).map_err(|message| MarketEventsError::Parse {
                path: path.to_path_buf(),
                line: index + 1,
                message,
            })?;
            events.push(event);
        }
        info!(events = events.len(), path = %path.display(), "market data loaded");
        Ok(Self { events, next: 0 })
    }

    /// Build a reader from in-memory events (tests).
    #[must_use]
    pub fn from_events(events: Vec<MarketEvent>) -> Self {
        Self { events, next: 0 }
    }

    /// Apply every event scheduled at or before `current_tick`. Returns the
    /// number of events applied.
    pub fn replay(&mut self, current_tick: u32, engine: &mut Engine, now: f64) -> usize {
        let start = self.next;
        while let Some(event) = self.events.get(self.next) {
            if event.tick > current_tick {
                break;
            }
            engine.apply_market_event(event, now);
            self.next += 1;
        }
        let applied = self.next - start;
        if applied > 0 {
            debug!(tick = current_tick, applied, "market events replayed");
        }
        applied
    }

    /// True once every event has been applied; signals match end.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.next >= self.events.len()
    }
}

fn parse_row(line: &str) -> Result<MarketEvent, String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 5 {
        return Err(format!("expected 5 fields, got {}", fields.len()));
    }
    let tick = parse_integer(fields[0], "tick")?;
    let instrument_raw = parse_integer(fields[1], "instrument")?;
    let instrument = u8::try_from(instrument_raw)
        .ok()
        .and_then(Instrument::from_wire)
        .ok_or_else(|| format!("bad instrument {}", fields[1]))?;
    let kind = MarketEventKind::from_str(fields[2])
        .map_err(|_| format!("bad event type {:?}", fields[2]))?;
    let price = parse_integer(fields[3], "price")?;
    let volume = parse_integer(fields[4], "volume")?;
    Ok(MarketEvent {
        tick,
        instrument,
        kind,
        price,
        volume,
    })
}

/// Accept plain integers and float spellings of integers ("100" or "100.0").
fn parse_integer(field: &str, name: &str) -> Result<u32, String> {
    if let Ok(value) = field.parse::<u32>() {
        return Ok(value);
    }
    match field.parse::<f64>() {
        Ok(value) if value.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&value) => {
            Ok(value as u32)
        }
        _ => Err(format!("bad {name} {field:?}")),
    }
}
