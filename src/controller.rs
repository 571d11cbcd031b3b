//! Controller: wires the components together and runs the match lifecycle.
//!
//! Startup order: execution server, information publisher, market events
//! reader and writers, then a market-open delay for competitors to connect
//! and log in, then the timer. Each tick replays due market events, flushes
//! coalesced trade ticks, publishes book snapshots and marks accounts.
//! When the script is exhausted the next tick stops the timer, sessions are
//! closed, the score board is written and the loop ends once the match
//! events writer has flushed.

use crate::config::{Config, ConfigError};
use crate::engine::Engine;
use crate::execution::{ExecutionServer, SessionEvent, LOGIN_TIMEOUT_SECONDS};
use crate::information::{InformationError, InformationPublisher};
use crate::market_events::{MarketEventsError, MarketEventsReader};
use crate::match_events::MatchEventsWriter;
use crate::score_board::ScoreBoardWriter;
use crate::timer::Timer;
use crate::types::Instrument;
use std::io;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::info;

/// Anything that prevents a match from starting or finishing cleanly.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    MarketEvents(#[from] MarketEventsError),
    #[error(transparent)]
    Information(#[from] InformationError),
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),
}

/// Run one complete match. Must be called from within a `LocalSet` on a
/// current-thread runtime; returns once both writers have flushed.
pub async fn run(config: Config) -> Result<(), ControllerError> {
    info!("starting the match");

    let exec_addr = config.execution.resolve("Execution.Host")?;
    let (match_sender, match_writer) = MatchEventsWriter::new(&config.engine.match_events_file);
    let mut engine = Engine::new(&config, match_sender)?;
    let mut reader = MarketEventsReader::load(&config.engine.market_data_file)?;
    let mut publisher = InformationPublisher::bind(&config.information).await?;
    let score_board = ScoreBoardWriter::new(&config.engine.score_board_file);

    let (event_sender, mut events) = mpsc::unbounded_channel::<SessionEvent>();
    let login_timeout = Duration::from_secs_f64(LOGIN_TIMEOUT_SECONDS / config.engine.speed);
    let server = ExecutionServer::bind(exec_addr, event_sender, login_timeout).await?;
    let server_handle = tokio::task::spawn_local(server.run());
    let writer_handle = tokio::task::spawn_local(match_writer.run());

    let mut timer = Timer::new(config.engine.tick_interval, config.engine.speed);
    let open_delay = tokio::time::sleep(Duration::from_secs_f64(
        config.engine.market_open_delay / config.engine.speed,
    ));
    tokio::pin!(open_delay);
    let mut market_open = false;
    let mut done = false;

    loop {
        tokio::select! {
            biased;
            _ = &mut open_delay, if !market_open => {
                market_open = true;
                info!("market open");
                timer.start();
            }
            tick = timer.tick(), if timer.is_running() => {
                let Some(tick) = tick else { continue };
                if done {
                    timer.shutdown(tick.now, "match complete");
                    break;
                }
                reader.replay(tick.tick_number, &mut engine, tick.now);
                if reader.is_finished() {
                    done = true;
                }
                flush_trade_ticks(&mut engine, &mut publisher).await?;
                let future_top = engine.future_book.top_levels();
                let etf_top = engine.etf_book.top_levels();
                publisher
                    .publish_snapshot(Instrument::Future, tick.tick_number, future_top)
                    .await?;
                publisher
                    .publish_snapshot(Instrument::Etf, tick.tick_number, etf_top)
                    .await?;
                engine.on_tick(tick.now);
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::Connected { session_id, sink } => {
                        engine.on_session_connected(session_id, sink);
                    }
                    SessionEvent::Message { session_id, message } => {
                        engine.on_message(session_id, message, timer.now());
                    }
                    SessionEvent::Disconnected { session_id } => {
                        engine.on_session_disconnected(session_id, timer.now());
                    }
                }
                flush_trade_ticks(&mut engine, &mut publisher).await?;
            }
        }
    }

    // Shutdown: stop accepting, freeze the books behind closed sessions,
    // write the ranking and let the match-events writer drain.
    server_handle.abort();
    engine.close_all_sessions(timer.now());
    let records = engine.finalize();
    score_board.write(&records).await?;
    drop(engine);
    if let Ok(result) = writer_handle.await {
        result?;
    }
    info!("match complete");
    Ok(())
}

/// Edge-triggered, coalesced trade-tick emission: at most one datagram per
/// book however many fills accumulated since the last flush.
async fn flush_trade_ticks(
    engine: &mut Engine,
    publisher: &mut InformationPublisher,
) -> io::Result<()> {
    for instrument in Instrument::ALL {
        let book = engine.book_mut(instrument);
        if book.take_traded() {
            if let Some(ticks) = book.drain_trade_ticks() {
                publisher.publish_trade_ticks(instrument, ticks).await?;
            }
        }
    }
    Ok(())
}
