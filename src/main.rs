//! The `exchange` binary: load configuration, run one match, exit.

use anyhow::Context;
use clap::Parser;
use exchange_sim::config::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "exchange", about = "Run one exchange simulator match")]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "exchange.json")]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;

    // Single-threaded by design: every exchange component shares one logical
    // thread, so event ordering is deterministic.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building runtime")?;
    let local = tokio::task::LocalSet::new();
    runtime
        .block_on(local.run_until(exchange_sim::controller::run(config)))
        .context("running the match")?;
    Ok(())
}
