//! Typed JSON configuration for the exchange binary.
//!
//! Key names mirror the configuration file exactly. Everything is validated
//! up front; a missing key, a mistyped value or an unresolvable host aborts
//! before the event loop starts.

use crate::orderbook::FeeSchedule;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fatal configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The file is not the expected JSON object.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A host name did not resolve.
    #[error("could not resolve {field} \"{value}\"")]
    Unresolvable {
        /// Which configuration field failed.
        field: &'static str,
        /// The host string as configured.
        value: String,
    },
}

/// Top-level configuration object.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(rename = "Engine")]
    pub engine: EngineConfig,
    #[serde(rename = "Execution")]
    pub execution: EndpointConfig,
    #[serde(rename = "Fees")]
    pub fees: FeesConfig,
    #[serde(rename = "Information")]
    pub information: InformationConfig,
    #[serde(rename = "Instrument")]
    pub instrument: InstrumentConfig,
    #[serde(rename = "Limits")]
    pub limits: LimitsConfig,
    /// Roster of team name to secret.
    #[serde(rename = "Traders")]
    pub traders: BTreeMap<String, String>,
    /// Optional heads-up display endpoint; accepted but unused.
    #[serde(rename = "Hud", default)]
    pub hud: Option<EndpointConfig>,
}

/// Match engine settings.
#[derive(Clone, Debug, Deserialize)]
pub struct EngineConfig {
    #[serde(rename = "MarketDataFile")]
    pub market_data_file: PathBuf,
    /// Seconds to wait for competitors to connect before the market opens.
    #[serde(rename = "MarketOpenDelay")]
    pub market_open_delay: f64,
    #[serde(rename = "MatchEventsFile")]
    pub match_events_file: PathBuf,
    #[serde(rename = "ScoreBoardFile")]
    pub score_board_file: PathBuf,
    /// Wall-clock speed factor; 2.0 runs the match twice as fast.
    #[serde(rename = "Speed")]
    pub speed: f64,
    /// Simulated seconds between ticks.
    #[serde(rename = "TickInterval")]
    pub tick_interval: f64,
}

/// A host/port pair.
#[derive(Clone, Debug, Deserialize)]
pub struct EndpointConfig {
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "Port")]
    pub port: u16,
}

impl EndpointConfig {
    /// Resolve to a socket address, failing fast on bad host names.
    pub fn resolve(&self, field: &'static str) -> Result<SocketAddr, ConfigError> {
        resolve_host(&self.host, self.port, field)
    }
}

/// Maker/taker fee rates as fractions of notional (maker may be negative).
#[derive(Clone, Debug, Deserialize)]
pub struct FeesConfig {
    #[serde(rename = "Maker")]
    pub maker: f64,
    #[serde(rename = "Taker")]
    pub taker: f64,
}

impl FeesConfig {
    /// The pre-scaled integer schedule used by the ETF book.
    #[must_use]
    pub fn schedule(&self) -> FeeSchedule {
        FeeSchedule::from_fractional(self.maker, self.taker)
    }
}

/// Information (market data) channel settings.
#[derive(Clone, Debug, Deserialize)]
pub struct InformationConfig {
    #[serde(rename = "MulticastAddress")]
    pub multicast_address: String,
    #[serde(rename = "Interface")]
    pub interface: String,
    #[serde(rename = "Port")]
    pub port: u16,
}

impl InformationConfig {
    /// Destination address datagrams are sent to.
    pub fn destination(&self) -> Result<SocketAddr, ConfigError> {
        resolve_host(&self.multicast_address, self.port, "Information.MulticastAddress")
    }

    /// Local interface address to bind.
    pub fn local(&self) -> Result<SocketAddr, ConfigError> {
        resolve_host(&self.interface, 0, "Information.Interface")
    }
}

/// Instrument parameters.
#[derive(Clone, Debug, Deserialize)]
pub struct InstrumentConfig {
    /// Half-width of the ETF price corridor around the FUTURE midpoint,
    /// as a fraction (0.002 = ±0.2%).
    #[serde(rename = "EtfClamp")]
    pub etf_clamp: f64,
    /// Tick size in cents. The file carries it as a number; it must be a
    /// positive integer.
    #[serde(rename = "TickSize")]
    pub tick_size: f64,
}

impl InstrumentConfig {
    /// Tick size as integer cents.
    pub fn tick_size_cents(&self) -> Result<u32, ConfigError> {
        let cents = self.tick_size;
        if cents < 1.0 || cents.fract() != 0.0 || cents > u32::MAX as f64 {
            return Err(ConfigError::Invalid(format!(
                "Instrument.TickSize must be a positive whole number of cents, got {cents}"
            )));
        }
        Ok(cents as u32)
    }

    /// Clamp half-width in parts per million.
    #[must_use]
    pub fn clamp_ppm(&self) -> u64 {
        (self.etf_clamp * 1e6).round() as u64
    }
}

/// Per-competitor limits.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct LimitsConfig {
    #[serde(rename = "ActiveOrderCountLimit")]
    pub active_order_count_limit: u32,
    #[serde(rename = "ActiveVolumeLimit")]
    pub active_volume_limit: u64,
    /// Sliding-window length in simulated seconds.
    #[serde(rename = "MessageFrequencyInterval")]
    pub message_frequency_interval: f64,
    /// Messages admitted per window.
    #[serde(rename = "MessageFrequencyLimit")]
    pub message_frequency_limit: usize,
    #[serde(rename = "PositionLimit")]
    pub position_limit: i64,
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde's type checks cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.engine.speed > 0.0) {
            return Err(ConfigError::Invalid("Engine.Speed must be positive".into()));
        }
        if !(self.engine.tick_interval > 0.0) {
            return Err(ConfigError::Invalid(
                "Engine.TickInterval must be positive".into(),
            ));
        }
        if self.engine.market_open_delay < 0.0 {
            return Err(ConfigError::Invalid(
                "Engine.MarketOpenDelay must not be negative".into(),
            ));
        }
        self.instrument.tick_size_cents()?;
        if self.instrument.etf_clamp < 0.0 {
            return Err(ConfigError::Invalid(
                "Instrument.EtfClamp must not be negative".into(),
            ));
        }
        if !(self.limits.message_frequency_interval > 0.0) {
            return Err(ConfigError::Invalid(
                "Limits.MessageFrequencyInterval must be positive".into(),
            ));
        }
        if self.limits.message_frequency_limit == 0 {
            return Err(ConfigError::Invalid(
                "Limits.MessageFrequencyLimit must be positive".into(),
            ));
        }
        if self.limits.position_limit <= 0 {
            return Err(ConfigError::Invalid(
                "Limits.PositionLimit must be positive".into(),
            ));
        }
        if self.traders.is_empty() {
            return Err(ConfigError::Invalid(
                "Traders must contain at least one team".into(),
            ));
        }
        for (team, secret) in &self.traders {
            if team.is_empty() || team.len() > 50 || secret.is_empty() || secret.len() > 50 {
                return Err(ConfigError::Invalid(format!(
                    "Traders entry \"{team}\": names and secrets must be 1..=50 bytes"
                )));
            }
        }
        self.execution.resolve("Execution.Host")?;
        self.information.destination()?;
        self.information.local()?;
        Ok(())
    }
}

fn resolve_host(host: &str, port: u16, field: &'static str) -> Result<SocketAddr, ConfigError> {
    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConfigError::Unresolvable {
            field,
            value: host.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const EXAMPLE: &str = r#"{
        "Engine": {
            "MarketDataFile": "data/market_data.csv",
            "MarketOpenDelay": 5.0,
            "MatchEventsFile": "match_events.csv",
            "ScoreBoardFile": "score_board.csv",
            "Speed": 1.0,
            "TickInterval": 0.25
        },
        "Execution": {"Host": "127.0.0.1", "Port": 12345},
        "Fees": {"Maker": -0.0001, "Taker": 0.0002},
        "Information": {"MulticastAddress": "239.255.1.1", "Interface": "127.0.0.1", "Port": 12346},
        "Instrument": {"EtfClamp": 0.002, "TickSize": 100.0},
        "Limits": {
            "ActiveOrderCountLimit": 10,
            "ActiveVolumeLimit": 200,
            "MessageFrequencyInterval": 1.0,
            "MessageFrequencyLimit": 50,
            "PositionLimit": 100
        },
        "Traders": {"TeamOne": "secret1"}
    }"#;

    #[test]
    fn parses_and_validates_example() {
        let config: Config = serde_json::from_str(EXAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.instrument.tick_size_cents().unwrap(), 100);
        assert_eq!(config.instrument.clamp_ppm(), 2_000);
        assert_eq!(config.fees.schedule().maker_ppm, -100);
        assert_eq!(config.fees.schedule().taker_ppm, 200);
        assert!(config.hud.is_none());
    }

    #[test]
    fn missing_key_is_a_parse_error() {
        let broken = EXAMPLE.replace("\"Fees\"", "\"NotFees\"");
        assert!(serde_json::from_str::<Config>(&broken).is_err());
    }

    #[test]
    fn fractional_tick_size_is_rejected() {
        let mut config: Config = serde_json::from_str(EXAMPLE).unwrap();
        config.instrument.tick_size = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_speed_is_rejected() {
        let mut config: Config = serde_json::from_str(EXAMPLE).unwrap();
        config.engine.speed = 0.0;
        assert!(config.validate().is_err());
    }
}
