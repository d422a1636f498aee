use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use common::config::DEFAULT_WATCHLIST_PATH;
use common::{Error, Result};

use crate::alert::AlertPolicy;
use crate::indicators::SupertrendIndicator;

/// Kline intervals accepted by the exchange.
pub const VALID_TIMEFRAMES: &[&str] = &[
    "1s", "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w",
    "1M",
];

/// Largest bar window a single klines request returns.
pub const MAX_LIMIT: usize = 1000;

/// One week.
pub const MAX_POLL_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Watchlist and indicator tunables (TOML).
///
/// Example `config/watchlist.toml`:
/// ```toml
/// symbols = ["BTC/USDT", "ETH/USDT"]
/// timeframe = "15m"
/// limit = 100
/// atr_length = 10
/// multiplier = 3.0
/// poll_interval_minutes = 15
/// alert_policy = "trend_change"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchlistConfig {
    /// Symbols in `BASE/QUOTE` form, processed in order each cycle.
    pub symbols: Vec<String>,
    /// Kline interval, e.g. "15m".
    pub timeframe: String,
    /// Number of most recent bars fetched per symbol.
    pub limit: usize,
    pub atr_length: usize,
    pub multiplier: f64,
    pub poll_interval_minutes: u64,
    /// Upper bound on each market-data or notification call.
    pub request_timeout_secs: u64,
    pub alert_policy: AlertPolicy,
    /// Run one cycle immediately at startup instead of waiting a full interval.
    pub run_on_startup: bool,
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            symbols: ["BTC/USDT", "ETH/USDT", "ICP/USDT", "BNB/USDT"]
                .into_iter()
                .map(String::from)
                .collect(),
            timeframe: "15m".to_string(),
            limit: 100,
            atr_length: 10,
            multiplier: 3.0,
            poll_interval_minutes: 15,
            request_timeout_secs: 10,
            alert_policy: AlertPolicy::default(),
            run_on_startup: false,
        }
    }
}

impl WatchlistConfig {
    /// Load from a TOML file.
    ///
    /// With `None`, the default path is tried and built-in defaults are used
    /// if it does not exist. An explicit path must exist.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p, true),
            None => (DEFAULT_WATCHLIST_PATH, false),
        };

        if !explicit && !Path::new(path).exists() {
            tracing::info!(path, "No watchlist file found, using built-in defaults");
            let cfg = Self::default();
            cfg.validate()?;
            return Ok(cfg);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read watchlist config at '{path}': {e}"))
        })?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("Invalid watchlist config at '{path}': {e}")))
    }

    /// Parse and validate TOML content.
    pub fn from_toml(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(Error::Config("symbols must not be empty".into()));
        }
        if let Some(bad) = self.symbols.iter().find(|s| s.trim().is_empty()) {
            return Err(Error::Config(format!("invalid symbol '{bad}'")));
        }
        if !VALID_TIMEFRAMES.contains(&self.timeframe.as_str()) {
            return Err(Error::Config(format!(
                "unsupported timeframe '{}'",
                self.timeframe
            )));
        }
        if !(2..=MAX_LIMIT).contains(&self.limit) {
            return Err(Error::Config(format!(
                "limit must be between 2 and {MAX_LIMIT}, got {}",
                self.limit
            )));
        }
        if !(1..=MAX_POLL_INTERVAL_MINUTES).contains(&self.poll_interval_minutes) {
            return Err(Error::Config(format!(
                "poll_interval_minutes must be between 1 and {MAX_POLL_INTERVAL_MINUTES}, got {}",
                self.poll_interval_minutes
            )));
        }
        if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(&self.request_timeout_secs) {
            return Err(Error::Config(format!(
                "request_timeout_secs must be between 1 and {MAX_REQUEST_TIMEOUT_SECS}, got {}",
                self.request_timeout_secs
            )));
        }
        self.indicator()
            .map(|_| ())
            .map_err(|e| Error::Config(e.to_string()))
    }

    pub fn indicator(&self) -> Result<SupertrendIndicator> {
        SupertrendIndicator::new(self.atr_length, self.multiplier)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_minutes.saturating_mul(60))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
