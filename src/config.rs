use crate::deposit::SettlementConfig;
use crate::error::{Error, Result};
use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Default number of batch worker threads
pub const DEFAULT_WORKERS: usize = 4;

/// Configuration for the tenancy-settlement CLI and engine
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory path (default: `.tenancy-settlement/` in current directory)
    pub data_dir: PathBuf,

    /// Output format: "human" (default) or "json"
    pub output_format: String,

    /// Log level: "info", "debug", "warn", "error" (default: "info")
    pub log_level: String,

    /// Late fee per day past the planned move-out date.
    ///
    /// Unset by default. Settling a late move-out fails until one is configured.
    pub daily_late_rate: Option<Decimal>,

    /// Worker threads for batch runs
    pub workers: usize,
}

impl Config {
    /// Create a new config with defaults
    pub fn new() -> Self {
        let data_dir = env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".tenancy-settlement");

        Config {
            data_dir,
            output_format: "human".to_string(),
            log_level: "info".to_string(),
            daily_late_rate: None,
            workers: DEFAULT_WORKERS,
        }
    }

    /// Create config with custom data directory
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Config {
            data_dir,
            ..Config::new()
        }
    }

    pub fn get_data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn set_data_dir(&mut self, dir: PathBuf) {
        self.data_dir = dir;
    }

    pub fn get_output_format(&self) -> &str {
        &self.output_format
    }

    /// Set output format ("human" or "json")
    pub fn set_output_format(&mut self, format: String) {
        self.output_format = format;
    }

    pub fn get_log_level(&self) -> &str {
        &self.log_level
    }

    pub fn set_log_level(&mut self, level: String) {
        self.log_level = level;
    }

    pub fn set_daily_late_rate(&mut self, rate: Decimal) {
        self.daily_late_rate = Some(rate);
    }

    pub fn set_workers(&mut self, workers: usize) {
        self.workers = workers.max(1);
    }

    /// Get repository snapshot path
    pub fn get_snapshot_path(&self) -> PathBuf {
        self.data_dir.join("snapshot.json")
    }

    /// Engine parameters derived from this config
    pub fn settlement_config(&self) -> SettlementConfig {
        SettlementConfig {
            daily_late_rate: self.daily_late_rate,
        }
    }

    /// Load config from environment variables
    ///
    /// Environment variables:
    /// - `TENANCY_SETTLEMENT_DATA_DIR`: override data directory
    /// - `TENANCY_SETTLEMENT_OUTPUT_FORMAT`: "human" or "json"
    /// - `TENANCY_SETTLEMENT_LOG_LEVEL`: log level
    /// - `TENANCY_SETTLEMENT_DAILY_LATE_RATE`: decimal late fee per day
    /// - `TENANCY_SETTLEMENT_WORKERS`: batch worker threads
    pub fn from_env() -> Result<Self> {
        let mut config = Config::new();

        if let Ok(dir) = env::var("TENANCY_SETTLEMENT_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Ok(format) = env::var("TENANCY_SETTLEMENT_OUTPUT_FORMAT") {
            config.output_format = format;
        }

        if let Ok(level) = env::var("TENANCY_SETTLEMENT_LOG_LEVEL") {
            config.log_level = level;
        }

        if let Ok(rate) = env::var("TENANCY_SETTLEMENT_DAILY_LATE_RATE") {
            config.daily_late_rate = Some(parse_rate(&rate)?);
        }

        if let Ok(workers) = env::var("TENANCY_SETTLEMENT_WORKERS") {
            let n: usize = workers.trim().parse().map_err(|_| {
                Error::InvalidInput(format!("TENANCY_SETTLEMENT_WORKERS is not a number: {}", workers))
            })?;
            config.set_workers(n);
        }

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}

/// Parse a non-negative decimal rate.
pub fn parse_rate(s: &str) -> Result<Decimal> {
    let rate = Decimal::from_str(s.trim())
        .map_err(|e| Error::InvalidInput(format!("Invalid daily late rate {:?}: {}", s, e)))?;
    if rate.is_sign_negative() && !rate.is_zero() {
        return Err(Error::InvalidInput(format!("Negative daily late rate {}", rate)));
    }
    Ok(rate)
}
