//! Typed configuration from environment variables or a TOML file.
//!
//! Every field has a default, so an empty environment yields a runnable
//! config. Malformed values fail fast with the offending key named.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::coordinator::CoordinatorConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum items held by the buffer.
    pub capacity: usize,
    pub producers: usize,
    pub consumers: usize,
    pub produce_delay_ms: u64,
    pub consume_delay_ms: u64,
    /// How long to run before stopping.
    pub run_secs: u64,
    /// How long units get to exit on their own after stop.
    pub grace_ms: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: 5,
            producers: 2,
            consumers: 2,
            produce_delay_ms: 1000,
            consume_delay_ms: 1500,
            run_secs: 10,
            grace_ms: 2000,
            log_level: "info".to_string(),
        }
    }
}

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    workq: Config,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            capacity: var_or("WORKQ_CAPACITY", defaults.capacity)?,
            producers: var_or("WORKQ_PRODUCERS", defaults.producers)?,
            consumers: var_or("WORKQ_CONSUMERS", defaults.consumers)?,
            produce_delay_ms: var_or("WORKQ_PRODUCE_DELAY_MS", defaults.produce_delay_ms)?,
            consume_delay_ms: var_or("WORKQ_CONSUME_DELAY_MS", defaults.consume_delay_ms)?,
            run_secs: var_or("WORKQ_RUN_SECS", defaults.run_secs)?,
            grace_ms: var_or("WORKQ_GRACE_MS", defaults.grace_ms)?,
            log_level: Self::log_level_from_env(),
        })
    }

    /// `LOG_LEVEL`, or `info` when unset. Never fails, so it can drive
    /// logging for commands that read no other settings.
    pub fn log_level_from_env() -> String {
        std::env::var("LOG_LEVEL").unwrap_or_else(|_| Self::default().log_level)
    }

    /// Load configuration from the `[workq]` table of a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let file: ConfigFile = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad config file {}: {e}", path.display())))?;
        Ok(file.workq)
    }

    /// Reject values no run can use.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidCapacity(self.capacity));
        }
        Ok(())
    }

    pub fn run_for(&self) -> Duration {
        Duration::from_secs(self.run_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            capacity: self.capacity,
            producers: self.producers,
            consumers: self.consumers,
            produce_delay: Duration::from_millis(self.produce_delay_ms),
            consume_delay: Duration::from_millis(self.consume_delay_ms),
        }
    }
}

fn var_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("environment variable {name}={raw:?}: {e}"))),
        Err(_) => Ok(default),
    }
}
