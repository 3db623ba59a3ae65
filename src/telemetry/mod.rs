//! Logging initialization.
//!
//! Sets up a tracing-subscriber registry with an env filter and a fmt layer.
//! `RUST_LOG` wins over the configured level when set.

pub mod work;

use crate::error::{Error, Result};

/// Configuration for telemetry initialization.
pub struct TelemetryConfig {
    /// Filter directive used when `RUST_LOG` is unset (e.g. "info", "workq=debug").
    pub log_level: String,
    /// Use the compact fmt layout instead of the full one.
    pub compact: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            compact: false,
        }
    }
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the configured filter does not parse or a global
/// subscriber was already set.
pub fn init_telemetry(config: TelemetryConfig) -> Result<()> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .map_err(|e| Error::Config(format!("bad log level '{}': {e}", config.log_level)))?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let init = if config.compact {
        registry
            .with(tracing_subscriber::fmt::layer().compact().with_thread_names(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_thread_names(true))
            .try_init()
    };

    init.map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))
}
