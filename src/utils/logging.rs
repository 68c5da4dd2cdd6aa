//! Logging initialization for Corewire.
//!
//! Supports three formats:
//! - `pretty`: multi-line human-readable output
//! - `component`: compact single-line output; the [`log_component!`] macro adds a
//!   `component` field for per-subsystem filtering
//! - `json`: JSON lines for log aggregators, optionally appended to a file
//!
//! Events go to stderr so command output on stdout stays machine-readable.

use std::fs::OpenOptions;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{CorewireError, Result};

/// Build the event filter. `RUST_LOG` wins over the configured level.
pub fn build_filter(cfg: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level))
}

/// Install the global tracing subscriber.
///
/// Returns `Ok(false)` if a subscriber was already installed, which keeps
/// repeated calls (tests, embedded use) harmless.
pub fn init_logging(cfg: &LoggingConfig) -> Result<bool> {
    let filter = build_filter(cfg);

    let installed = match (cfg.format, &cfg.file) {
        (LogFormat::Json, Some(path)) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| CorewireError::Config(format!("cannot open log file {}: {}", path, e)))?;
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(Arc::new(file))
                .try_init()
                .is_ok()
        }
        (LogFormat::Json, None) => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok(),
        (LogFormat::Pretty, _) => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok(),
        (LogFormat::Component, _) => tracing_subscriber::fmt()
            .compact()
            .with_target(true)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok(),
    };
    Ok(installed)
}

/// Emit a component-tagged tracing event.
///
/// ```
/// # use corewire::log_component;
/// log_component!(info, "lifecycle", "services started");
/// log_component!(warn, "health", "slow probe", elapsed_ms = 4200u64);
/// ```
#[macro_export]
macro_rules! log_component {
    ($level:ident, $component:expr, $msg:expr) => {
        tracing::$level!(component = $component, $msg)
    };
    ($level:ident, $component:expr, $msg:expr, $($key:ident = $val:expr),+ $(,)?) => {
        tracing::$level!(component = $component, $($key = $val,)+ $msg)
    };
}
