//! Configuration type definitions for Corewire
//!
//! All types implement serde traits for JSON serialization and have sensible defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::validator::Environment;

/// Main configuration struct for Corewire
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging output configuration
    pub logging: LoggingConfig,
    /// Health check aggregation settings
    pub health: HealthConfig,
    /// Startup dependency validation settings
    pub validator: ValidatorConfig,
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable tracing output.
    Pretty,
    /// Compact single-line output with a `component` field.
    #[default]
    Component,
    /// JSON lines for log aggregators.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Optional file to append JSON logs to.
    pub file: Option<String>,
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Component,
            file: None,
            level: "info".to_string(),
        }
    }
}

// ============================================================================
// Health Configuration
// ============================================================================

/// Health check aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Per-check timeout in milliseconds. A check that runs longer is unhealthy.
    pub timeout_ms: u64,
    /// Maximum number of health checks running at once.
    pub max_concurrent: usize,
}

impl HealthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_concurrent: 8,
        }
    }
}

// ============================================================================
// Validator Configuration
// ============================================================================

/// Startup dependency validation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Deployment environment. Development entries are only checked in
    /// `development` and `test`.
    pub environment: Environment,
    /// Manifest location used when the CLI is not given one.
    pub manifest_path: Option<String>,
}
