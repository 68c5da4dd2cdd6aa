//! Configuration management for Corewire
//!
//! This module provides configuration loading and global state management.
//! Configuration is loaded from `~/.corewire/config.json` with environment variable overrides.

mod types;

pub use types::*;

use crate::error::{CorewireError, Result};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};

/// Global configuration instance
static CONFIG: OnceCell<RwLock<Config>> = OnceCell::new();

impl Config {
    /// Returns the Corewire configuration directory path (~/.corewire)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".corewire")
    }

    /// Returns the path to the config file (~/.corewire/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    /// Environment variables can override config values using the pattern:
    /// `COREWIRE_SECTION_KEY`
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides()?;

        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables follow the pattern: COREWIRE_SECTION_KEY
    fn apply_env_overrides(&mut self) -> Result<()> {
        // Logging
        if let Ok(val) = std::env::var("COREWIRE_LOGGING_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("COREWIRE_LOGGING_FORMAT") {
            self.logging.format = serde_json::from_value(serde_json::Value::String(val.clone()))
                .map_err(|_| CorewireError::Config(format!("unknown log format '{}'", val)))?;
        }
        if let Ok(val) = std::env::var("COREWIRE_LOGGING_FILE") {
            self.logging.file = Some(val);
        }

        // Health
        if let Ok(val) = std::env::var("COREWIRE_HEALTH_TIMEOUT_MS") {
            if let Ok(v) = val.parse() {
                self.health.timeout_ms = v;
            }
        }
        if let Ok(val) = std::env::var("COREWIRE_HEALTH_MAX_CONCURRENT") {
            if let Ok(v) = val.parse() {
                self.health.max_concurrent = v;
            }
        }

        // Validator
        if let Ok(val) = std::env::var("COREWIRE_ENV") {
            self.validator.environment = val.parse()?;
        }
        if let Ok(val) = std::env::var("COREWIRE_VALIDATOR_MANIFEST_PATH") {
            self.validator.manifest_path = Some(val);
        }

        Ok(())
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::path())
    }

    /// Save configuration to a specific path.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Initialize the global configuration.
    ///
    /// Later calls are ignored; the first loaded configuration wins.
    pub fn init_global(config: Config) {
        let _ = CONFIG.set(RwLock::new(config));
    }

    /// Snapshot of the global configuration, or defaults if never initialized.
    pub fn global() -> Config {
        CONFIG
            .get()
            .map(|lock| lock.read().clone())
            .unwrap_or_default()
    }

    /// Replace the global configuration (no-op if never initialized).
    pub fn update_global(config: Config) {
        if let Some(lock) = CONFIG.get() {
            *lock.write() = config;
        }
    }
}
