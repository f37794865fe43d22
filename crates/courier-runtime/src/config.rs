//! Configuration schema and loader.
//!
//! Configuration is layered with figment (lowest to highest priority):
//!
//! 1. Built-in defaults
//! 2. `courier.toml` in the working directory (or an explicit file)
//! 3. Environment variables (`COURIER_*`, `__` as section separator)
//! 4. Programmatic overrides
//!
//! # Environment Variable Mapping
//!
//! - `COURIER_NAME=hubert` → `name = "hubert"`
//! - `COURIER_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `COURIER_ADAPTER__AUTO_RECONNECT=false` → `adapter.auto_reconnect = false`
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new().file("config/courier.toml").load()?;
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use tracing::debug;

use courier_adapter_rtm::RtmConfig;

use crate::error::{ConfigError, ConfigResult};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    /// The robot's name, matched by `respond` listeners.
    pub name: String,

    /// Short alias also accepted by `respond` listeners.
    pub alias: Option<String>,

    /// Logging settings.
    pub logging: LoggingConfig,

    /// Command queue settings.
    pub queue: QueueConfig,

    /// Adapter settings.
    pub adapter: RtmConfig,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            name: "courier".to_string(),
            alias: None,
            logging: LoggingConfig::default(),
            queue: QueueConfig::default(),
            adapter: RtmConfig::default(),
        }
    }
}

/// Command queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Drain period of the dispatch loop, in milliseconds.
    pub drain_interval_ms: u64,

    /// Queue depth beyond which enqueues log a warning.
    pub soft_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            drain_interval_ms: 1000,
            soft_limit: 1024,
        }
    }
}

impl QueueConfig {
    /// The drain period as a [`Duration`].
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

/// Log level (trace, debug, info, warn, error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// The level as a filter directive string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line compact output.
    #[default]
    Compact,
    /// Default multi-field output.
    Full,
    /// Multi-line human-oriented output.
    Pretty,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level.
    pub level: LogLevel,

    /// Output format.
    pub format: LogFormat,

    /// Per-module level overrides, e.g. `courier_core = "debug"`.
    pub filters: HashMap<String, LogLevel>,
}

// =============================================================================
// Loader
// =============================================================================

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<CourierConfig> {
    ConfigLoader::new().load()
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    config_file: Option<PathBuf>,
    load_env: bool,
    overrides: Figment,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader reading `courier.toml` and `COURIER_*` variables.
    pub fn new() -> Self {
        Self {
            config_file: None,
            load_env: true,
            overrides: Figment::new(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Disables the environment variable layer.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges programmatic overrides at the highest priority.
    pub fn merge(mut self, config: CourierConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    /// Loads and returns the configuration.
    pub fn load(self) -> ConfigResult<CourierConfig> {
        let mut figment = Figment::from(Serialized::defaults(CourierConfig::default()));

        match &self.config_file {
            Some(path) => figment = figment.merge(Toml::file(path)),
            None => figment = figment.merge(Toml::file("courier.toml")),
        }
        if self.load_env {
            figment = figment.merge(Env::prefixed("COURIER_").split("__"));
        }
        figment = figment.merge(self.overrides);

        let config: CourierConfig = figment
            .extract()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        debug!(
            name = %config.name,
            level = %config.logging.level,
            "configuration loaded"
        );
        Ok(config)
    }
}
