/*!
 * Configuration management for BenchLink.
 *
 * This module provides functionality to load, validate, and access
 * configuration settings for the registry, scan workers, event bus,
 * and remote proxy.
 */
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Top-level configuration for BenchLink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchlinkConfig {
    /// Adapter scan loop configuration
    #[serde(default)]
    pub scan: ScanConfig,

    /// Event bus configuration
    #[serde(default)]
    pub events: EventConfig,

    /// Remote proxy configuration
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Adapter scan loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Default scan period in milliseconds for adapters that do not
    /// specify their own
    #[serde(default = "default_scan_period_ms")]
    pub period_ms: u64,

    /// Upper bound on one `enumerate()` call in milliseconds
    #[serde(default = "default_enumerate_timeout_ms")]
    pub enumerate_timeout_ms: u64,

    /// How long a purged resource keeps its UUID reservation; a device
    /// reappearing with the same native id and identifying tuple
    /// inside this window gets its previous UUID back
    #[serde(default = "default_grace_window_ms")]
    pub grace_window_ms: u64,
}

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Per-subscriber event buffer capacity
    #[serde(default = "default_event_capacity")]
    pub channel_capacity: usize,
}

/// Remote proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Timeout applied to each RPC round-trip in milliseconds
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (trace, debug, info, warn, error, or a full
    /// EnvFilter directive)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl BenchlinkConfig {
    /// Load configuration from a TOML file with `BENCHLINK_*`
    /// environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());

        let config = ConfigLib::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix("BENCHLINK").separator("__"))
            .build()
            .map_err(|e| Error::config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| Error::config(e.to_string()))
    }

    /// Load configuration from environment overrides only
    pub fn from_env() -> Result<Self> {
        let config = ConfigLib::builder()
            .add_source(Environment::with_prefix("BENCHLINK").separator("__"))
            .build()
            .map_err(|e| Error::config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| Error::config(e.to_string()))
    }
}

impl ScanConfig {
    /// Scan period as a `Duration`
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// Enumerate timeout as a `Duration`
    pub fn enumerate_timeout(&self) -> Duration {
        Duration::from_millis(self.enumerate_timeout_ms)
    }

    /// Grace window as a `Duration`
    pub fn grace_window(&self) -> Duration {
        Duration::from_millis(self.grace_window_ms)
    }
}

impl RemoteConfig {
    /// RPC call timeout as a `Duration`
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl Default for BenchlinkConfig {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            events: EventConfig::default(),
            remote: RemoteConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            period_ms: default_scan_period_ms(),
            enumerate_timeout_ms: default_enumerate_timeout_ms(),
            grace_window_ms: default_grace_window_ms(),
        }
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_event_capacity(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_scan_period_ms() -> u64 {
    5000
}

fn default_enumerate_timeout_ms() -> u64 {
    2000
}

fn default_grace_window_ms() -> u64 {
    30_000
}

fn default_event_capacity() -> usize {
    1024
}

fn default_call_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// A shared configuration that can be cloned
#[derive(Debug, Clone)]
pub struct SharedConfig(Arc<BenchlinkConfig>);

impl SharedConfig {
    /// Wrap a configuration for sharing
    pub fn new(config: BenchlinkConfig) -> Self {
        Self(Arc::new(config))
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &BenchlinkConfig {
        &self.0
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(BenchlinkConfig::default())
    }
}

impl AsRef<BenchlinkConfig> for SharedConfig {
    fn as_ref(&self) -> &BenchlinkConfig {
        self.config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BenchlinkConfig::default();
        assert_eq!(config.scan.period(), Duration::from_secs(5));
        assert_eq!(config.scan.enumerate_timeout(), Duration::from_secs(2));
        assert_eq!(config.scan.grace_window(), Duration::from_secs(30));
        assert_eq!(config.events.channel_capacity, 1024);
        assert_eq!(config.remote.call_timeout(), Duration::from_secs(5));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_uses_field_defaults() {
        let parsed: BenchlinkConfig =
            toml::from_str("[scan]\nperiod_ms = 250\n").expect("valid config");
        assert_eq!(parsed.scan.period_ms, 250);
        assert_eq!(parsed.scan.grace_window_ms, default_grace_window_ms());
        assert_eq!(parsed.events.channel_capacity, default_event_capacity());
    }
}
