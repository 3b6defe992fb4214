//! Container configuration.
//!
//! Defaults work out of the box; [`ContainerConfig::from_env`] overlays
//! `FERROUS_BOOT_*` environment variables for deployments. With the `config`
//! feature the configuration is serializable and can be read from JSON.

use std::env;
use std::time::Duration;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

/// Default priority of the built-in [`ServiceBroker`](crate::ServiceBroker).
pub const SERVICE_PRIORITY: i32 = -100;
/// Default priority of the built-in [`TickerBroker`](crate::TickerBroker).
pub const TICKER_PRIORITY: i32 = -99;

const ENV_VERBOSE: &str = "FERROUS_BOOT_VERBOSE";
const ENV_TICK_MIN_MS: &str = "FERROUS_BOOT_TICK_MIN_MS";
const ENV_SERVICE_PRIORITY: &str = "FERROUS_BOOT_SERVICE_PRIORITY";
const ENV_TICKER_PRIORITY: &str = "FERROUS_BOOT_TICKER_PRIORITY";

/// Ticker scheduling settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct TickerConfig {
    /// Intervals shorter than this are clamped up to it.
    pub min_interval: Duration,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self { min_interval: Duration::from_millis(1) }
    }
}

/// Container-wide configuration.
///
/// # Examples
///
/// ```rust
/// use ferrous_boot::{Container, ContainerConfig};
///
/// let config = ContainerConfig::default()
///     .verbose(true)
///     .service_priority(-10);
/// assert_eq!(config.service_priority, -10);
///
/// let container = Container::with_config(config);
/// assert!(!container.is_running());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct ContainerConfig {
    /// Installs a [`TracingObserver`](crate::TracingObserver).
    pub verbose: bool,
    pub ticker: TickerConfig,
    /// Priority used by [`ServiceBroker::from_config`](crate::ServiceBroker::from_config).
    pub service_priority: i32,
    /// Priority used by [`TickerBroker::from_config`](crate::TickerBroker::from_config).
    pub ticker_priority: i32,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            ticker: TickerConfig::default(),
            service_priority: SERVICE_PRIORITY,
            ticker_priority: TICKER_PRIORITY,
        }
    }
}

impl ContainerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn min_tick_interval(mut self, interval: Duration) -> Self {
        self.ticker.min_interval = interval;
        self
    }

    pub fn service_priority(mut self, priority: i32) -> Self {
        self.service_priority = priority;
        self
    }

    pub fn ticker_priority(mut self, priority: i32) -> Self {
        self.ticker_priority = priority;
        self
    }

    /// Defaults overlaid with `FERROUS_BOOT_*` environment variables.
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(verbose) = read_env::<bool>(ENV_VERBOSE) {
            config.verbose = verbose;
        }
        if let Some(ms) = read_env::<u64>(ENV_TICK_MIN_MS) {
            config.ticker.min_interval = Duration::from_millis(ms);
        }
        if let Some(priority) = read_env::<i32>(ENV_SERVICE_PRIORITY) {
            config.service_priority = priority;
        }
        if let Some(priority) = read_env::<i32>(ENV_TICKER_PRIORITY) {
            config.ticker_priority = priority;
        }
        config
    }

    /// Parses a JSON document; missing fields keep their defaults.
    #[cfg(feature = "config")]
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[cfg(feature = "config")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn read_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    let raw = raw.trim();
    let parsed = match raw.to_ascii_lowercase().as_str() {
        "1" | "yes" | "on" if key == ENV_VERBOSE => "true".parse().ok(),
        "0" | "no" | "off" if key == ENV_VERBOSE => "false".parse().ok(),
        _ => raw.parse().ok(),
    };
    if parsed.is_none() {
        tracing::warn!(key, value = raw, "ignoring unparsable configuration value");
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear() {
        for key in [ENV_VERBOSE, ENV_TICK_MIN_MS, ENV_SERVICE_PRIORITY, ENV_TICKER_PRIORITY] {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_defaults() {
        let config = ContainerConfig::default();
        assert!(!config.verbose);
        assert_eq!(config.service_priority, -100);
        assert_eq!(config.ticker_priority, -99);
        assert_eq!(config.ticker.min_interval, Duration::from_millis(1));
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear();
        env::set_var(ENV_VERBOSE, "yes");
        env::set_var(ENV_TICK_MIN_MS, "25");
        env::set_var(ENV_SERVICE_PRIORITY, "-7");
        let config = ContainerConfig::from_env();
        clear();

        assert!(config.verbose);
        assert_eq!(config.ticker.min_interval, Duration::from_millis(25));
        assert_eq!(config.service_priority, -7);
        assert_eq!(config.ticker_priority, TICKER_PRIORITY);
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_garbage() {
        clear();
        env::set_var(ENV_TICKER_PRIORITY, "high");
        let config = ContainerConfig::from_env();
        clear();
        assert_eq!(config, ContainerConfig::default());
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_json_partial() {
        let config = ContainerConfig::from_json(r#"{ "verbose": true }"#).unwrap();
        assert!(config.verbose);
        assert_eq!(config.service_priority, SERVICE_PRIORITY);

        let back = ContainerConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }
}
