//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Dispatch loop and channel settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Dispatch loop and channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Time a handler may run before its request is answered with an
    /// error response, in milliseconds.
    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,

    /// Time the host side waits for a response to one request, in
    /// milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Number of events buffered between host and engine.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl DispatchConfig {
    /// Returns the handler timeout as a [`Duration`].
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    /// Returns the host request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            handler_timeout_ms: default_handler_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_handler_timeout_ms() -> u64 {
    30_000
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_channel_capacity() -> usize {
    32
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Per-module level overrides, e.g. `mapbridge_runtime = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            filters: HashMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact single-line output.
    #[default]
    Compact,
    /// Default tracing format.
    Full,
    /// Multi-line human-friendly output.
    Pretty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.dispatch.handler_timeout(), Duration::from_secs(30));
        assert_eq!(config.dispatch.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.dispatch.channel_capacity, 32);
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: BridgeConfig =
            serde_json::from_str(r#"{ "dispatch": { "handler_timeout_ms": 100 } }"#).unwrap();
        assert_eq!(config.dispatch.handler_timeout_ms, 100);
        assert_eq!(config.dispatch.channel_capacity, 32);
        assert_eq!(config.logging.level, "info");
    }
}
