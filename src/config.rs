//! Configuration module for the weathermap poller.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Poll interval used when neither the data source nor the environment sets one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the read API (default: 8080)
    pub http_port: u16,
    /// Directory holding the topology documents (default: "maps")
    pub maps_dir: PathBuf,
    /// Poll interval for data sources that do not set their own (default: 3s)
    pub default_poll_interval: Duration,
    /// Timeout of a single SNMP GET (default: 2s)
    pub snmp_timeout: Duration,
    /// Tick of the shared synthetic traffic generator (default: 1s)
    pub mock_tick: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            maps_dir: PathBuf::from("maps"),
            default_poll_interval: DEFAULT_POLL_INTERVAL,
            snmp_timeout: Duration::from_secs(2),
            mock_tick: Duration::from_secs(1),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `WEATHERMAP_HTTP_PORT`: HTTP port (default: 8080)
    /// - `WEATHERMAP_MAPS_DIR`: topology directory (default: "maps")
    /// - `WEATHERMAP_POLL_INTERVAL`: default poll interval in seconds (default: 3)
    /// - `WEATHERMAP_SNMP_TIMEOUT_MS`: SNMP request timeout in milliseconds (default: 2000)
    /// - `WEATHERMAP_MOCK_TICK_MS`: synthetic generator tick in milliseconds (default: 1000)
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port) = lookup("WEATHERMAP_HTTP_PORT").and_then(|s| s.parse().ok()) {
            cfg.http_port = port;
        }

        if let Some(dir) = lookup("WEATHERMAP_MAPS_DIR") {
            cfg.maps_dir = PathBuf::from(dir);
        }

        if let Some(secs) = parse_positive(lookup("WEATHERMAP_POLL_INTERVAL")) {
            cfg.default_poll_interval = Duration::from_secs(secs);
        }

        if let Some(ms) = parse_positive(lookup("WEATHERMAP_SNMP_TIMEOUT_MS")) {
            cfg.snmp_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_positive(lookup("WEATHERMAP_MOCK_TICK_MS")) {
            cfg.mock_tick = Duration::from_millis(ms);
        }

        cfg
    }

    /// Override the topology directory, e.g. from the first CLI argument.
    pub fn with_maps_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.maps_dir = dir.into();
        self
    }
}

fn parse_positive(value: Option<String>) -> Option<u64> {
    value.and_then(|s| s.trim().parse::<u64>().ok()).filter(|v| *v > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.maps_dir, PathBuf::from("maps"));
        assert_eq!(cfg.default_poll_interval, Duration::from_secs(3));
        assert_eq!(cfg.snmp_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("WEATHERMAP_HTTP_PORT", "9090"),
            ("WEATHERMAP_MAPS_DIR", "/etc/weathermap"),
            ("WEATHERMAP_POLL_INTERVAL", "10"),
            ("WEATHERMAP_SNMP_TIMEOUT_MS", "500"),
        ]
        .into_iter()
        .collect();

        let cfg = ServerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.http_port, 9090);
        assert_eq!(cfg.maps_dir, PathBuf::from("/etc/weathermap"));
        assert_eq!(cfg.default_poll_interval, Duration::from_secs(10));
        assert_eq!(cfg.snmp_timeout, Duration::from_millis(500));
        assert_eq!(cfg.mock_tick, Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let cfg = ServerConfig::from_lookup(|k| match k {
            "WEATHERMAP_HTTP_PORT" => Some("not-a-port".to_string()),
            "WEATHERMAP_POLL_INTERVAL" => Some("0".to_string()),
            _ => None,
        });
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.default_poll_interval, Duration::from_secs(3));
    }
}
