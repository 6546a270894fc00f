//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via BINDRPC_CONFIG)
//! 3. Environment variables

use bindrpc_protocol::{DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("BINDRPC_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::ParseError(_, msg) => ConfigError::ParseError(path.to_path_buf(), msg),
            other => other,
        })
    }

    /// Parses configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content)
            .map_err(|e| ConfigError::ParseError(PathBuf::from("<inline>"), e.to_string()))
    }

    /// Applies `BINDRPC_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary key lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.network.apply_overrides(&lookup);
        self.metrics.apply_overrides(&lookup);
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.read_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "read_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Seconds a connection may sit between frames before it is closed.
    pub idle_timeout_secs: u64,
    /// Seconds allowed for a whole frame once its first byte arrived.
    pub read_timeout_secs: u64,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Largest declared frame payload accepted (0 = unlimited).
    pub max_frame_bytes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            idle_timeout_secs: 300,
            read_timeout_secs: 30,
            max_connections: 1000,
            max_frame_bytes: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

impl NetworkConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(parsed) = lookup("BINDRPC_BIND").and_then(|v| v.parse().ok()) {
            self.bind_addr = parsed;
        }
        if let Some(secs) = lookup("BINDRPC_IDLE_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.idle_timeout_secs = secs;
        }
        if let Some(secs) = lookup("BINDRPC_READ_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.read_timeout_secs = secs;
        }
        if let Some(n) = lookup("BINDRPC_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
            self.max_connections = n;
        }
        if let Some(n) = lookup("BINDRPC_MAX_FRAME_BYTES").and_then(|v| v.parse().ok()) {
            self.max_frame_bytes = n;
        }
    }

    /// Returns idle timeout as Duration.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Returns read timeout as Duration.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics HTTP server.
    pub enabled: bool,
    /// Address to bind the metrics server to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 9090)),
        }
    }
}

impl MetricsConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(enabled) = lookup("BINDRPC_METRICS_ENABLED") {
            self.enabled = parse_flag(&enabled);
        }
        if let Some(parsed) = lookup("BINDRPC_METRICS_BIND").and_then(|v| v.parse().ok()) {
            self.bind_addr = parsed;
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    IoError(PathBuf, std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    ParseError(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.bind_addr.to_string(), "127.0.0.1:4044");
        assert_eq!(config.network.max_frame_bytes, DEFAULT_MAX_PAYLOAD_SIZE);
        assert!(!config.metrics.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = Config::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.network.bind_addr, config.network.bind_addr);
        assert_eq!(parsed.network.read_timeout_secs, config.network.read_timeout_secs);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml(
            "network:\n  bind_addr: \"0.0.0.0:5000\"\n  read_timeout_secs: 0\nmetrics:\n  enabled: true\n",
        )
        .unwrap();
        assert_eq!(config.network.bind_addr.port(), 5000);
        assert_eq!(config.network.idle_timeout_secs, 300);
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.bind_addr.port(), 9090);

        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "network:\n  max_connections: 7\n").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.network.max_connections, 7);

        std::fs::write(file.path(), "network: [not, a, map]\n").unwrap();
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(ref p, _) if p == file.path()));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/nonexistent/bindrpc.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(..)));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("BINDRPC_BIND", "0.0.0.0:6000"),
            ("BINDRPC_IDLE_TIMEOUT", "5"),
            ("BINDRPC_READ_TIMEOUT", "2"),
            ("BINDRPC_MAX_FRAME_BYTES", "1024"),
            ("BINDRPC_METRICS_ENABLED", "true"),
            ("BINDRPC_MAX_CONNECTIONS", "not-a-number"),
        ]);

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.network.bind_addr.port(), 6000);
        assert_eq!(config.network.idle_timeout(), Duration::from_secs(5));
        assert_eq!(config.network.read_timeout(), Duration::from_secs(2));
        assert_eq!(config.network.max_frame_bytes, 1024);
        // Unparseable values leave the previous setting alone
        assert_eq!(config.network.max_connections, 1000);
        assert!(config.metrics.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_read_timeout_rejected() {
        let mut config = Config::default();
        config.network.read_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
