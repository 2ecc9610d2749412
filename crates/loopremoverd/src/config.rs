//! Configuration file support for loopremoverd
//!
//! Loads and validates loopremoverd configuration from TOML files.
//! Default location: /etc/sonic/loopremoverd.toml

use crate::error::{LoopRemoverError, Result};
use crate::tables::constants::{DEFAULT_HOST_LINK_MARKER, DEFAULT_TOPOLOGY_ID};
use crate::writer::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/loopremoverd.toml";

/// Topology processing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Topology instance whose links are managed
    #[serde(default = "default_topology_id")]
    pub topology_id: String,

    /// Debounce delay before a refresh, in milliseconds
    #[serde(default = "default_graph_refresh_delay")]
    pub graph_refresh_delay_ms: u64,

    /// How many times a pending refresh may be pushed back by new events
    #[serde(default = "default_max_reschedules")]
    pub max_reschedules: u32,

    /// Substring of link ids that marks host attachment links
    #[serde(default = "default_host_link_marker")]
    pub host_link_marker: String,
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Redis host
    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    /// Redis port
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,

    /// Redis database number for APPL_DB
    #[serde(default = "default_appl_db")]
    pub appl_db: i64,

    /// Redis database number for STATE_DB
    #[serde(default = "default_state_db")]
    pub state_db: i64,
}

/// Store writer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Commit attempts per refresh, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between commit attempts in milliseconds
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

/// Topology feed configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Link table poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

/// Complete loopremoverd configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopRemoverConfig {
    #[serde(default)]
    pub topology: TopologyConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub writer: WriterConfig,

    #[serde(default)]
    pub feed: FeedConfig,
}

// Default functions
fn default_topology_id() -> String {
    DEFAULT_TOPOLOGY_ID.to_string()
}

fn default_graph_refresh_delay() -> u64 {
    1000
}

fn default_max_reschedules() -> u32 {
    10
}

fn default_host_link_marker() -> String {
    DEFAULT_HOST_LINK_MARKER.to_string()
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_appl_db() -> i64 {
    0
}

fn default_state_db() -> i64 {
    6
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    100
}

fn default_poll_interval() -> u64 {
    1000
}

// Default implementations
impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            topology_id: default_topology_id(),
            graph_refresh_delay_ms: default_graph_refresh_delay(),
            max_reschedules: default_max_reschedules(),
            host_link_marker: default_host_link_marker(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
            appl_db: default_appl_db(),
            state_db: default_state_db(),
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl LoopRemoverConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|source| LoopRemoverError::ConfigParse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(LoopRemoverError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> Result<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| {
            LoopRemoverError::invalid_config("config", format!("failed to serialize: {e}"))
        })?;

        fs::write(path, content).map_err(|source| LoopRemoverError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get debounce delay as Duration
    pub fn graph_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.topology.graph_refresh_delay_ms)
    }

    /// Get feed poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.feed.poll_interval_ms)
    }

    /// Writer retry policy
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.writer.max_attempts,
            backoff: Duration::from_millis(self.writer.retry_backoff_ms),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.topology.topology_id.trim().is_empty() {
            return Err(LoopRemoverError::invalid_config(
                "topology.topology_id",
                "must not be empty",
            ));
        }

        if self.database.redis_port == 0 {
            return Err(LoopRemoverError::invalid_config(
                "database.redis_port",
                "must be > 0",
            ));
        }

        if self.writer.max_attempts == 0 {
            return Err(LoopRemoverError::invalid_config(
                "writer.max_attempts",
                "must be > 0",
            ));
        }

        if self.feed.poll_interval_ms == 0 {
            return Err(LoopRemoverError::invalid_config(
                "feed.poll_interval_ms",
                "must be > 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = LoopRemoverConfig::default();
        assert_eq!(config.topology.topology_id, "flow:1");
        assert_eq!(config.topology.graph_refresh_delay_ms, 1000);
        assert_eq!(config.topology.max_reschedules, 10);
        assert_eq!(config.topology.host_link_marker, "host");
        assert_eq!(config.database.redis_port, 6379);
        assert_eq!(config.database.state_db, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_durations() {
        let config = LoopRemoverConfig::default();
        assert_eq!(config.graph_refresh_delay(), Duration::from_secs(1));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_validate_rejects_empty_topology_id() {
        let mut config = LoopRemoverConfig::default();
        config.topology.topology_id = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = LoopRemoverConfig::default();
        config.database.redis_port = 0;
        assert!(config.validate().is_err());

        let mut config = LoopRemoverConfig::default();
        config.writer.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = LoopRemoverConfig::default();
        config.feed.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[topology]
topology_id = "flow:2"
graph_refresh_delay_ms = 250

[database]
redis_host = "10.0.0.1"
"#;
        let config: LoopRemoverConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.topology.topology_id, "flow:2");
        assert_eq!(config.graph_refresh_delay(), Duration::from_millis(250));
        assert_eq!(config.database.redis_host, "10.0.0.1");
        // Unspecified values should use defaults
        assert_eq!(config.topology.max_reschedules, 10);
        assert_eq!(config.database.appl_db, 0);
        assert_eq!(config.writer, WriterConfig::default());
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = LoopRemoverConfig::load_or_default("/nonexistent/loopremoverd.toml").unwrap();
        assert_eq!(config, LoopRemoverConfig::default());
    }

    #[test]
    fn test_load_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[topology\ntopology_id = ").unwrap();

        let err = LoopRemoverConfig::load_or_default(file.path()).unwrap_err();
        assert!(matches!(err, LoopRemoverError::ConfigParse { .. }));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loopremoverd.toml");

        let mut config = LoopRemoverConfig::default();
        config.topology.topology_id = "flow:7".to_string();
        config.writer.max_attempts = 5;
        config.save(&path).unwrap();

        assert_eq!(LoopRemoverConfig::load_or_default(&path).unwrap(), config);
    }
}
