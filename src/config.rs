//! Agent configuration loaded from TOML
//!
//! # Example TOML
//! ```toml
//! flush_interval_ms = 60000
//! channel_capacity = 1024
//! emit_mode = "blocking"
//!
//! [outliers]
//! force_every = 30
//! archive_size = 30
//! max_z_score = 3.0
//! ```
//!
//! Every key is optional; missing keys take their defaults.

use crate::outlier::OutlierOptions;
use crate::processor::EmitMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Configuration for the aggregation agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Outlier sampling options shared by every identity
    pub outliers: OutlierOptions,

    /// Interval between outlier flushes in milliseconds
    ///
    /// Default: 60000 (one collection tick per minute)
    pub flush_interval_ms: u64,

    /// Capacity of each emission channel (metrics, traces, outliers)
    pub channel_capacity: usize,

    /// Behaviour of the metrics/traces channels when full
    ///
    /// `blocking` (default) waits for the consumer; `lossy` drops and counts.
    pub emit_mode: EmitMode,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            outliers: OutlierOptions::default(),
            flush_interval_ms: 60_000,
            channel_capacity: 1024,
            emit_mode: EmitMode::Blocking,
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// Returns error if the file doesn't exist, has invalid TOML syntax, or
    /// contains unknown keys.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML agent configuration")
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        self.outliers.validate()?;

        if self.flush_interval_ms == 0 {
            return Err("flush_interval_ms must be >= 1".to_string());
        }

        if self.channel_capacity == 0 {
            return Err("channel_capacity must be >= 1".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.flush_interval(), Duration::from_secs(60));
        assert_eq!(config.emit_mode, EmitMode::Blocking);
    }

    #[test]
    fn test_parse_full_config() {
        let config = AgentConfig::from_toml_str(
            r#"
flush_interval_ms = 500
channel_capacity = 8
emit_mode = "lossy"

[outliers]
force_every = 5
archive_size = 10
max_z_score = 2.5
"#,
        )
        .unwrap();

        assert_eq!(config.flush_interval_ms, 500);
        assert_eq!(config.channel_capacity, 8);
        assert_eq!(config.emit_mode, EmitMode::Lossy);
        assert_eq!(config.outliers.force_every, 5);
        assert_eq!(config.outliers.archive_size, 10);
        assert_eq!(config.outliers.max_z_score, 2.5);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = AgentConfig::from_toml_str("[outliers]\nforce_every = 2\n").unwrap();
        assert_eq!(config.outliers.force_every, 2);
        assert_eq!(config.outliers.archive_size, 30);
        assert_eq!(config.flush_interval_ms, 60_000);
    }

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(
            AgentConfig::from_toml_str("").unwrap(),
            AgentConfig::default()
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(AgentConfig::from_toml_str("flush_every = 3\n").is_err());
        assert!(AgentConfig::from_toml_str("emit_mode = \"sometimes\"\n").is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = AgentConfig {
            channel_capacity: 0,
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AgentConfig {
            flush_interval_ms: 0,
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AgentConfig::from_toml_str("[outliers]\nforce_every = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "channel_capacity = 16").unwrap();
        let config = AgentConfig::from_toml(file.path()).unwrap();
        assert_eq!(config.channel_capacity, 16);
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = AgentConfig::from_toml("/nonexistent/graphtrace.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
