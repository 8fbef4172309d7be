//! Configuration for notification distribution.
//!
//! Supports YAML file and environment variable overrides.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default maximum pending notifications per node mailbox.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 200;

/// Default notification lifetime in seconds.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 300;

/// Default interval between expiration sweeps in seconds.
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 30;

/// Crate configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Registry and mailbox configuration.
    pub registry: RegistryConfig,
    /// Expiration sweep configuration.
    pub cleanup: CleanupConfig,
}

/// Registry and mailbox configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum pending notifications per node mailbox.
    ///
    /// Past this bound the oldest pending entry is dropped; delivery is
    /// best-effort by contract.
    pub mailbox_capacity: usize,
    /// Default notification lifetime in seconds, applied when a put
    /// carries no explicit expiry.
    pub expires_in_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            expires_in_secs: DEFAULT_EXPIRES_IN_SECS,
        }
    }
}

impl RegistryConfig {
    /// Default lifetime as a `Duration`.
    pub fn default_expires_in(&self) -> Duration {
        Duration::from_secs(self.expires_in_secs)
    }
}

/// Expiration sweep configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Seconds between sweeps. 0 disables the background task.
    pub interval_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
        }
    }
}

impl CleanupConfig {
    /// Sweep interval as a `Duration`.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Whether the background sweep should run at all.
    pub fn enabled(&self) -> bool {
        self.interval_secs > 0
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("SIGNALBOX_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(capacity) = std::env::var("MAILBOX_CAPACITY") {
            if let Ok(c) = capacity.parse() {
                self.registry.mailbox_capacity = c;
            }
        }

        if let Ok(secs) = std::env::var("EXPIRES_IN_SECS") {
            if let Ok(s) = secs.parse() {
                self.registry.expires_in_secs = s;
            }
        }

        if let Ok(secs) = std::env::var("CLEANUP_INTERVAL_SECS") {
            if let Ok(s) = secs.parse() {
                self.cleanup.interval_secs = s;
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{0}': {1}")]
    FileRead(String, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.registry.mailbox_capacity, 200);
        assert_eq!(config.registry.expires_in_secs, 300);
        assert_eq!(config.cleanup.interval_secs, 30);
        assert!(config.cleanup.enabled());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
registry:
  mailbox_capacity: 10
  expires_in_secs: 60

cleanup:
  interval_secs: 0
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.registry.mailbox_capacity, 10);
        assert_eq!(
            config.registry.default_expires_in(),
            Duration::from_secs(60)
        );
        assert!(!config.cleanup.enabled());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "registry:\n  mailbox_capacity: 5\n";

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.registry.mailbox_capacity, 5);
        assert_eq!(config.registry.expires_in_secs, 300);
        assert_eq!(config.cleanup.interval_secs, 30);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "registry:\n  mailbox_capacity: 42").unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.registry.mailbox_capacity, 42);
    }

    #[test]
    fn test_from_missing_file_errors() {
        let result = Config::from_file("/nonexistent/signalbox.yaml");
        assert!(matches!(result, Err(ConfigError::FileRead(_, _))));
    }
}
