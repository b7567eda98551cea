//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `hmvirt.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::path::PathBuf;

use hmvirt_adapter_virtual::config::VirtualConfig;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Template and storage directories.
    pub paths: PathsConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Event bus settings.
    pub bus: BusConfig,
    /// The virtual plugin.
    #[serde(rename = "virtual")]
    pub virtual_plugin: VirtualConfig,
}

/// Filesystem locations.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the `<type>[_<owner>].json` device templates.
    pub devices_dir: PathBuf,
    /// Directory the published devices are persisted to.
    pub storage_dir: PathBuf,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Events buffered per subscriber before it lags.
    pub capacity: usize,
}

impl Config {
    /// Load configuration from `hmvirt.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("hmvirt.toml")?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("HMVIRT_DEVICES_DIR") {
            self.paths.devices_dir = val.into();
        }
        if let Some(val) = var("HMVIRT_STORAGE_DIR") {
            self.paths.storage_dir = val.into();
        }
        if let Some(val) = var("HMVIRT_BUS_CAPACITY")
            && let Ok(capacity) = val.parse()
        {
            self.bus.capacity = capacity;
        }
        if let Some(val) = var("HMVIRT_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.capacity == 0 {
            return Err(ConfigError::Validation(
                "bus capacity must be non-zero".to_string(),
            ));
        }
        if self.virtual_plugin.instance.is_empty() {
            return Err(ConfigError::Validation(
                "virtual plugin instance must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            devices_dir: PathBuf::from("devices"),
            storage_dir: PathBuf::from("storage"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "hmvirtd=info,hmvirt=info".to_string(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.paths.devices_dir, PathBuf::from("devices"));
        assert_eq!(config.paths.storage_dir, PathBuf::from("storage"));
        assert_eq!(config.bus.capacity, 256);
        assert!(config.virtual_plugin.enabled);
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.bus.capacity, 256);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [paths]
            devices_dir = '/etc/hmvirt/devices'
            storage_dir = '/var/lib/hmvirt'

            [logging]
            filter = 'debug'

            [bus]
            capacity = 32

            [virtual]
            instance = '2'
            scenes = ['Evening']
            dimmers = ['Desk']
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.paths.devices_dir,
            PathBuf::from("/etc/hmvirt/devices")
        );
        assert_eq!(config.paths.storage_dir, PathBuf::from("/var/lib/hmvirt"));
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.bus.capacity, 32);
        assert_eq!(config.virtual_plugin.instance, "2");
        assert_eq!(config.virtual_plugin.scenes, vec!["Evening"]);
        assert_eq!(config.virtual_plugin.dimmers, vec!["Desk"]);
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.bus.capacity, 256);
    }

    #[test]
    fn should_apply_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(env(&[
            ("HMVIRT_DEVICES_DIR", "/tmp/devices"),
            ("HMVIRT_STORAGE_DIR", "/tmp/storage"),
            ("HMVIRT_BUS_CAPACITY", "8"),
            ("HMVIRT_LOG", "trace"),
        ]));
        assert_eq!(config.paths.devices_dir, PathBuf::from("/tmp/devices"));
        assert_eq!(config.paths.storage_dir, PathBuf::from("/tmp/storage"));
        assert_eq!(config.bus.capacity, 8);
        assert_eq!(config.logging.filter, "trace");
    }

    #[test]
    fn should_prefer_rust_log_over_hmvirt_log() {
        let mut config = Config::default();
        config.apply_overrides(env(&[("HMVIRT_LOG", "trace"), ("RUST_LOG", "warn")]));
        assert_eq!(config.logging.filter, "warn");
    }

    #[test]
    fn should_ignore_unparsable_capacity_override() {
        let mut config = Config::default();
        config.apply_overrides(env(&[("HMVIRT_BUS_CAPACITY", "lots")]));
        assert_eq!(config.bus.capacity, 256);
    }

    #[test]
    fn should_reject_zero_capacity() {
        let mut config = Config::default();
        config.bus.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_empty_instance() {
        let mut config = Config::default();
        config.virtual_plugin.instance = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_accept_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }
}
