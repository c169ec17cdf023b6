//! Application configuration management.
//!
//! Handles loading, saving, and validating blewatch configuration including:
//! - Tracker heartbeat timeout and sweep cadence
//! - Bluetooth adapter selection and enrichment
//! - HTTP server binding
//!
//! Configuration is read from an optional TOML file and then overridden by
//! `BLEWATCH__SECTION__KEY` environment variables.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "BLEWATCH";

/// Default heartbeat timeout in seconds.
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 30;

static ADAPTER_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^hci[0-9]+$").expect("adapter regex is valid"));

/// Errors from loading, saving, or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("Failed to read {path}: {source}")]
    ReadError {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file could not be written.
    #[error("Failed to write {path}: {source}")]
    WriteError {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The sources could not be merged or deserialized.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] ::config::ConfigError),

    /// The configuration could not be rendered as TOML.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// One field holds an invalid value.
    #[error("Invalid {field}: {message}")]
    ValidationError {
        /// Dotted field path.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} configuration errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Discovery tracker settings.
    pub tracker: TrackerConfig,

    /// Advertisement source settings.
    pub bluetooth: BluetoothConfig,

    /// HTTP server settings.
    pub server: ServerConfig,
}

/// Discovery tracker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Silence after which a device is evicted.
    pub heartbeat_timeout_secs: u64,

    /// Background sweep period while listening.
    pub sweep_interval_ms: u64,

    /// Buffered events per subscriber before it starts lagging.
    pub event_capacity: usize,

    /// Queued commands before senders wait.
    pub command_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_secs: DEFAULT_HEARTBEAT_TIMEOUT_SECS,
            sweep_interval_ms: 1_000,
            event_capacity: 1_024,
            command_capacity: 256,
        }
    }
}

impl TrackerConfig {
    /// The heartbeat timeout as a [`Duration`].
    #[must_use]
    pub const fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// The sweep period as a [`Duration`].
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Advertisement source settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Adapter name such as `hci0`; the system default when unset.
    pub adapter: Option<String>,

    /// Resolve connection and bond state for every sighting.
    pub enrich: bool,

    /// Ask the controller to report repeated advertisements.
    pub duplicate_data: bool,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            enrich: false,
            duplicate_data: true,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub bind_address: String,

    /// TCP port.
    pub port: u16,

    /// Start the tracker when the server boots.
    pub auto_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            auto_start: true,
        }
    }
}

impl Config {
    /// Loads configuration from `path` (if it exists) and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` exists but cannot be read, if the sources
    /// cannot be parsed, or if the result is invalid.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let mut builder = ::config::Config::builder();
        if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
                path: path.display().to_string(),
                source,
            })?;
            builder = builder.add_source(::config::File::from_str(
                &contents,
                ::config::FileFormat::Toml,
            ));
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration to `path` as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.display().to_string(),
            source,
        })
    }

    /// Checks every field and reports all problems at once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a single problem or
    /// [`ConfigError::MultipleValidationErrors`] for several.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut invalid = |field: &str, message: &str| {
            errors.push(ConfigError::ValidationError {
                field: field.to_string(),
                message: message.to_string(),
            });
        };

        if self.tracker.heartbeat_timeout_secs == 0 {
            invalid("tracker.heartbeat_timeout_secs", "must be greater than zero");
        }
        if self.tracker.sweep_interval_ms == 0 {
            invalid("tracker.sweep_interval_ms", "must be greater than zero");
        }
        if self.tracker.event_capacity == 0 {
            invalid("tracker.event_capacity", "must be greater than zero");
        }
        if self.tracker.command_capacity == 0 {
            invalid("tracker.command_capacity", "must be greater than zero");
        }
        if let Some(adapter) = &self.bluetooth.adapter {
            if !ADAPTER_NAME_REGEX.is_match(adapter) {
                invalid("bluetooth.adapter", "expected an adapter name like 'hci0'");
            }
        }
        if self.server.bind_address.parse::<IpAddr>().is_err() {
            invalid("server.bind_address", "must be an IPv4 or IPv6 address");
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// Platform default configuration path.
///
/// On Linux: `/etc/blewatch/config.toml`
/// Elsewhere: the user config directory, e.g. `~/.config/blewatch/config.toml`
#[must_use]
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/blewatch/config.toml")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "blewatch").map_or_else(
            || PathBuf::from("config.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tracker.heartbeat_timeout(), Duration::from_secs(30));
        assert_eq!(config.tracker.sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_single_validation_error_is_not_wrapped() {
        let mut config = Config::default();
        config.tracker.heartbeat_timeout_secs = 0;

        match config.validate() {
            Err(ConfigError::ValidationError { field, .. }) => {
                assert_eq!(field, "tracker.heartbeat_timeout_secs");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_multiple_validation_errors_are_collected() {
        let mut config = Config::default();
        config.tracker.sweep_interval_ms = 0;
        config.bluetooth.adapter = Some("wlan0".into());
        config.server.bind_address = "not-an-ip".into();

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.tracker, TrackerConfig::default());
    }

    #[test]
    fn test_save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.tracker.heartbeat_timeout_secs = 5;
        config.bluetooth.adapter = Some("hci1".into());
        config.bluetooth.enrich = true;
        config.server.port = 8080;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.tracker.heartbeat_timeout_secs, 5);
        assert_eq!(loaded.bluetooth.adapter.as_deref(), Some("hci1"));
        assert!(loaded.bluetooth.enrich);
        assert_eq!(loaded.server.port, 8080);
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tracker]\nheartbeat_timeout_secs = 12\n").unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.tracker.heartbeat_timeout_secs, 12);
        assert_eq!(loaded.tracker.sweep_interval_ms, 1_000);
        assert_eq!(loaded.server, ServerConfig::default());
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tracker]\nheartbeat_timeout_secs = 0\n").unwrap();

        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_unreadable_path_is_read_error() {
        let dir = tempfile::tempdir().unwrap();

        match Config::load(dir.path()) {
            Err(ConfigError::ReadError { path, .. }) => {
                assert_eq!(path, dir.path().display().to_string());
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
