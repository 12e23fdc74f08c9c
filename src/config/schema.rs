//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! Every section falls back to its defaults when absent.

use crate::messaging::DisplayMode;
use crate::profile::{
    DEFAULT_LOCK_TIMEOUT, DEFAULT_MAX_BACKUPS, DEFAULT_WATCH_DEBOUNCE, PROFILE_FILE_NAME,
};
use crate::state::DEFAULT_READ_TIMEOUT_MS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Serial I/O configuration
    pub serial: SerialConfig,
    /// Profile storage configuration
    pub profiles: ProfilesConfig,
    /// Notification log configuration
    pub notifications: NotificationsConfig,
    /// Send/receive formatting
    pub messaging: MessagingConfig,
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log format: "pretty" or "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line format with colors
    #[default]
    Pretty,
    /// Single-line format
    Compact,
}

/// Serial I/O configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Read timeout applied to opened ports, in milliseconds
    pub read_timeout_ms: u64,
    /// Largest chunk the receive loop reads at once
    pub read_buffer_size: usize,
    /// Capacity of the channel carrying received data to the console
    pub event_capacity: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            read_buffer_size: 1024,
            event_capacity: 256,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Profile storage configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilesConfig {
    /// Directory holding the profile file; the executable's directory when unset
    pub directory: Option<PathBuf>,
    /// Profile file name
    pub file_name: String,
    /// Keep a timestamped copy before every overwrite
    pub backups_enabled: bool,
    /// Most backups retained
    pub max_backups: usize,
    /// How long a save waits for the cross-process lock, in milliseconds
    pub lock_timeout_ms: u64,
    /// Quiet period before an external change is reloaded, in milliseconds
    pub watch_debounce_ms: u64,
    /// Reload the profile file when another process changes it
    pub watch: bool,
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_name: PROFILE_FILE_NAME.to_string(),
            backups_enabled: true,
            max_backups: DEFAULT_MAX_BACKUPS,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT.as_millis() as u64,
            watch_debounce_ms: DEFAULT_WATCH_DEBOUNCE.as_millis() as u64,
            watch: true,
        }
    }
}

impl ProfilesConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }

    /// Backup limit, or `None` when backups are disabled.
    pub fn backup_limit(&self) -> Option<usize> {
        self.backups_enabled.then_some(self.max_backups)
    }
}

/// Notification log configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Most messages kept in the log
    pub capacity: usize,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            capacity: crate::notification::DEFAULT_CAPACITY,
        }
    }
}

/// Send/receive formatting section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Start in hex mode instead of ASCII
    pub hex_mode: bool,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self { hex_mode: true }
    }
}

impl MessagingConfig {
    pub fn display_mode(&self) -> DisplayMode {
        DisplayMode::from_hex_flag(self.hex_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.serial.read_timeout(), Duration::from_millis(100));
        assert_eq!(config.profiles.file_name, "SerialPortConfig.json");
        assert_eq!(config.profiles.backup_limit(), Some(10));
        assert_eq!(config.profiles.lock_timeout(), Duration::from_secs(5));
        assert_eq!(config.notifications.capacity, 100);
        assert_eq!(config.messaging.display_mode(), DisplayMode::Hex);
    }

    #[test]
    fn test_backups_disabled() {
        let profiles = ProfilesConfig {
            backups_enabled: false,
            ..ProfilesConfig::default()
        };
        assert_eq!(profiles.backup_limit(), None);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[logging]"));
        assert!(toml_str.contains("[profiles]"));
        assert!(toml_str.contains("[messaging]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [logging]
            format = "compact"

            [profiles]
            directory = "/srv/serial"
            max_backups = 3
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.profiles.directory, Some(PathBuf::from("/srv/serial")));
        assert_eq!(config.profiles.max_backups, 3);
        // Defaults should still work
        assert_eq!(config.logging.level, "info");
        assert!(config.messaging.hex_mode);
    }
}
