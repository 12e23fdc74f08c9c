//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SERIALDESK";

/// Config file name
const CONFIG_FILE_NAME: &str = "serialdesk.toml";

/// Application directory under the platform config directory
const APP_DIR_NAME: &str = "serialdesk";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "SERIALDESK_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `SERIALDESK_CONFIG` environment variable (explicit path)
    /// 2. `./serialdesk.toml` (current directory)
    /// 3. `~/.config/serialdesk/serialdesk.toml` (XDG on Linux/macOS)
    /// 4. `%APPDATA%\serialdesk\serialdesk.toml` (Windows)
    /// 5. Built-in defaults (no file required)
    ///
    /// Environment variables override file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        // Still apply env overrides even with defaults
        let _ = apply_env_overrides(&mut config);

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a mutable reference to the configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        debug!(path = %path.display(), "{} points at a missing file", CONFIG_PATH_ENV);
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. XDG config directory (Linux/macOS) or APPDATA (Windows)
    if let Some(app_config) = get_default_config_path() {
        if app_config.exists() {
            return Some(app_config);
        }
    }

    // 4. No config file found - will use defaults
    None
}

/// Get the platform-specific config directory.
fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

/// Save configuration to a file.
fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn env_var(key: &str) -> (String, Option<String>) {
    let name = format!("{}_{}", ENV_PREFIX, key);
    let value = std::env::var(&name).ok();
    (name, value)
}

fn env_parsed<T: FromStr>(key: &str, message: &str) -> ConfigResult<Option<T>> {
    match env_var(key) {
        (_, None) => Ok(None),
        (name, Some(val)) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::env_parse(name, message)),
    }
}

fn env_flag(key: &str) -> ConfigResult<Option<bool>> {
    match env_var(key) {
        (_, None) => Ok(None),
        (name, Some(val)) => match val.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::env_parse(name, "Expected true or false")),
        },
    }
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `SERIALDESK_<SECTION>_<KEY>`
/// For example:
/// - `SERIALDESK_LOGGING_LEVEL=debug`
/// - `SERIALDESK_PROFILES_DIRECTORY=/srv/serial`
/// - `SERIALDESK_MESSAGING_HEX_MODE=false`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Logging overrides
    if let (_, Some(val)) = env_var("LOGGING_LEVEL") {
        config.logging.level = val;
    }

    // Serial overrides
    if let Some(val) = env_parsed("SERIAL_READ_TIMEOUT_MS", "Invalid timeout")? {
        config.serial.read_timeout_ms = val;
    }

    // Profile overrides
    if let (_, Some(val)) = env_var("PROFILES_DIRECTORY") {
        config.profiles.directory = Some(PathBuf::from(val));
    }
    if let Some(val) = env_flag("PROFILES_BACKUPS_ENABLED")? {
        config.profiles.backups_enabled = val;
    }
    if let Some(val) = env_parsed("PROFILES_MAX_BACKUPS", "Invalid backup count")? {
        config.profiles.max_backups = val;
    }
    if let Some(val) = env_parsed("PROFILES_LOCK_TIMEOUT_MS", "Invalid timeout")? {
        config.profiles.lock_timeout_ms = val;
    }
    if let Some(val) = env_parsed("PROFILES_WATCH_DEBOUNCE_MS", "Invalid debounce")? {
        config.profiles.watch_debounce_ms = val;
    }

    // Notification overrides
    if let Some(val) = env_parsed("NOTIFICATIONS_CAPACITY", "Invalid capacity")? {
        config.notifications.capacity = val;
    }

    // Messaging overrides
    if let Some(val) = env_flag("MESSAGING_HEX_MODE")? {
        config.messaging.hex_mode = val;
    }

    Ok(())
}

/// Reject values the rest of the application cannot work with.
fn validate(config: &Config) -> ConfigResult<()> {
    if config.serial.read_buffer_size == 0 {
        return Err(ConfigError::validation(
            "serial.read_buffer_size",
            "must be greater than zero",
        ));
    }
    if config.serial.event_capacity == 0 {
        return Err(ConfigError::validation(
            "serial.event_capacity",
            "must be greater than zero",
        ));
    }
    if config.profiles.file_name.trim().is_empty() {
        return Err(ConfigError::validation(
            "profiles.file_name",
            "must not be empty",
        ));
    }
    if config.notifications.capacity == 0 {
        return Err(ConfigError::validation(
            "notifications.capacity",
            "must be greater than zero",
        ));
    }
    Ok(())
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    get_config_dir().map(|d| d.join(APP_DIR_NAME))
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}
