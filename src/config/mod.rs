//! Application settings.
//!
//! TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SERIALDESK_CONFIG` environment variable (explicit path)
//! 2. `./serialdesk.toml` (current directory)
//! 3. `~/.config/serialdesk/serialdesk.toml` (XDG on Linux/macOS)
//! 4. `%APPDATA%\serialdesk\serialdesk.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is `SERIALDESK_<SECTION>_<KEY>`, for example
//! `SERIALDESK_PROFILES_DIRECTORY=/srv/serial` or
//! `SERIALDESK_LOGGING_LEVEL=debug`.
//!
//! # Example
//!
//! ```rust,ignore
//! use serialdesk::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! println!("Profiles kept in: {:?}", loader.config().profiles.directory);
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{
    Config, LogFormat, LoggingConfig, MessagingConfig, NotificationsConfig, ProfilesConfig,
    SerialConfig,
};
