//! serialdesk library
//!
//! Core of a single-connection serial terminal: opening and forwarding one
//! serial port, hex/ASCII formatting, a bounded notification log, and named
//! serial profiles persisted to a JSON file shared safely between processes.
//!
//! # Modules
//!
//! - `config`: Configuration management with TOML support
//! - `state`: Connection state and connection parameters
//! - `error`: Unified error handling
//! - `port`: Port abstraction layer for serial communication
//! - `service`: Connection manager and receive/send forwarding
//! - `messaging`: Hex/ASCII conversion and traffic counters
//! - `notification`: Bounded log of user-visible messages
//! - `profile`: Profile model, atomic storage, backups and file watching
//! - `permission`: Filesystem access probes
//! - `app`: Interactive console controller

pub mod app;
pub mod config;
pub mod error;
pub mod messaging;
pub mod notification;
pub mod permission;
pub mod port;
pub mod profile;
pub mod service;
pub mod state;

// Re-export commonly used types for convenience
pub use error::{AppError, AppResult};
pub use messaging::{DisplayMode, FormatError, MessagingState};
pub use notification::{NotificationLevel, NotificationLog, NotificationMessage, NotificationSink};
pub use port::{
    DataBits, MockPortOpener, MockSerialPort, Parity, PortConfiguration, PortError, PortOpener,
    SerialPortAdapter, StopBits, SyncSerialPort, SystemPortOpener,
};
pub use profile::{
    ProfileError, ProfileManager, ProfileSet, ProfileStore, ProfileWatcher, ReloadOutcome,
    SerialProfile, StoreError,
};
pub use service::{ConnectionManager, PortService, SerialEvent, ServiceError, ServiceResult};
pub use state::{ConnectionState, PortConfig};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
