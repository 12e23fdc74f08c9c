use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::port::{DataBits, Parity, PortConfiguration, PortError, StopBits};

// Default connection constants
pub const DEFAULT_BAUD_RATE: u32 = 115200;
pub const DEFAULT_DATA_BITS: u8 = 8;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;

/// Simplified connection state forwarded to observers.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Parameters of a connection request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortConfig {
    pub port_name: String,
    #[serde(default = "default_baud")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default)]
    pub stop_bits: StopBits,
    #[serde(default)]
    pub parity: Parity,
}

/// Default baud rate for new connections (115200 bps).
pub fn default_baud() -> u32 {
    DEFAULT_BAUD_RATE
}

/// Default data bits (8).
pub fn default_data_bits() -> u8 {
    DEFAULT_DATA_BITS
}

impl PortConfig {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DEFAULT_DATA_BITS,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }

    /// Driver-level configuration with the given read timeout.
    pub fn to_port_configuration(&self, timeout: Duration) -> Result<PortConfiguration, PortError> {
        Ok(PortConfiguration {
            baud_rate: self.baud_rate,
            data_bits: DataBits::try_from(self.data_bits)?,
            parity: self.parity,
            stop_bits: self.stop_bits,
            timeout,
        })
    }
}

impl fmt::Display for PortConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {} baud, {} data bits, {} stop bits, {} parity",
            self.port_name, self.baud_rate, self.data_bits, self.stop_bits, self.parity
        )
    }
}
