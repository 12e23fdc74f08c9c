//! Synchronous serial port implementation.
//!
//! Wraps the `serialport` crate's `SerialPort` trait with our own `SerialPortAdapter`
//! trait for dependency injection and testing.

use super::error::PortError;
use super::traits::{PortAdapter, PortConfiguration, PortOpener, SerialPortAdapter};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, warn};

/// Synchronous serial port implementation wrapping `serialport::SerialPort`.
pub struct SyncSerialPort {
    /// The underlying serial port implementation.
    port: Box<dyn serialport::SerialPort>,
    /// The port name/path for identification.
    name: String,
}

impl SyncSerialPort {
    /// Open a serial port with the given configuration.
    ///
    /// Fails with `PortError::Config` before touching the device when the
    /// configuration asks for framing the driver cannot express.
    ///
    /// # Example
    /// ```no_run
    /// use serialdesk::port::{SyncSerialPort, PortConfiguration};
    ///
    /// let config = PortConfiguration::default();
    /// let port = SyncSerialPort::open("/dev/ttyUSB0", &config)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(port_name: &str, config: &PortConfiguration) -> Result<Self, PortError> {
        let parity: serialport::Parity = config.parity.try_into()?;
        let stop_bits: serialport::StopBits = config.stop_bits.try_into()?;

        let port = serialport::new(port_name, config.baud_rate)
            .data_bits(config.data_bits.into())
            .flow_control(serialport::FlowControl::None)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(config.timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => PortError::not_found(port_name),
                serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
                _ => PortError::Serial(e),
            })?;

        debug!(port = port_name, baud = config.baud_rate, "serial port opened");

        Ok(Self {
            port,
            name: port_name.to_string(),
        })
    }
}

impl SerialPortAdapter for SyncSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let written = self.port.write(data).map_err(PortError::Io)?;
        self.port.flush().map_err(PortError::Io)?;
        Ok(written)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        self.port.read(buffer).map_err(PortError::Io)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.port.set_timeout(timeout).map_err(PortError::Serial)
    }

    fn try_clone_port(&self) -> Result<PortAdapter, PortError> {
        let port = self.port.try_clone().map_err(PortError::Serial)?;
        Ok(Box::new(Self {
            port,
            name: self.name.clone(),
        }))
    }

    fn close(&mut self) -> Result<(), PortError> {
        // The driver closes on drop; flushing is the last point a failure
        // can still be observed.
        self.port.flush().map_err(PortError::Io)
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate())
            .finish()
    }
}

/// Opens real devices through the `serialport` driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortOpener;

impl PortOpener for SystemPortOpener {
    fn open(&self, port_name: &str, config: &PortConfiguration) -> Result<PortAdapter, PortError> {
        Ok(Box::new(SyncSerialPort::open(port_name, config)?))
    }

    fn available_ports(&self) -> Vec<String> {
        list_port_names()
    }
}

/// List the serial ports present on the system, sorted by name.
///
/// Enumeration failures are not fatal; they are logged and yield an empty list.
pub fn list_port_names() -> Vec<String> {
    match serialport::available_ports() {
        Ok(ports) => {
            let mut names: Vec<String> = ports.into_iter().map(|p| p.port_name).collect();
            names.sort();
            names.dedup();
            names
        }
        Err(e) => {
            warn!(error = %e, "failed to enumerate serial ports");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{Parity, StopBits};

    #[test]
    fn test_port_not_found_error() {
        let config = PortConfiguration::default();
        let result = SyncSerialPort::open("/dev/nonexistent_port_12345", &config);

        match result {
            Err(PortError::NotFound(name)) => assert!(name.contains("nonexistent")),
            Err(PortError::Serial(_)) | Err(PortError::Io(_)) => {}
            Err(e) => panic!("Expected NotFound error, got: {:?}", e),
            Ok(_) => panic!("opening a nonexistent port must fail"),
        }
    }

    #[test]
    fn test_unsupported_framing_rejected_before_open() {
        let config = PortConfiguration {
            parity: Parity::Mark,
            ..PortConfiguration::default()
        };
        let result = SyncSerialPort::open("/dev/nonexistent_port_12345", &config);
        assert!(matches!(result, Err(PortError::Config(_))));

        let config = PortConfiguration {
            stop_bits: StopBits::OnePointFive,
            ..PortConfiguration::default()
        };
        let result = SystemPortOpener.open("/dev/nonexistent_port_12345", &config);
        assert!(matches!(result, Err(PortError::Config(_))));
    }

    #[test]
    fn test_list_port_names_is_sorted() {
        let names = list_port_names();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
