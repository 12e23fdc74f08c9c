//! Mock serial port implementation for testing.
//!
//! Provides a `MockSerialPort` that simulates serial port behavior without
//! requiring actual hardware, and a `MockPortOpener` that hands registered
//! mocks to the connection manager.

use super::error::PortError;
use super::traits::{PortAdapter, PortConfiguration, PortOpener, SerialPortAdapter};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Inner state of the mock port, shared by every clone of the handle.
#[derive(Debug, Default)]
struct MockPortState {
    /// Queue of bytes to be returned by read operations.
    read_queue: VecDeque<u8>,
    /// Log of all bytes written to the port.
    write_log: Vec<Vec<u8>>,
    /// Error kind the next read reports instead of data.
    fail_next_read: Option<io::ErrorKind>,
    /// Whether writes fail.
    fail_writes: bool,
    /// Whether `close` reports an error.
    fail_on_close: bool,
    /// Whether cloning the handle fails.
    fail_clone: bool,
    /// Set once `close` has been called.
    closed: bool,
    /// Configured timeout duration.
    timeout: Duration,
}

/// Mock serial port implementation for testing.
///
/// Clones share one device state, the same way two OS handles share a device.
///
/// # Example
/// ```
/// use serialdesk::port::{MockSerialPort, SerialPortAdapter};
///
/// let mut port = MockSerialPort::new("MOCK0");
///
/// port.enqueue_read(b"Hello, World!");
/// let mut buffer = [0u8; 13];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"Hello, World!");
///
/// port.write_bytes(b"Response").unwrap();
/// assert_eq!(port.get_write_log(), vec![b"Response".to_vec()]);
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    state: Arc<Mutex<MockPortState>>,
}

impl MockSerialPort {
    /// Create a new mock serial port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState {
                timeout: Duration::from_millis(100),
                ..Default::default()
            })),
        }
    }

    /// Enqueue bytes to be returned by subsequent read operations.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.state.lock().read_queue.extend(data);
    }

    /// Get a copy of all data written to the port.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// All written bytes concatenated in write order.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.state.lock().write_log.concat()
    }

    /// Make the next read fail with the given I/O error kind.
    pub fn fail_next_read(&self, kind: io::ErrorKind) {
        self.state.lock().fail_next_read = Some(kind);
    }

    /// Make every write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Make `close` report an error.
    pub fn set_fail_on_close(&self, fail: bool) {
        self.state.lock().fail_on_close = fail;
    }

    /// Make `try_clone_port` fail.
    pub fn set_fail_clone(&self, fail: bool) {
        self.state.lock().fail_clone = fail;
    }

    /// Whether `close` has been called on any handle.
    pub fn was_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Timeout most recently applied to the device.
    pub fn timeout(&self) -> Duration {
        self.state.lock().timeout
    }

    /// Get the number of bytes available to read.
    pub fn available_bytes(&self) -> usize {
        self.state.lock().read_queue.len()
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PortError::NotOpen);
        }
        if state.fail_writes {
            return Err(PortError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated write failure",
            )));
        }
        state.write_log.push(data.to_vec());
        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        if let Some(kind) = state.fail_next_read.take() {
            return Err(PortError::Io(io::Error::new(kind, "simulated read failure")));
        }
        if state.closed {
            return Err(PortError::NotOpen);
        }

        let mut bytes_read = 0;
        for byte in buffer.iter_mut() {
            match state.read_queue.pop_front() {
                Some(queued) => {
                    *byte = queued;
                    bytes_read += 1;
                }
                None => break,
            }
        }

        if bytes_read == 0 {
            // Simulate "would block" behavior by returning an I/O error
            Err(PortError::Io(io::Error::new(
                io::ErrorKind::WouldBlock,
                "No data available",
            )))
        } else {
            Ok(bytes_read)
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.state.lock().timeout = timeout;
        Ok(())
    }

    fn try_clone_port(&self) -> Result<PortAdapter, PortError> {
        if self.state.lock().fail_clone {
            return Err(PortError::config("simulated clone failure"));
        }
        Ok(Box::new(self.clone()))
    }

    fn close(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.closed = true;
        if state.fail_on_close {
            return Err(PortError::Io(io::Error::new(
                io::ErrorKind::Other,
                "simulated close failure",
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}

/// Hands out registered `MockSerialPort`s by name.
///
/// Unknown names fail with `PortError::NotFound`. The last configuration
/// requested is kept for assertions.
#[derive(Clone, Default)]
pub struct MockPortOpener {
    ports: Arc<Mutex<HashMap<String, MockSerialPort>>>,
    last_config: Arc<Mutex<Option<PortConfiguration>>>,
}

impl MockPortOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mock device and return a handle sharing its state.
    pub fn add_port(&self, name: &str) -> MockSerialPort {
        let port = MockSerialPort::new(name);
        self.ports.lock().insert(name.to_string(), port.clone());
        port
    }

    /// Remove a device, simulating an unplugged adapter.
    pub fn remove_port(&self, name: &str) {
        self.ports.lock().remove(name);
    }

    pub fn last_config(&self) -> Option<PortConfiguration> {
        self.last_config.lock().clone()
    }
}

impl PortOpener for MockPortOpener {
    fn open(&self, port_name: &str, config: &PortConfiguration) -> Result<PortAdapter, PortError> {
        // Same framing limits as the real driver.
        let _: serialport::Parity = config.parity.try_into()?;
        let _: serialport::StopBits = config.stop_bits.try_into()?;

        *self.last_config.lock() = Some(config.clone());
        let ports = self.ports.lock();
        let port = ports
            .get(port_name)
            .ok_or_else(|| PortError::not_found(port_name))?;
        let mut handle = port.clone();
        handle.state.lock().closed = false;
        handle.set_timeout(config.timeout)?;
        Ok(Box::new(handle))
    }

    fn available_ports(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ports.lock().keys().cloned().collect();
        names.sort();
        names
    }
}
