//! Serial connection layer.
//!
//! Two pieces cooperate here:
//!
//! ```text
//! console ──> ConnectionManager ──open──> PortOpener ──> PortAdapter
//!                    │
//!                    └─register──> PortService ──reader thread──> mpsc<SerialEvent>
//!                                      └─send (spawn_blocking)
//! ```
//!
//! `ConnectionManager` owns the opened handle and the connection state
//! machine. `PortService` only forwards: it reads through a cloned handle on
//! a background thread and writes through the shared one. Registering a new
//! handle stops forwarding from the previous one without closing it.

mod connection;

pub use connection::ConnectionManager;

use crate::port::{PortAdapter, PortError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default number of bytes requested per read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Sleep between polls when the device reports no data without blocking.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// An opened port shared between the owner and the forwarding service.
pub type SharedPort = Arc<Mutex<PortAdapter>>;

// ========== Error Types ==========

/// Errors raised by connection and send operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Operation requires an open port
    PortNotOpen,
    /// Connect was requested without a port name
    NoPortSpecified,
    /// Connection parameters cannot be applied
    InvalidConfig(String),
    /// The device could not be opened or registered
    PortError(String),
    /// Writing to the device failed
    SendFailed(String),
    /// The device reported an error while closing
    CloseFailed(String),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PortNotOpen => write!(f, "Serial port is not open"),
            Self::NoPortSpecified => write!(f, "No port selected"),
            Self::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Self::PortError(msg) => write!(f, "Port operation failed: {}", msg),
            Self::SendFailed(msg) => write!(f, "Failed to send data: {}", msg),
            Self::CloseFailed(msg) => write!(f, "Error during disconnect: {}", msg),
        }
    }
}

impl std::error::Error for ServiceError {}

/// Convenient Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

// ========== Events ==========

/// Events produced by the receive loop.
///
/// Chunk boundaries are whatever the driver returned; they carry no
/// message framing. `registration` identifies the handle that produced
/// the event so events queued by a replaced handle can be told apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialEvent {
    /// A non-empty chunk of received bytes
    DataReceived { registration: u64, data: Vec<u8> },
    /// The receive loop stopped on a device error
    ReadFailed { registration: u64, reason: String },
}

impl SerialEvent {
    /// Id of the registration whose receive loop sent this event.
    pub fn registration(&self) -> u64 {
        match self {
            SerialEvent::DataReceived { registration, .. }
            | SerialEvent::ReadFailed { registration, .. } => *registration,
        }
    }
}

// ========== Forwarding Service ==========

struct Registration {
    id: u64,
    port: SharedPort,
    name: String,
    stop: Arc<AtomicBool>,
}

/// Forwards received bytes and sends bytes for the single registered port.
#[derive(Clone)]
pub struct PortService {
    registration: Arc<Mutex<Option<Registration>>>,
    next_id: Arc<AtomicU64>,
    events: mpsc::Sender<SerialEvent>,
    read_buffer_size: usize,
}

impl PortService {
    /// Create a service that publishes receive events on `events`.
    pub fn new(events: mpsc::Sender<SerialEvent>) -> Self {
        Self {
            registration: Arc::new(Mutex::new(None)),
            next_id: Arc::new(AtomicU64::new(1)),
            events,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Register `port` as the single active connection, or unregister with `None`.
    ///
    /// Any previous registration stops forwarding immediately; its handle
    /// stays open and remains the responsibility of whoever opened it.
    /// Every registration gets a fresh id that tags its events.
    ///
    /// # Errors
    ///
    /// - `ServiceError::PortError` if the handle cannot be cloned for the
    ///   receive loop or the loop cannot be started. Nothing stays
    ///   registered in that case.
    pub fn register(&self, port: Option<SharedPort>) -> ServiceResult<()> {
        let mut slot = self.registration.lock();
        if let Some(previous) = slot.take() {
            previous.stop.store(true, Ordering::Release);
            debug!(port = %previous.name, "stopped forwarding");
        }

        let Some(port) = port else {
            return Ok(());
        };

        let (reader, name) = {
            let guard = port.lock();
            let reader = guard
                .try_clone_port()
                .map_err(|e| ServiceError::PortError(e.to_string()))?;
            (reader, guard.name().to_string())
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let stop = Arc::new(AtomicBool::new(false));
        let forwarder = Forwarder {
            registration: id,
            stop: Arc::clone(&stop),
            events: self.events.clone(),
        };
        let buffer_size = self.read_buffer_size;
        thread::Builder::new()
            .name(format!("serial-rx-{name}"))
            .spawn(move || receive_loop(reader, forwarder, buffer_size))
            .map_err(|e| ServiceError::PortError(e.to_string()))?;

        debug!(port = %name, registration = id, "forwarding received data");
        *slot = Some(Registration {
            id,
            port,
            name,
            stop,
        });
        Ok(())
    }

    /// Id of the current registration, if any.
    pub fn current_registration(&self) -> Option<u64> {
        self.registration.lock().as_ref().map(|r| r.id)
    }

    /// Whether `event` came from the currently registered handle.
    pub fn is_current(&self, event: &SerialEvent) -> bool {
        self.current_registration() == Some(event.registration())
    }

    /// Whether a port is currently registered.
    pub fn is_registered(&self) -> bool {
        self.registration.lock().is_some()
    }

    /// Name of the registered port, if any.
    pub fn registered_port(&self) -> Option<String> {
        self.registration.lock().as_ref().map(|r| r.name.clone())
    }

    /// Write `data` to the registered port and return the byte count.
    ///
    /// The blocking write runs on tokio's blocking pool.
    ///
    /// # Errors
    ///
    /// - `ServiceError::PortNotOpen` if no port is registered
    /// - `ServiceError::SendFailed` if the device rejects the write
    pub async fn send(&self, data: Vec<u8>) -> ServiceResult<usize> {
        let port = self
            .registration
            .lock()
            .as_ref()
            .map(|r| Arc::clone(&r.port))
            .ok_or(ServiceError::PortNotOpen)?;

        if data.is_empty() {
            return Ok(0);
        }

        tokio::task::spawn_blocking(move || write_all(&port, &data))
            .await
            .map_err(|e| ServiceError::SendFailed(e.to_string()))?
    }
}

fn write_all(port: &SharedPort, data: &[u8]) -> ServiceResult<usize> {
    let mut port = port.lock();
    let mut offset = 0;
    while offset < data.len() {
        let written = port
            .write_bytes(&data[offset..])
            .map_err(|e| ServiceError::SendFailed(e.to_string()))?;
        if written == 0 {
            return Err(ServiceError::SendFailed(
                "device accepted no bytes".to_string(),
            ));
        }
        offset += written;
    }
    Ok(offset)
}

/// Receive-loop side of one registration.
struct Forwarder {
    registration: u64,
    stop: Arc<AtomicBool>,
    events: mpsc::Sender<SerialEvent>,
}

impl Forwarder {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn data(&self, data: Vec<u8>) -> bool {
        self.events
            .blocking_send(SerialEvent::DataReceived {
                registration: self.registration,
                data,
            })
            .is_ok()
    }

    fn failed(&self, reason: String) {
        let _ = self.events.blocking_send(SerialEvent::ReadFailed {
            registration: self.registration,
            reason,
        });
    }
}

fn receive_loop(mut port: PortAdapter, forwarder: Forwarder, buffer_size: usize) {
    let mut buffer = vec![0u8; buffer_size];
    loop {
        if forwarder.stopped() {
            break;
        }
        let result = port.read_bytes(&mut buffer);
        // Nothing is forwarded once unregistered, including a read that was in flight.
        if forwarder.stopped() {
            break;
        }

        match result {
            Ok(0) => thread::sleep(READ_POLL_INTERVAL),
            Ok(n) => {
                if !forwarder.data(buffer[..n].to_vec()) {
                    break;
                }
            }
            Err(e) if e.is_no_data() => {
                if matches!(&e, PortError::Io(io) if io.kind() == std::io::ErrorKind::WouldBlock) {
                    thread::sleep(READ_POLL_INTERVAL);
                }
            }
            Err(e) => {
                warn!(port = port.name(), error = %e, "receive loop stopped");
                forwarder.failed(e.to_string());
                break;
            }
        }
    }
    debug!(port = port.name(), "receive loop exited");
}

// ========== Tests ==========
