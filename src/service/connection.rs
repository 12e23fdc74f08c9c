//! Connection state machine.
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Connected --disconnect--> Disconnected
//!                           Connecting --err-> Error
//!                                              Connected --read error--> Error
//! ```
//!
//! `Error` is left only through another `connect`.

use super::{PortService, ServiceError, ServiceResult, SharedPort};
use crate::port::PortOpener;
use crate::state::{ConnectionState, PortConfig, DEFAULT_READ_TIMEOUT_MS};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Owns at most one open serial port and its connection state.
pub struct ConnectionManager {
    opener: Arc<dyn PortOpener>,
    service: PortService,
    port: Option<SharedPort>,
    active: Option<PortConfig>,
    read_timeout: Duration,
    state: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(opener: Arc<dyn PortOpener>, service: PortService) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            opener,
            service,
            port: None,
            active: None,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            state,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Parameters of the open connection.
    pub fn active_config(&self) -> Option<&PortConfig> {
        self.active.as_ref()
    }

    pub fn service(&self) -> &PortService {
        &self.service
    }

    /// Ports the opener can currently reach.
    pub fn available_ports(&self) -> Vec<String> {
        self.opener.available_ports()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "connection state changed");
        }
    }

    /// Open the port described by `config` and make it the active connection.
    ///
    /// An already open connection is closed first. The device is opened on
    /// tokio's blocking pool; state changes happen on the caller. On any
    /// failure the state becomes `Error`, the handle is closed and nothing
    /// stays registered.
    ///
    /// # Errors
    ///
    /// - `ServiceError::NoPortSpecified` if the port name is empty
    /// - `ServiceError::InvalidConfig` if the parameters cannot be applied
    /// - `ServiceError::PortError` if the device fails to open
    pub async fn connect(&mut self, config: &PortConfig) -> ServiceResult<()> {
        if config.port_name.trim().is_empty() {
            self.set_state(ConnectionState::Error);
            warn!("connection attempt without a port");
            return Err(ServiceError::NoPortSpecified);
        }

        if self.port.is_some() {
            if let Err(e) = self.disconnect().await {
                warn!(error = %e, "closing previous connection failed");
            }
        }

        self.set_state(ConnectionState::Connecting);
        info!(port = %config.port_name, baud = config.baud_rate, "connecting");

        match self.open_and_register(config).await {
            Ok(port) => {
                self.port = Some(port);
                self.active = Some(config.clone());
                self.set_state(ConnectionState::Connected);
                info!(port = %config.port_name, "connected");
                Ok(())
            }
            Err(e) => {
                let _ = self.service.register(None);
                self.set_state(ConnectionState::Error);
                warn!(port = %config.port_name, error = %e, "connection failed");
                Err(e)
            }
        }
    }

    async fn open_and_register(&self, config: &PortConfig) -> ServiceResult<SharedPort> {
        let port_config = config
            .to_port_configuration(self.read_timeout)
            .map_err(|e| ServiceError::InvalidConfig(e.to_string()))?;

        let opener = Arc::clone(&self.opener);
        let name = config.port_name.clone();
        let adapter = tokio::task::spawn_blocking(move || opener.open(&name, &port_config))
            .await
            .map_err(|e| ServiceError::PortError(e.to_string()))?
            .map_err(|e| ServiceError::PortError(e.to_string()))?;

        let port: SharedPort = Arc::new(Mutex::new(adapter));
        if let Err(e) = self.service.register(Some(Arc::clone(&port))) {
            if let Err(close_error) = close_port(port).await {
                debug!(error = %close_error, "closing unregistered handle");
            }
            return Err(e);
        }
        Ok(port)
    }

    /// Close the active connection. Does nothing when no port is open.
    ///
    /// The handle is unregistered at once and closed on tokio's blocking
    /// pool. The state always ends `Disconnected`; a close error is still
    /// returned so the caller can report it.
    pub async fn disconnect(&mut self) -> ServiceResult<()> {
        let Some(port) = self.port.take() else {
            return Ok(());
        };

        let name = self
            .active
            .take()
            .map(|c| c.port_name)
            .unwrap_or_default();
        info!(port = %name, "disconnecting");

        let _ = self.service.register(None);
        let closed = close_port(port).await;
        self.set_state(ConnectionState::Disconnected);

        match closed {
            Ok(()) => {
                info!(port = %name, "disconnected");
                Ok(())
            }
            Err(e) => {
                warn!(port = %name, error = %e, "error while closing port");
                Err(ServiceError::CloseFailed(e))
            }
        }
    }

    /// Send bytes through the active connection.
    pub async fn send(&self, data: Vec<u8>) -> ServiceResult<usize> {
        self.service.send(data).await
    }

    /// React to the receive loop stopping on a device error.
    pub async fn handle_read_failure(&mut self, reason: &str) {
        let Some(port) = self.port.take() else {
            return;
        };
        warn!(reason, "connection lost");
        self.active = None;
        let _ = self.service.register(None);
        if let Err(e) = close_port(port).await {
            debug!(error = %e, "closing failed handle");
        }
        self.set_state(ConnectionState::Error);
    }
}

/// Close `port` off the async worker. A flush on close may block.
async fn close_port(port: SharedPort) -> Result<(), String> {
    match tokio::task::spawn_blocking(move || port.lock().close()).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(port) = self.port.take() {
            let _ = self.service.register(None);
            if let Err(e) = port.lock().close() {
                debug!(error = %e, "closing port on drop");
            }
        }
    }
}
