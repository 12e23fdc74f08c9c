//! Shared test utilities for serialdesk integration tests.
//!
//! This module provides common test infrastructure including:
//! - Isolated profile stores in temporary directories
//! - A console harness wired to a mock serial device
//! - JSON assertion and polling helpers

#![allow(dead_code)]

use serde_json::Value;
use serialdesk::app::{self, AppEvent, Command, Controller, Flow};
use serialdesk::config::Config;
use serialdesk::port::{MockPortOpener, MockSerialPort};
use serialdesk::profile::{ProfileManager, ProfileStore, SerialProfile};
use serialdesk::service::SerialEvent;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Name of the mock device every harness starts with.
pub const MOCK_PORT: &str = "MOCK0";

/// A profile store whose file, backups and lock all live in a fresh temp dir.
///
/// Each store gets its own lock name so parallel tests never contend.
pub fn temp_store() -> (TempDir, ProfileStore) {
    let dir = TempDir::new().expect("create temp dir");
    let store = ProfileStore::in_directory(dir.path())
        .with_lock_dir(dir.path())
        .with_lock_name(format!("serialdesk.test.{}", Uuid::new_v4()));
    (dir, store)
}

/// Profile with the given port and baud rate and 8/N/1 framing.
pub fn profile(port: &str, baud_rate: u32) -> SerialProfile {
    SerialProfile {
        port_name: Some(port.to_string()),
        baud_rate,
        ..SerialProfile::default()
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}

/// Read the persisted profile file as raw JSON.
pub fn read_json(store: &ProfileStore) -> Value {
    let content = std::fs::read_to_string(store.path()).expect("read profile file");
    serde_json::from_str(&content).expect("profile file is JSON")
}

/// A console controller backed by a mock device and a temp profile store.
pub struct ConsoleHarness {
    pub controller: Controller,
    pub serial_rx: mpsc::Receiver<SerialEvent>,
    pub opener: MockPortOpener,
    pub device: MockSerialPort,
    pub profiles: Arc<ProfileManager>,
    pub dir: TempDir,
}

impl ConsoleHarness {
    pub fn new() -> Self {
        let (dir, store) = temp_store();
        let profiles = Arc::new(ProfileManager::open(store));
        let opener = MockPortOpener::new();
        let device = opener.add_port(MOCK_PORT);

        let mut config = Config::default();
        config.serial.read_timeout_ms = 20;
        let (controller, serial_rx) =
            app::build_controller(&config, Arc::new(opener.clone()), Arc::clone(&profiles));

        Self {
            controller,
            serial_rx,
            opener,
            device,
            profiles,
            dir,
        }
    }

    /// Feed one console line through the parser and the controller.
    pub async fn line(&mut self, line: &str) -> Flow {
        let command = Command::parse(line)
            .expect("line parses")
            .expect("line is not blank");
        self.controller.handle(AppEvent::Command(command)).await
    }

    /// Point the draft at the mock device and connect.
    pub async fn connect(&mut self) {
        self.line(&format!(":port {MOCK_PORT}")).await;
        self.line(":connect").await;
    }

    /// Wait for the next receive-loop event and hand it to the controller.
    pub async fn pump_serial(&mut self, timeout: Duration) -> Option<SerialEvent> {
        let event = tokio::time::timeout(timeout, self.serial_rx.recv())
            .await
            .ok()
            .flatten()?;
        self.controller
            .handle(AppEvent::Serial(event.clone()))
            .await;
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_stores_are_isolated() {
        let (_a_dir, a) = temp_store();
        let (_b_dir, b) = temp_store();
        assert_ne!(a.path(), b.path());
        assert_ne!(a.lock_name(), b.lock_name());
    }
}
