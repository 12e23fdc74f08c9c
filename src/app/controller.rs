//! The console's single consumer loop.
//!
//! Every mutation of connection, messaging, profile selection and
//! notification state happens in [`Controller::handle`], one event at a time.
//! Background producers (stdin, the receive loop, the profile watcher) only
//! send [`AppEvent`]s.

use super::command::{Command, HELP};
use crate::error::AppResult;
use crate::messaging::{DisplayMode, MessagingState};
use crate::notification::{self, NotificationLog, NotificationSink};
use crate::profile::{
    ProfileError, ProfileManager, ReloadOutcome, SerialProfile, SUPPORTED_BAUD_RATES,
    SUPPORTED_DATA_BITS,
};
use crate::service::{ConnectionManager, SerialEvent, ServiceError};
use crate::state::ConnectionState;
use std::sync::Arc;
use tracing::debug;

/// Input to the consumer loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Command(Command),
    Serial(SerialEvent),
    ProfilesChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Controller {
    connection: ConnectionManager,
    profiles: Arc<ProfileManager>,
    messaging: MessagingState,
    sink: NotificationSink,
    log: NotificationLog,
    draft: SerialProfile,
    last_error: Option<String>,
    output: Vec<String>,
}

impl Controller {
    pub fn new(
        connection: ConnectionManager,
        profiles: Arc<ProfileManager>,
        mode: DisplayMode,
        notification_capacity: usize,
    ) -> Self {
        let (sink, log) = notification::channel(notification_capacity);
        let draft = profiles.selected_profile();
        Self {
            connection,
            profiles,
            messaging: MessagingState::new(mode),
            sink,
            log,
            draft,
            last_error: None,
            output: Vec::new(),
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn profiles(&self) -> &ProfileManager {
        &self.profiles
    }

    pub fn messaging(&self) -> &MessagingState {
        &self.messaging
    }

    pub fn notifications(&self) -> &NotificationLog {
        &self.log
    }

    /// Sink for producers outside the loop. Their posts are applied on the next event.
    pub fn sink(&self) -> NotificationSink {
        self.sink.clone()
    }

    /// Settings being edited, applied by `:connect` and `:save`.
    pub fn draft(&self) -> &SerialProfile {
        &self.draft
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Lines produced since the last call, for the console to print.
    pub fn drain_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    fn print(&mut self, line: impl Into<String>) {
        self.output.push(line.into());
    }

    fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.sink.error(message.clone());
        self.last_error = Some(message);
    }

    /// Process one event.
    pub async fn handle(&mut self, event: AppEvent) -> Flow {
        let flow = match event {
            AppEvent::Command(command) => self.execute(command).await,
            AppEvent::Serial(event) => {
                self.on_serial(event).await;
                Flow::Continue
            }
            AppEvent::ProfilesChanged => {
                let outcome = self.reload().await;
                self.report_reload(outcome, false);
                Flow::Continue
            }
        };
        self.log.sync();
        flow
    }

    async fn execute(&mut self, command: Command) -> Flow {
        debug!(?command, "executing");
        match command {
            Command::Connect => self.connect().await,
            Command::Disconnect => self.disconnect().await,
            Command::SetPort(name) => {
                self.draft.port_name = name;
                let shown = self.draft.port_name.clone().unwrap_or_else(|| "(none)".to_string());
                self.print(format!("Port: {shown}"));
            }
            Command::SetBaud(rate) => {
                if SUPPORTED_BAUD_RATES.contains(&rate) {
                    self.draft.baud_rate = rate;
                    self.print(format!("Baud rate: {rate}"));
                } else {
                    self.fail(format!("Unsupported baud rate {rate}."));
                }
            }
            Command::SetDataBits(bits) => {
                if SUPPORTED_DATA_BITS.contains(&bits) {
                    self.draft.data_bits = bits;
                    self.print(format!("Data bits: {bits}"));
                } else {
                    self.fail(format!("Unsupported data bits {bits}."));
                }
            }
            Command::SetStopBits(bits) => {
                self.draft.stop_bits = bits;
                self.print(format!("Stop bits: {bits}"));
            }
            Command::SetParity(parity) => {
                self.draft.parity = parity;
                self.print(format!("Parity: {parity}"));
            }
            Command::ListProfiles => self.list_profiles(),
            Command::Select(name) => match self.profiles.select(&name) {
                Ok(profile) => {
                    self.draft = profile;
                    self.print(format!("Selected profile '{name}'."));
                }
                Err(e) => self.fail(e.to_string()),
            },
            Command::Save(name) => self.save(name, false).await,
            Command::MarkDefault(name) => self.save(name, true).await,
            Command::Delete(name) => self.delete(name).await,
            Command::Reload => {
                let outcome = self.reload().await;
                self.report_reload(outcome, true);
            }
            Command::HexMode => self.set_mode(DisplayMode::Hex),
            Command::AsciiMode => self.set_mode(DisplayMode::Ascii),
            Command::ResetCounts => {
                self.messaging.reset_counts();
                self.print("Counters reset.");
            }
            Command::ClearReceived => {
                self.messaging.clear_received();
                self.print("Received text cleared.");
            }
            Command::Stats => self.stats(),
            Command::Notifications => {
                self.log.sync();
                let lines: Vec<String> = self.log.messages().map(ToString::to_string).collect();
                if lines.is_empty() {
                    self.print("No notifications.");
                }
                self.output.extend(lines);
            }
            Command::Ports => {
                let ports = self.connection.available_ports();
                if ports.is_empty() {
                    self.print("No serial ports found.");
                }
                self.output.extend(ports);
            }
            Command::Help => self.print(HELP),
            Command::Quit => {
                self.disconnect_quietly().await;
                return Flow::Quit;
            }
            Command::Send(text) => self.send(&text).await,
        }
        Flow::Continue
    }

    async fn connect(&mut self) {
        let config = self.draft.to_port_config();
        match self.connection.connect(&config).await {
            Ok(()) => {
                self.last_error = None;
                self.sink.info(format!("Connected to {config}."));
                // The profile follows the settings that actually worked.
                let name = self.profiles.selected();
                let draft = self.draft.clone();
                if let Err(e) = self
                    .with_profiles(move |profiles| profiles.save_profile(&name, draft))
                    .await
                {
                    self.sink.warn(format!("Connected, but the profile was not saved: {e}"));
                }
            }
            Err(ServiceError::NoPortSpecified) => self.fail("Select a port before connecting."),
            Err(e) => self.fail(format!("Connection failed: {e}")),
        }
    }

    async fn disconnect(&mut self) {
        if !self.connection.is_connected() {
            self.print("Not connected.");
            return;
        }
        match self.connection.disconnect().await {
            Ok(()) => self.sink.info("Disconnected."),
            Err(e) => self.sink.warn(e.to_string()),
        }
    }

    async fn disconnect_quietly(&mut self) {
        if let Err(e) = self.connection.disconnect().await {
            debug!(error = %e, "disconnect on exit");
        }
    }

    async fn send(&mut self, text: &str) {
        let payload = match self.messaging.encode(text) {
            Ok(payload) => payload,
            Err(e) => return self.fail(e.to_string()),
        };
        match self.connection.send(payload.clone()).await {
            Ok(_) => {
                let line = self.messaging.record_sent(&payload);
                self.print(line);
            }
            Err(e) => self.fail(e.to_string()),
        }
    }

    async fn on_serial(&mut self, event: SerialEvent) {
        // Events queued by a handle that has since been replaced or closed.
        if !self.connection.service().is_current(&event) {
            debug!(registration = event.registration(), "dropping stale serial event");
            return;
        }
        match event {
            SerialEvent::DataReceived { data, .. } => {
                let line = self.messaging.record_received(&data);
                self.print(line);
            }
            SerialEvent::ReadFailed { reason, .. } => {
                self.connection.handle_read_failure(&reason).await;
                self.fail(format!("Connection lost: {reason}"));
            }
        }
    }

    fn set_mode(&mut self, mode: DisplayMode) {
        self.messaging.set_mode(mode);
        self.print(format!("Mode: {mode}"));
    }

    fn list_profiles(&mut self) {
        let selected = self.profiles.selected();
        let default = self.profiles.default_name();
        let snapshot = self.profiles.snapshot();
        for (name, profile) in &snapshot.profiles {
            let marker = if *name == selected { '>' } else { ' ' };
            let default_tag = if *name == default { " (default)" } else { "" };
            let port = profile.port_name.as_deref().unwrap_or("-");
            self.print(format!(
                "{marker} {name}{default_tag}: {port} {} {}/{}/{}",
                profile.baud_rate, profile.data_bits, profile.parity, profile.stop_bits
            ));
        }
    }

    fn stats(&mut self) {
        let port = self
            .connection
            .active_config()
            .map(|c| c.port_name.clone())
            .unwrap_or_else(|| "-".to_string());
        let lines = vec![
            format!("State: {}", self.connection.state()),
            format!("Port: {port}"),
            format!("Profile: {}", self.profiles.selected()),
            format!("Mode: {}", self.messaging.mode()),
            format!("Bytes sent: {}", self.messaging.bytes_sent()),
            format!("Bytes received: {}", self.messaging.bytes_received()),
            format!("Messages sent: {}", self.messaging.sent_messages().len()),
            format!("Last error: {}", self.last_error.as_deref().unwrap_or("-")),
        ];
        self.output.extend(lines);
    }

    async fn save(&mut self, name: Option<String>, mark_default: bool) {
        let name = name.unwrap_or_else(|| self.profiles.selected());
        let draft = self.draft.clone();
        let result = self
            .with_profiles(move |profiles| {
                if mark_default {
                    profiles.mark_default(&name, draft)
                } else {
                    profiles.save_profile(&name, draft)
                }
            })
            .await;
        match result {
            Ok(saved) if mark_default => {
                self.sink.info(format!("Profile '{saved}' saved and marked as default."))
            }
            Ok(saved) => self.sink.info(format!("Profile '{saved}' saved.")),
            Err(e) => self.fail(format!("Save failed: {e}")),
        }
    }

    async fn delete(&mut self, name: Option<String>) {
        let name = name.unwrap_or_else(|| self.profiles.selected());
        let target = name.clone();
        match self
            .with_profiles(move |profiles| profiles.delete(&target))
            .await
        {
            Ok(selected) => {
                self.draft = self.profiles.selected_profile();
                self.sink
                    .info(format!("Profile '{name}' deleted. Selected '{selected}'."));
            }
            Err(e) => self.fail(e.to_string()),
        }
    }

    async fn reload(&mut self) -> ReloadOutcome {
        let profiles = Arc::clone(&self.profiles);
        match tokio::task::spawn_blocking(move || profiles.reload_from_disk()).await {
            Ok(outcome) => outcome,
            Err(e) => ReloadOutcome::Failed(e.to_string()),
        }
    }

    fn report_reload(&mut self, outcome: ReloadOutcome, requested: bool) {
        match outcome {
            ReloadOutcome::Skipped => {
                if requested {
                    self.print("Reload skipped while a delete is in progress.");
                }
            }
            ReloadOutcome::Missing => self
                .sink
                .warn("Profile file is missing; keeping the profiles in memory."),
            ReloadOutcome::Failed(reason) => {
                self.sink.warn(format!("Profile reload failed: {reason}"))
            }
            ReloadOutcome::Reloaded {
                selected,
                selection_changed,
                dropped,
            } => {
                for name in dropped {
                    self.sink.warn(format!("Ignored invalid profile '{name}'."));
                }
                if selection_changed {
                    self.draft = self.profiles.selected_profile();
                    self.sink.info(format!(
                        "Selected profile was removed; switched to '{selected}'."
                    ));
                } else if requested {
                    self.sink.info("Profiles reloaded.");
                }
            }
        }
    }

    /// Run a blocking profile operation off the loop.
    async fn with_profiles<T, F>(&self, op: F) -> AppResult<T>
    where
        F: FnOnce(&ProfileManager) -> Result<T, ProfileError> + Send + 'static,
        T: Send + 'static,
    {
        let profiles = Arc::clone(&self.profiles);
        Ok(tokio::task::spawn_blocking(move || op(&profiles)).await??)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{MockPortOpener, MockSerialPort};
    use crate::profile::ProfileStore;
    use crate::service::PortService;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct Fixture {
        controller: Controller,
        device: MockSerialPort,
        _events: mpsc::Receiver<SerialEvent>,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::in_directory(dir.path())
            .with_lock_dir(dir.path())
            .with_lock_name("controller.test");
        let profiles = Arc::new(ProfileManager::open(store));

        let (tx, rx) = mpsc::channel(16);
        let opener = MockPortOpener::new();
        let device = opener.add_port("MOCK0");
        let connection = ConnectionManager::new(Arc::new(opener), PortService::new(tx));

        Fixture {
            controller: Controller::new(connection, profiles, DisplayMode::Hex, 100),
            device,
            _events: rx,
            _dir: dir,
        }
    }

    impl Fixture {
        fn current_registration(&self) -> u64 {
            self.controller
                .connection()
                .service()
                .current_registration()
                .unwrap()
        }
    }

    async fn run(controller: &mut Controller, line: &str) -> Flow {
        let command = Command::parse(line).unwrap().unwrap();
        controller.handle(AppEvent::Command(command)).await
    }

    #[tokio::test]
    async fn test_send_while_disconnected_changes_nothing() {
        let mut f = fixture();
        run(&mut f.controller, "01 02").await;
        assert_eq!(f.controller.messaging().bytes_sent(), 0);
        assert_eq!(f.controller.last_error(), Some("Serial port is not open"));
        assert_eq!(f.controller.notifications().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_send_and_receive() {
        let mut f = fixture();
        run(&mut f.controller, ":port MOCK0").await;
        run(&mut f.controller, ":connect").await;
        assert_eq!(f.controller.state(), ConnectionState::Connected);

        f.controller.drain_output();
        run(&mut f.controller, "0A FF").await;
        assert_eq!(f.device.written_bytes(), vec![0x0A, 0xFF]);
        assert_eq!(f.controller.messaging().bytes_sent(), 2);

        let registration = f.current_registration();
        f.controller
            .handle(AppEvent::Serial(SerialEvent::DataReceived {
                registration,
                data: b"OK".to_vec(),
            }))
            .await;
        assert_eq!(
            f.controller.drain_output(),
            vec!["TX: 0A FF".to_string(), "RX: 4F 4B ".to_string()]
        );
    }

    #[tokio::test]
    async fn test_connect_persists_draft_into_selected_profile() {
        let mut f = fixture();
        run(&mut f.controller, ":port MOCK0").await;
        run(&mut f.controller, ":baud 57600").await;
        run(&mut f.controller, ":connect").await;

        let saved = f.controller.profiles().store().read().unwrap();
        let default = saved.get("Default").unwrap();
        assert_eq!(default.port_name.as_deref(), Some("MOCK0"));
        assert_eq!(default.baud_rate, 57600);
    }

    #[tokio::test]
    async fn test_ascii_text_in_hex_mode_is_rejected() {
        let mut f = fixture();
        run(&mut f.controller, ":port MOCK0").await;
        run(&mut f.controller, ":connect").await;
        f.controller
            .handle(AppEvent::Command(Command::Send("AT\r\n".to_string())))
            .await;
        assert!(f.device.written_bytes().is_empty());
        assert_eq!(f.controller.messaging().bytes_sent(), 0);
        assert!(f.controller.last_error().unwrap().starts_with("Invalid HEX"));
    }

    #[tokio::test]
    async fn test_connect_without_port_sets_error() {
        let mut f = fixture();
        run(&mut f.controller, ":connect").await;
        assert_eq!(f.controller.state(), ConnectionState::Error);
        assert_eq!(f.controller.last_error(), Some("Select a port before connecting."));
    }

    #[tokio::test]
    async fn test_read_failure_reports_lost_connection() {
        let mut f = fixture();
        run(&mut f.controller, ":port MOCK0").await;
        run(&mut f.controller, ":connect").await;
        let registration = f.current_registration();
        f.controller
            .handle(AppEvent::Serial(SerialEvent::ReadFailed {
                registration,
                reason: "unplugged".to_string(),
            }))
            .await;
        assert_eq!(f.controller.state(), ConnectionState::Error);
        assert!(f.controller.last_error().unwrap().contains("unplugged"));
    }

    #[tokio::test]
    async fn test_events_from_previous_connection_are_ignored() {
        let mut f = fixture();
        run(&mut f.controller, ":port MOCK0").await;
        run(&mut f.controller, ":connect").await;
        let old = f.current_registration();
        run(&mut f.controller, ":disconnect").await;
        run(&mut f.controller, ":connect").await;
        f.controller.drain_output();

        f.controller
            .handle(AppEvent::Serial(SerialEvent::ReadFailed {
                registration: old,
                reason: "old handle".to_string(),
            }))
            .await;
        f.controller
            .handle(AppEvent::Serial(SerialEvent::DataReceived {
                registration: old,
                data: b"late".to_vec(),
            }))
            .await;

        assert_eq!(f.controller.state(), ConnectionState::Connected);
        assert_eq!(f.controller.last_error(), None);
        assert_eq!(f.controller.messaging().bytes_received(), 0);
        assert!(f.controller.drain_output().is_empty());
    }

    #[tokio::test]
    async fn test_events_after_disconnect_are_ignored() {
        let mut f = fixture();
        run(&mut f.controller, ":port MOCK0").await;
        run(&mut f.controller, ":connect").await;
        let old = f.current_registration();
        run(&mut f.controller, ":disconnect").await;

        f.controller
            .handle(AppEvent::Serial(SerialEvent::DataReceived {
                registration: old,
                data: b"late".to_vec(),
            }))
            .await;
        assert_eq!(f.controller.messaging().bytes_received(), 0);
        assert_eq!(f.controller.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_profile_commands() {
        let mut f = fixture();
        run(&mut f.controller, ":baud 9600").await;
        run(&mut f.controller, ":save Lab").await;
        assert_eq!(f.controller.profiles().selected(), "Lab");

        run(&mut f.controller, ":default").await;
        assert_eq!(f.controller.profiles().default_name(), "Lab");

        run(&mut f.controller, ":delete Default").await;
        assert_eq!(
            f.controller.last_error(),
            Some("Cannot delete the Default profile.")
        );

        run(&mut f.controller, ":delete Lab").await;
        assert_eq!(f.controller.profiles().selected(), "Default");
        assert_eq!(f.controller.draft().baud_rate, 115200);
    }

    #[tokio::test]
    async fn test_external_removal_switches_draft() {
        let mut f = fixture();
        run(&mut f.controller, ":baud 9600").await;
        run(&mut f.controller, ":save Lab").await;

        let store = f.controller.profiles().store().clone();
        let mut external = store.read().unwrap();
        external.remove("Lab").unwrap();
        store.save(&external).unwrap();

        f.controller.handle(AppEvent::ProfilesChanged).await;
        assert_eq!(f.controller.profiles().selected(), "Default");
        assert_eq!(f.controller.draft().baud_rate, 115200);
    }

    #[tokio::test]
    async fn test_unsupported_settings_rejected() {
        let mut f = fixture();
        run(&mut f.controller, ":baud 1234").await;
        run(&mut f.controller, ":databits 9").await;
        assert_eq!(f.controller.draft().baud_rate, 115200);
        assert_eq!(f.controller.draft().data_bits, 8);
    }

    #[tokio::test]
    async fn test_quit_disconnects() {
        let mut f = fixture();
        run(&mut f.controller, ":port MOCK0").await;
        run(&mut f.controller, ":connect").await;
        assert_eq!(run(&mut f.controller, ":quit").await, Flow::Quit);
        assert!(f.device.was_closed());
    }
}
