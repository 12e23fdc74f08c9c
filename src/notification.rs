//! User-visible status messages.
//!
//! Producers on any thread hold a cloneable [`NotificationSink`]. The
//! bounded [`NotificationLog`] is owned by the console loop, which applies
//! pending posts with [`NotificationLog::sync`], so the queue is only ever
//! mutated from that one place.

use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Most messages kept by default.
pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationLevel::Info => f.write_str("INFO"),
            NotificationLevel::Warning => f.write_str("WARN"),
            NotificationLevel::Error => f.write_str("ERROR"),
        }
    }
}

/// A timestamped message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    timestamp: DateTime<Local>,
    level: NotificationLevel,
    text: String,
}

impl NotificationMessage {
    pub fn new(text: impl Into<String>, level: NotificationLevel) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            text: text.into(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn level(&self) -> NotificationLevel {
        self.level
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for NotificationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {:<5} {}",
            self.timestamp.format("%H:%M:%S"),
            self.level,
            self.text
        )
    }
}

/// Create a connected sink/log pair.
pub fn channel(capacity: usize) -> (NotificationSink, NotificationLog) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        NotificationSink { tx },
        NotificationLog {
            rx,
            messages: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        },
    )
}

/// Posting side. Cheap to clone, safe to use from any thread.
#[derive(Debug, Clone)]
pub struct NotificationSink {
    tx: mpsc::UnboundedSender<NotificationMessage>,
}

impl NotificationSink {
    /// Queue a message for the log and mirror it to the tracing output.
    pub fn post(&self, text: impl Into<String>, level: NotificationLevel) {
        let message = NotificationMessage::new(text, level);
        match level {
            NotificationLevel::Info => info!(target: "notification", "{}", message.text),
            NotificationLevel::Warning => warn!(target: "notification", "{}", message.text),
            NotificationLevel::Error => error!(target: "notification", "{}", message.text),
        }
        // The log is gone only during shutdown.
        let _ = self.tx.send(message);
    }

    pub fn info(&self, text: impl Into<String>) {
        self.post(text, NotificationLevel::Info);
    }

    pub fn warn(&self, text: impl Into<String>) {
        self.post(text, NotificationLevel::Warning);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.post(text, NotificationLevel::Error);
    }
}

/// Bounded FIFO of the most recent messages.
#[derive(Debug)]
pub struct NotificationLog {
    rx: mpsc::UnboundedReceiver<NotificationMessage>,
    messages: VecDeque<NotificationMessage>,
    capacity: usize,
}

impl NotificationLog {
    /// Apply every pending post, evicting the oldest entries beyond capacity.
    ///
    /// Returns the newly applied messages, oldest first.
    pub fn sync(&mut self) -> Vec<NotificationMessage> {
        let mut applied = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            self.messages.push_back(message.clone());
            applied.push(message);
        }
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
        applied
    }

    pub fn messages(&self) -> impl Iterator<Item = &NotificationMessage> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
