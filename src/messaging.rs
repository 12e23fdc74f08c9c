//! Text/byte conversion for the send and receive paths, and the counters
//! and history shared between them.
//!
//! Hex mode renders every byte as two uppercase digits followed by one
//! space (`"0A 1B "`). Hex input may contain any whitespace between digits
//! but, once stripped, must be an even number of hex digits. ASCII mode maps
//! characters to bytes one to one.

use std::fmt;
use std::fmt::Write as _;
use thiserror::Error;

/// Errors raised while turning user text into bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("Invalid HEX format. Use pairs like: 0A 1B FF or 0A1BFF.")]
    InvalidHex,
    #[error("Nothing to send")]
    Empty,
}

/// How bytes are shown and how typed text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    #[default]
    Hex,
    Ascii,
}

impl DisplayMode {
    pub fn from_hex_flag(hex: bool) -> Self {
        if hex {
            DisplayMode::Hex
        } else {
            DisplayMode::Ascii
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayMode::Hex => f.write_str("HEX"),
            DisplayMode::Ascii => f.write_str("ASCII"),
        }
    }
}

/// Turn typed text into the bytes to send.
pub fn encode(text: &str, mode: DisplayMode) -> Result<Vec<u8>, FormatError> {
    if text.trim().is_empty() {
        return Err(FormatError::Empty);
    }
    match mode {
        DisplayMode::Hex => parse_hex(text),
        DisplayMode::Ascii => Ok(text
            .chars()
            .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
            .collect()),
    }
}

/// Render bytes for display.
pub fn decode(bytes: &[u8], mode: DisplayMode) -> String {
    match mode {
        DisplayMode::Hex => to_hex(bytes),
        DisplayMode::Ascii => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Parse whitespace-separated or packed hex digit pairs.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, FormatError> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return Err(FormatError::InvalidHex);
    }

    digits
        .chunks_exact(2)
        .map(|pair| Ok(hex_value(pair[0])? << 4 | hex_value(pair[1])?))
        .collect()
}

fn hex_value(digit: u8) -> Result<u8, FormatError> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        _ => Err(FormatError::InvalidHex),
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for byte in bytes {
        let _ = write!(out, "{byte:02X} ");
    }
    out
}

/// Canonical hex rendering of well-formed hex input.
///
/// `decode(&encode(x, Hex)?, Hex) == normalize_hex(x)?` for every input
/// `encode` accepts.
pub fn normalize_hex(input: &str) -> Result<String, FormatError> {
    parse_hex(input).map(|bytes| to_hex(&bytes))
}

/// Counters, mode and sent-message history shared by both directions.
#[derive(Debug, Clone, Default)]
pub struct MessagingState {
    mode: DisplayMode,
    bytes_sent: u64,
    bytes_received: u64,
    sent_messages: Vec<String>,
    received_text: String,
}

impl MessagingState {
    pub fn new(mode: DisplayMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    /// Switch mode. Text already rendered stays as it was.
    pub fn set_mode(&mut self, mode: DisplayMode) {
        self.mode = mode;
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn sent_messages(&self) -> &[String] {
        &self.sent_messages
    }

    pub fn received_text(&self) -> &str {
        &self.received_text
    }

    /// Encode typed text with the current mode.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, FormatError> {
        encode(text, self.mode)
    }

    /// Account for a completed send and return the `TX:` line.
    pub fn record_sent(&mut self, payload: &[u8]) -> String {
        self.bytes_sent += payload.len() as u64;
        let line = format!("TX: {}", decode(payload, self.mode).trim_end());
        self.sent_messages.push(line.clone());
        self.received_text.push_str(&line);
        self.received_text.push('\n');
        line
    }

    /// Account for a received chunk and return the `RX:` line.
    pub fn record_received(&mut self, chunk: &[u8]) -> String {
        self.bytes_received += chunk.len() as u64;
        let line = format!("RX: {}", decode(chunk, self.mode));
        self.received_text.push_str(&line);
        self.received_text.push('\n');
        line
    }

    /// Zero both counters and drop the sent history.
    pub fn reset_counts(&mut self) {
        self.bytes_sent = 0;
        self.bytes_received = 0;
        self.sent_messages.clear();
    }

    pub fn clear_received(&mut self) {
        self.received_text.clear();
    }
}
