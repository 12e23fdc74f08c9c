//! Console input parsing.
//!
//! Lines starting with `:` are commands. A line starting with `::` sends the
//! rest with one leading `:`. Anything else that is not blank is data.

use crate::port::{Parity, StopBits};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Disconnect,
    SetPort(Option<String>),
    SetBaud(u32),
    SetDataBits(u8),
    SetStopBits(StopBits),
    SetParity(Parity),
    ListProfiles,
    Select(String),
    Save(Option<String>),
    MarkDefault(Option<String>),
    Delete(Option<String>),
    Reload,
    HexMode,
    AsciiMode,
    ResetCounts,
    ClearReceived,
    Stats,
    Notifications,
    Ports,
    Help,
    Quit,
    Send(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command ':{0}'. Type :help for a list of commands.")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid value '{value}': {reason}")]
    InvalidValue { value: String, reason: String },
}

pub const HELP: &str = "\
Commands:
  :connect               open the port in the current settings
  :disconnect            close the port
  :port [name]           set the port (no name clears it)
  :baud <rate>           set the baud rate
  :databits <5-8>        set the data bits
  :stopbits <One|OnePointFive|Two>
  :parity <None|Odd|Even|Mark|Space>
  :profiles              list profiles
  :select <name>         load a profile into the settings
  :save [name]           save the settings as a profile
  :default [name]        save the settings and mark the profile as default
  :delete [name]         delete a profile
  :reload                re-read the profile file
  :hex / :ascii          switch the send/receive format
  :reset                 zero the byte counters
  :clear                 clear the received text
  :stats                 show connection and counters
  :notifications         show recent notifications
  :ports                 list serial ports
  :help                  show this text
  :quit                  exit
Any other line is sent. Start a line with :: to send a leading ':'.";

impl Command {
    /// Parse one console line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix(':') else {
            return Ok(Some(Command::Send(line.to_string())));
        };
        if rest.starts_with(':') {
            return Ok(Some(Command::Send(rest.to_string())));
        }

        let rest = rest.trim();
        let (word, arg) = match rest.split_once(char::is_whitespace) {
            Some((word, arg)) => (word, Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (rest, None),
        };
        let owned = || arg.map(str::to_string);

        let command = match word.to_ascii_lowercase().as_str() {
            "connect" => Command::Connect,
            "disconnect" => Command::Disconnect,
            "port" => Command::SetPort(owned()),
            "baud" => Command::SetBaud(parse_number(arg, ":baud <rate>")?),
            "databits" => Command::SetDataBits(parse_number(arg, ":databits <5-8>")?),
            "stopbits" => Command::SetStopBits(parse_value(
                arg,
                ":stopbits <One|OnePointFive|Two>",
            )?),
            "parity" => Command::SetParity(parse_value(
                arg,
                ":parity <None|Odd|Even|Mark|Space>",
            )?),
            "profiles" => Command::ListProfiles,
            "select" => Command::Select(arg.ok_or(CommandError::Usage(":select <name>"))?.to_string()),
            "save" => Command::Save(owned()),
            "default" => Command::MarkDefault(owned()),
            "delete" => Command::Delete(owned()),
            "reload" => Command::Reload,
            "hex" => Command::HexMode,
            "ascii" => Command::AsciiMode,
            "reset" => Command::ResetCounts,
            "clear" => Command::ClearReceived,
            "stats" => Command::Stats,
            "notifications" => Command::Notifications,
            "ports" => Command::Ports,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            _ => return Err(CommandError::Unknown(word.to_string())),
        };
        Ok(Some(command))
    }
}

fn parse_number<T: std::str::FromStr>(arg: Option<&str>, usage: &'static str) -> Result<T, CommandError> {
    let value = arg.ok_or(CommandError::Usage(usage))?;
    value.parse().map_err(|_| CommandError::InvalidValue {
        value: value.to_string(),
        reason: "not a number".to_string(),
    })
}

fn parse_value<T>(arg: Option<&str>, usage: &'static str) -> Result<T, CommandError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value = arg.ok_or(CommandError::Usage(usage))?;
    value.parse().map_err(|e: T::Err| CommandError::InvalidValue {
        value: value.to_string(),
        reason: e.to_string(),
    })
}
