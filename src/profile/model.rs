//! Profile data model and the pure rules that keep a profile set consistent.

use super::store::StoreError;
use crate::port::{Parity, StopBits};
use crate::state::PortConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Name of the protected profile that always exists.
pub const DEFAULT_PROFILE_NAME: &str = "Default";

/// Baud rates a profile may carry.
pub const SUPPORTED_BAUD_RATES: [u32; 8] =
    [9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600];

/// Data bit counts a profile may carry.
pub const SUPPORTED_DATA_BITS: [u8; 4] = [5, 6, 7, 8];

/// Failures of user-initiated profile operations.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Profile name cannot be empty.")]
    EmptyName,

    #[error("Cannot delete the Default profile.")]
    Protected,

    #[error("Profile '{0}' not found.")]
    NotFound(String),

    #[error("Profile '{name}' is invalid: {reason}")]
    Invalid { name: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Persisted serial settings. The profile's name is its key in the set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SerialProfile {
    pub port_name: Option<String>,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

impl Default for SerialProfile {
    fn default() -> Self {
        Self {
            port_name: None,
            baud_rate: 115200,
            data_bits: 8,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }
}

impl SerialProfile {
    /// Check baud rate and data bits against the supported values.
    pub fn validate(&self) -> Result<(), String> {
        if !SUPPORTED_BAUD_RATES.contains(&self.baud_rate) {
            return Err(format!("unsupported baud rate {}", self.baud_rate));
        }
        if !SUPPORTED_DATA_BITS.contains(&self.data_bits) {
            return Err(format!("unsupported data bits {}", self.data_bits));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Connection request for these settings. A missing port becomes an
    /// empty name, which the connection manager rejects.
    pub fn to_port_config(&self) -> PortConfig {
        PortConfig {
            port_name: self.port_name.clone().unwrap_or_default(),
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
        }
    }
}

fn default_profile_name() -> String {
    DEFAULT_PROFILE_NAME.to_string()
}

/// On-disk shape read leniently so one bad entry cannot sink the document.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawProfileSet {
    #[serde(default)]
    profiles: BTreeMap<String, serde_json::Value>,
    #[serde(default = "default_profile_name")]
    default_profile_name: String,
}

/// Every named profile plus the pointer to the one marked as default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProfileSet {
    #[serde(default)]
    pub profiles: BTreeMap<String, SerialProfile>,
    #[serde(default = "default_profile_name")]
    pub default_profile_name: String,
}

impl Default for ProfileSet {
    /// A set holding only the built-in `Default` profile.
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(DEFAULT_PROFILE_NAME.to_string(), SerialProfile::default());
        Self {
            profiles,
            default_profile_name: default_profile_name(),
        }
    }
}

impl ProfileSet {
    pub fn get(&self, name: &str) -> Option<&SerialProfile> {
        self.profiles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// Profile names in alphabetical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Parse a profile document entry by entry.
    ///
    /// An entry that does not deserialize (a value out of range for its
    /// field, a wrong type) or fails validation is dropped on its own; the
    /// rest of the document survives. Returns the set and the dropped names.
    /// `Default` is not added here, see [`ProfileSet::ensure_default`].
    ///
    /// # Errors
    ///
    /// Fails only when the document itself is not a profile document.
    pub fn from_json_filtered(json: &str) -> Result<(Self, Vec<String>), serde_json::Error> {
        let raw: RawProfileSet = serde_json::from_str(json)?;
        let mut set = Self {
            profiles: BTreeMap::new(),
            default_profile_name: raw.default_profile_name,
        };
        let mut dropped = Vec::new();
        for (name, value) in raw.profiles {
            match serde_json::from_value::<SerialProfile>(value) {
                Ok(profile) => {
                    set.profiles.insert(name, profile);
                }
                Err(_) => dropped.push(name),
            }
        }
        dropped.extend(set.drop_invalid());
        dropped.sort();
        Ok((set, dropped))
    }

    /// Remove entries with a blank name or unsupported settings.
    pub fn drop_invalid(&mut self) -> Vec<String> {
        let dropped: Vec<String> = self
            .profiles
            .iter()
            .filter(|(name, profile)| name.trim().is_empty() || !profile.is_valid())
            .map(|(name, _)| name.clone())
            .collect();
        for name in &dropped {
            self.profiles.remove(name);
        }
        dropped
    }

    /// Make sure `Default` exists and the default marker names a profile.
    pub fn ensure_default(&mut self) {
        self.profiles
            .entry(DEFAULT_PROFILE_NAME.to_string())
            .or_default();
        if !self.contains(&self.default_profile_name) {
            self.default_profile_name = default_profile_name();
        }
    }

    /// Drop invalid entries and restore the set's invariants.
    ///
    /// Afterwards `Default` exists and `default_profile_name` names an
    /// existing profile. Returns the names that were dropped.
    pub fn normalize(&mut self) -> Vec<String> {
        let dropped = self.drop_invalid();
        self.ensure_default();
        dropped
    }

    /// Insert or overwrite a profile. Returns the trimmed name it was stored under.
    pub fn upsert(&mut self, name: &str, profile: SerialProfile) -> Result<String, ProfileError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ProfileError::EmptyName);
        }
        profile.validate().map_err(|reason| ProfileError::Invalid {
            name: name.to_string(),
            reason,
        })?;
        self.profiles.insert(name.to_string(), profile);
        Ok(name.to_string())
    }

    /// Remove a profile. `Default` can never be removed.
    ///
    /// Removing the profile marked as default moves the pointer back to `Default`.
    pub fn remove(&mut self, name: &str) -> Result<SerialProfile, ProfileError> {
        if name == DEFAULT_PROFILE_NAME {
            return Err(ProfileError::Protected);
        }
        let removed = self
            .profiles
            .remove(name)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        if self.default_profile_name == name {
            self.default_profile_name = default_profile_name();
        }
        Ok(removed)
    }

    /// Point the default marker at an existing profile.
    pub fn mark_default(&mut self, name: &str) -> Result<(), ProfileError> {
        if !self.contains(name) {
            return Err(ProfileError::NotFound(name.to_string()));
        }
        self.default_profile_name = name.to_string();
        Ok(())
    }

    /// Profile to select when the current selection is gone.
    ///
    /// Priority: the configured default, then `Default`, then the
    /// alphabetically first profile. An empty set gets a fresh `Default`.
    pub fn fallback_selection(&mut self) -> String {
        if self.contains(&self.default_profile_name) {
            return self.default_profile_name.clone();
        }
        if self.contains(DEFAULT_PROFILE_NAME) {
            self.default_profile_name = default_profile_name();
            return default_profile_name();
        }
        if let Some(first) = self.profiles.keys().next() {
            return first.clone();
        }
        self.profiles
            .insert(DEFAULT_PROFILE_NAME.to_string(), SerialProfile::default());
        self.default_profile_name = default_profile_name();
        default_profile_name()
    }
}
