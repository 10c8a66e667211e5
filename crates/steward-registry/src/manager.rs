// SPDX-License-Identifier: Apache-2.0

//! Seam between the admin verbs and the platform service manager.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use steward_runtime::{Result, ServiceState, StatusSnapshot, StewardError};

/// Rights requested when opening a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Query,
    Start,
    Stop,
    Configure,
    Delete,
}

/// When the service manager starts the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartType {
    Auto,
    Demand,
    Disabled,
}

impl fmt::Display for StartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartType::Auto => write!(f, "auto"),
            StartType::Demand => write!(f, "demand"),
            StartType::Disabled => write!(f, "disabled"),
        }
    }
}

/// Registered configuration of a service entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryConfig {
    pub display_name: String,
    pub description: String,
    pub binary_path: String,
    pub start_type: StartType,
}

/// Live status of a service entry as the manager reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryStatus {
    pub state: ServiceState,
    pub exit_code: u32,
    pub checkpoint: u32,
    pub wait_hint_ms: u32,
}

impl EntryStatus {
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot::new(
            self.state,
            self.checkpoint,
            Duration::from_millis(u64::from(self.wait_hint_ms)),
        )
    }
}

/// Everything `query` prints about a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub name: String,
    pub status: EntryStatus,
    pub config: EntryConfig,
}

/// An open connection to the service manager.
pub trait ServiceManager {
    /// Entry handle; closed when dropped.
    type Entry: ServiceEntry;

    fn open_entry(&self, name: &str, access: Access) -> Result<Self::Entry>;
    fn create_entry(&self, name: &str, config: &EntryConfig) -> Result<Self::Entry>;
}

/// An open registry entry for one service.
pub trait ServiceEntry {
    fn query_status(&self) -> Result<EntryStatus>;
    fn query_config(&self) -> Result<EntryConfig>;
    fn start(&self) -> Result<()>;
    /// Sends the stop control code; returns the status the manager answered with.
    fn send_stop(&self) -> Result<EntryStatus>;
    fn set_start_type(&self, start_type: StartType) -> Result<()>;
    fn set_description(&self, title: &str, description: &str) -> Result<()>;
    fn delete(&self) -> Result<()>;
}

/// Stand-in manager for platforms without a service registry.
#[derive(Debug)]
pub struct UnsupportedManager {
    _private: (),
}

impl UnsupportedManager {
    pub fn connect() -> Result<Self> {
        Err(unsupported())
    }
}

/// Entry type of [`UnsupportedManager`]; cannot be constructed.
#[derive(Debug)]
pub enum NoEntry {}

impl ServiceManager for UnsupportedManager {
    type Entry = NoEntry;

    fn open_entry(&self, _name: &str, _access: Access) -> Result<NoEntry> {
        Err(unsupported())
    }

    fn create_entry(&self, _name: &str, _config: &EntryConfig) -> Result<NoEntry> {
        Err(unsupported())
    }
}

impl ServiceEntry for NoEntry {
    fn query_status(&self) -> Result<EntryStatus> {
        match *self {}
    }

    fn query_config(&self) -> Result<EntryConfig> {
        match *self {}
    }

    fn start(&self) -> Result<()> {
        match *self {}
    }

    fn send_stop(&self) -> Result<EntryStatus> {
        match *self {}
    }

    fn set_start_type(&self, _start_type: StartType) -> Result<()> {
        match *self {}
    }

    fn set_description(&self, _title: &str, _description: &str) -> Result<()> {
        match *self {}
    }

    fn delete(&self) -> Result<()> {
        match *self {}
    }
}

fn unsupported() -> StewardError {
    StewardError::registry("service registry is not supported on this platform", None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_runtime::ErrorKind;

    #[test]
    fn unsupported_manager_fails_with_registry_error() {
        let err = UnsupportedManager::connect().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Registry);
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn entry_status_converts_to_snapshot() {
        let status = EntryStatus {
            state: ServiceState::StartPending,
            exit_code: 0,
            checkpoint: 4,
            wait_hint_ms: 2500,
        };
        let snapshot = status.snapshot();
        assert_eq!(snapshot.checkpoint, 4);
        assert_eq!(snapshot.wait_hint, Duration::from_millis(2500));
    }

    #[test]
    fn start_types_display_lowercase() {
        assert_eq!(StartType::Auto.to_string(), "auto");
        assert_eq!(StartType::Disabled.to_string(), "disabled");
    }
}
