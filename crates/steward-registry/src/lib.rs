// SPDX-License-Identifier: Apache-2.0

//! Service configuration and service-manager registry operations.

pub mod admin;
pub mod config;
pub mod manager;
#[cfg(windows)]
pub mod scm;

pub use admin::{ServiceAdmin, StartOutcome, StopOutcome};
pub use config::{default_config_path, ServiceConfig, ServiceDescriptor, BASEPATH_ENV, CONFIG_ENV};
pub use manager::{
    Access, EntryConfig, EntryInfo, EntryStatus, ServiceEntry, ServiceManager, StartType,
    UnsupportedManager,
};

/// Service manager of the current platform.
#[cfg(windows)]
pub type PlatformManager = scm::ScmManager;
/// Service manager of the current platform.
#[cfg(not(windows))]
pub type PlatformManager = UnsupportedManager;

/// Connects to the platform service manager.
pub fn connect() -> steward_runtime::Result<ServiceAdmin<PlatformManager>> {
    PlatformManager::connect().map(ServiceAdmin::new)
}
