// SPDX-License-Identifier: Apache-2.0

//! Administrative verbs: install, query, describe, enable, disable, delete,
//! start and stop.

use std::future::Future;

use steward_runtime::{wait_until, Result, ServiceState, StewardError};
use tracing::{debug, info};

use crate::config::ServiceDescriptor;
use crate::manager::{
    Access, EntryConfig, EntryInfo, EntryStatus, ServiceEntry, ServiceManager, StartType,
};

/// Result of attempting to start a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Result of attempting to stop a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    AlreadyStopped,
}

/// Runs admin verbs against one service manager connection.
pub struct ServiceAdmin<M> {
    manager: M,
}

impl<M: ServiceManager> ServiceAdmin<M> {
    pub fn new(manager: M) -> Self {
        ServiceAdmin { manager }
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// Opens `name`, hands the entry to `op`, and closes it when `op` is done.
    async fn with_entry<T, F, Fut>(&self, name: &str, access: Access, op: F) -> Result<T>
    where
        F: FnOnce(M::Entry) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let entry = self.manager.open_entry(name, access)?;
        debug!(service = name, ?access, "opened service entry");
        op(entry).await
    }

    /// Registers the service as a demand-start own-process service.
    pub fn install(&self, descriptor: &ServiceDescriptor, binary_path: &str) -> Result<()> {
        let config = EntryConfig {
            display_name: descriptor.title.clone(),
            description: descriptor.description.clone(),
            binary_path: binary_path.to_string(),
            start_type: StartType::Demand,
        };
        let entry = self.manager.create_entry(&descriptor.name, &config)?;
        entry.set_description(&descriptor.title, &descriptor.description)?;
        info!(service = %descriptor.name, binary = binary_path, "installed service");
        Ok(())
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.with_entry(name, Access::Delete, |entry| async move { entry.delete() })
            .await?;
        info!(service = name, "deleted service");
        Ok(())
    }

    /// Re-applies title and description from the descriptor.
    pub async fn describe(&self, descriptor: &ServiceDescriptor) -> Result<()> {
        self.with_entry(&descriptor.name, Access::Configure, |entry| async move {
            entry.set_description(&descriptor.title, &descriptor.description)
        })
        .await
    }

    pub async fn enable(&self, name: &str) -> Result<()> {
        self.set_start_type(name, StartType::Auto).await
    }

    pub async fn disable(&self, name: &str) -> Result<()> {
        self.set_start_type(name, StartType::Disabled).await
    }

    async fn set_start_type(&self, name: &str, start_type: StartType) -> Result<()> {
        self.with_entry(name, Access::Configure, |entry| async move {
            entry.set_start_type(start_type)
        })
        .await?;
        info!(service = name, %start_type, "changed start type");
        Ok(())
    }

    pub async fn query(&self, name: &str) -> Result<EntryInfo> {
        self.with_entry(name, Access::Query, |entry| async move { entry_info(name, &entry) })
            .await
    }

    /// Starts the service and waits until it leaves `StartPending`.
    pub async fn start(&self, name: &str) -> Result<StartOutcome> {
        self.with_entry(name, Access::Start, |entry| async move {
            start_entry(name, &entry).await
        })
        .await
    }

    /// Stops the service and waits until it is `Stopped`.
    pub async fn stop(&self, name: &str) -> Result<StopOutcome> {
        self.with_entry(name, Access::Stop, |entry| async move {
            stop_entry(name, &entry).await
        })
        .await
    }
}

fn entry_info<E: ServiceEntry>(name: &str, entry: &E) -> Result<EntryInfo> {
    Ok(EntryInfo {
        name: name.to_string(),
        status: entry.query_status()?,
        config: entry.query_config()?,
    })
}

async fn start_entry<E: ServiceEntry>(name: &str, entry: &E) -> Result<StartOutcome> {
    let resource = format!("service {name}");
    let poll = || entry.query_status().map(|s| s.snapshot());

    let settled = wait_until(&resource, poll, |state| !state.is_pending()).await?;
    if settled.state == ServiceState::Running {
        return Ok(StartOutcome::AlreadyRunning);
    }

    entry.start()?;
    info!(service = name, "start requested");

    let last = wait_until(&resource, poll, |state| state != ServiceState::StartPending).await?;
    if last.state != ServiceState::Running {
        return Err(not_reached(name, ServiceState::Running, &entry.query_status()?));
    }
    Ok(StartOutcome::Started)
}

async fn stop_entry<E: ServiceEntry>(name: &str, entry: &E) -> Result<StopOutcome> {
    if entry.query_status()?.state == ServiceState::Stopped {
        return Ok(StopOutcome::AlreadyStopped);
    }

    let resource = format!("service {name}");
    let poll = || entry.query_status().map(|s| s.snapshot());
    let settled = wait_until(&resource, poll, |state| !state.is_pending()).await?;
    if settled.state == ServiceState::Stopped {
        return Ok(StopOutcome::AlreadyStopped);
    }

    let answered = entry.send_stop()?;
    info!(service = name, state = %answered.state, "stop requested");

    wait_until(&resource, poll, |state| state == ServiceState::Stopped).await?;
    Ok(StopOutcome::Stopped)
}

fn not_reached(name: &str, wanted: ServiceState, status: &EntryStatus) -> StewardError {
    StewardError::registry(
        format!(
            "service {name} did not reach {wanted} (state {}, exit code {})",
            status.state, status.exit_code
        ),
        (status.exit_code != 0).then_some(status.exit_code),
    )
}
