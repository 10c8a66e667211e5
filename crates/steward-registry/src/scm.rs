// SPDX-License-Identifier: Apache-2.0

//! Windows Service Control Manager backend.

use std::ffi::c_void;

use steward_runtime::{Result, ServiceState, StatusRecord, StatusSink, StewardError};
use tracing::debug;
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::System::Services::{
    ChangeServiceConfig2W, ChangeServiceConfigW, CloseServiceHandle, ControlService,
    CreateServiceW, DeleteService, OpenSCManagerW, OpenServiceW, QueryServiceConfig2W,
    QueryServiceConfigW, QueryServiceStatus, SetServiceStatus, StartServiceW,
    ENUM_SERVICE_TYPE, QUERY_SERVICE_CONFIGW, SC_HANDLE, SERVICE_AUTO_START,
    SERVICE_CONFIG_DESCRIPTION, SERVICE_DEMAND_START, SERVICE_DESCRIPTIONW, SERVICE_DISABLED,
    SERVICE_ERROR, SERVICE_ERROR_NORMAL, SERVICE_RUNNING, SERVICE_START_PENDING,
    SERVICE_START_TYPE, SERVICE_STATUS, SERVICE_STATUS_CURRENT_STATE, SERVICE_STATUS_HANDLE,
    SERVICE_STOPPED, SERVICE_STOP_PENDING, SERVICE_WIN32_OWN_PROCESS,
};

use crate::manager::{Access, EntryConfig, EntryStatus, ServiceEntry, ServiceManager, StartType};

const SC_MANAGER_CONNECT: u32 = 0x0001;
const SC_MANAGER_CREATE_SERVICE: u32 = 0x0002;
const SERVICE_QUERY_CONFIG: u32 = 0x0001;
const SERVICE_CHANGE_CONFIG: u32 = 0x0002;
const SERVICE_QUERY_STATUS: u32 = 0x0004;
const SERVICE_START: u32 = 0x0010;
const SERVICE_STOP: u32 = 0x0020;
const DELETE: u32 = 0x0001_0000;
const SERVICE_ALL_ACCESS: u32 = 0x000F_01FF;
const SERVICE_NO_CHANGE: u32 = 0xFFFF_FFFF;
const SERVICE_ACCEPT_STOP: u32 = 0x0001;
const SERVICE_CONTROL_STOP: u32 = 0x0001;
const ERROR_ACCESS_DENIED: u32 = 5;
const ERROR_INSUFFICIENT_BUFFER: u32 = 122;

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Win32 error code carried by a `windows` crate error.
pub fn win32_code(err: &windows::core::Error) -> u32 {
    (err.code().0 as u32) & 0xFFFF
}

fn scm_error(context: impl Into<String>, err: &windows::core::Error) -> StewardError {
    let context = context.into();
    StewardError::registry(format!("{context}: {}", err.message()), Some(win32_code(err)))
}

unsafe fn pwstr_to_string(p: PWSTR) -> String {
    if p.is_null() {
        String::new()
    } else {
        p.to_string().unwrap_or_default()
    }
}

/// Connection to the local service control manager.
pub struct ScmManager {
    handle: SC_HANDLE,
}

impl ScmManager {
    /// Connects with create rights when allowed, read-only rights otherwise.
    pub fn connect() -> Result<Self> {
        // SAFETY: null machine and database names select the local active database.
        let handle = unsafe {
            match OpenSCManagerW(
                PCWSTR::null(),
                PCWSTR::null(),
                SC_MANAGER_CONNECT | SC_MANAGER_CREATE_SERVICE,
            ) {
                Err(e) if win32_code(&e) == ERROR_ACCESS_DENIED => {
                    OpenSCManagerW(PCWSTR::null(), PCWSTR::null(), SC_MANAGER_CONNECT)
                }
                other => other,
            }
        }
        .map_err(|e| scm_error("failed to open service control manager", &e))?;
        Ok(ScmManager { handle })
    }
}

impl Drop for ScmManager {
    fn drop(&mut self) {
        // SAFETY: the handle came from OpenSCManagerW and is closed once.
        let _ = unsafe { CloseServiceHandle(self.handle) };
    }
}

fn rights(access: Access) -> u32 {
    match access {
        Access::Query => SERVICE_QUERY_STATUS | SERVICE_QUERY_CONFIG,
        Access::Start => SERVICE_START | SERVICE_QUERY_STATUS,
        Access::Stop => SERVICE_STOP | SERVICE_QUERY_STATUS,
        Access::Configure => SERVICE_CHANGE_CONFIG | SERVICE_QUERY_CONFIG,
        Access::Delete => DELETE,
    }
}

fn start_type_code(start_type: StartType) -> SERVICE_START_TYPE {
    match start_type {
        StartType::Auto => SERVICE_AUTO_START,
        StartType::Demand => SERVICE_DEMAND_START,
        StartType::Disabled => SERVICE_DISABLED,
    }
}

fn start_type_from_code(code: SERVICE_START_TYPE) -> StartType {
    if code == SERVICE_AUTO_START {
        StartType::Auto
    } else if code == SERVICE_DISABLED {
        StartType::Disabled
    } else {
        StartType::Demand
    }
}

fn state_from_code(code: SERVICE_STATUS_CURRENT_STATE) -> ServiceState {
    match code {
        SERVICE_START_PENDING => ServiceState::StartPending,
        SERVICE_STOP_PENDING => ServiceState::StopPending,
        SERVICE_STOPPED => ServiceState::Stopped,
        _ => ServiceState::Running,
    }
}

fn state_code(state: ServiceState) -> SERVICE_STATUS_CURRENT_STATE {
    match state {
        ServiceState::StartPending => SERVICE_START_PENDING,
        ServiceState::Running => SERVICE_RUNNING,
        ServiceState::StopPending => SERVICE_STOP_PENDING,
        ServiceState::Stopped => SERVICE_STOPPED,
    }
}

fn entry_status(raw: &SERVICE_STATUS) -> EntryStatus {
    EntryStatus {
        state: state_from_code(raw.dwCurrentState),
        exit_code: raw.dwWin32ExitCode,
        checkpoint: raw.dwCheckPoint,
        wait_hint_ms: raw.dwWaitHint,
    }
}

impl ServiceManager for ScmManager {
    type Entry = ScmEntry;

    fn open_entry(&self, name: &str, access: Access) -> Result<ScmEntry> {
        let wname = wide(name);
        // SAFETY: `wname` is NUL-terminated and outlives the call.
        let handle = unsafe { OpenServiceW(self.handle, PCWSTR(wname.as_ptr()), rights(access)) }
            .map_err(|e| scm_error(format!("failed to open service {name}"), &e))?;
        Ok(ScmEntry {
            name: name.to_string(),
            handle,
        })
    }

    fn create_entry(&self, name: &str, config: &EntryConfig) -> Result<ScmEntry> {
        let wname = wide(name);
        let wdisplay = wide(&config.display_name);
        let wbinary = wide(&config.binary_path);
        // SAFETY: all strings are NUL-terminated and outlive the call.
        let handle = unsafe {
            CreateServiceW(
                self.handle,
                PCWSTR(wname.as_ptr()),
                PCWSTR(wdisplay.as_ptr()),
                SERVICE_ALL_ACCESS,
                SERVICE_WIN32_OWN_PROCESS,
                start_type_code(config.start_type),
                SERVICE_ERROR_NORMAL,
                PCWSTR(wbinary.as_ptr()),
                PCWSTR::null(),
                None,
                PCWSTR::null(),
                PCWSTR::null(),
                PCWSTR::null(),
            )
        }
        .map_err(|e| scm_error(format!("failed to create service {name}"), &e))?;
        debug!(service = name, "created service entry");
        Ok(ScmEntry {
            name: name.to_string(),
            handle,
        })
    }
}

/// Open handle to one registered service.
pub struct ScmEntry {
    name: String,
    handle: SC_HANDLE,
}

impl Drop for ScmEntry {
    fn drop(&mut self) {
        // SAFETY: the handle came from OpenServiceW/CreateServiceW and is closed once.
        let _ = unsafe { CloseServiceHandle(self.handle) };
    }
}

impl ScmEntry {
    fn error(&self, what: &str, err: &windows::core::Error) -> StewardError {
        scm_error(format!("failed to {what} service {}", self.name), err)
    }

    fn query_description(&self) -> Result<String> {
        let mut needed = 0u32;
        // SAFETY: a None buffer only asks for the required size.
        let probe = unsafe {
            QueryServiceConfig2W(self.handle, SERVICE_CONFIG_DESCRIPTION, None, &mut needed)
        };
        match probe {
            Err(e) if win32_code(&e) == ERROR_INSUFFICIENT_BUFFER => {}
            Err(e) => return Err(self.error("query description of", &e)),
            Ok(()) => return Ok(String::new()),
        }

        let mut buf = vec![0u64; (needed as usize).div_ceil(8)];
        // SAFETY: the buffer is 8-byte aligned and at least `needed` bytes long.
        unsafe {
            let bytes = std::slice::from_raw_parts_mut(buf.as_mut_ptr().cast::<u8>(), buf.len() * 8);
            QueryServiceConfig2W(
                self.handle,
                SERVICE_CONFIG_DESCRIPTION,
                Some(bytes),
                &mut needed,
            )
            .map_err(|e| self.error("query description of", &e))?;
            let desc = &*(buf.as_ptr().cast::<SERVICE_DESCRIPTIONW>());
            Ok(pwstr_to_string(desc.lpDescription))
        }
    }
}

impl ServiceEntry for ScmEntry {
    fn query_status(&self) -> Result<EntryStatus> {
        let mut raw = SERVICE_STATUS::default();
        // SAFETY: `raw` is a valid out-pointer for the duration of the call.
        unsafe { QueryServiceStatus(self.handle, &mut raw) }
            .map_err(|e| self.error("query status of", &e))?;
        Ok(entry_status(&raw))
    }

    fn query_config(&self) -> Result<EntryConfig> {
        let mut needed = 0u32;
        // SAFETY: a None buffer only asks for the required size.
        let probe = unsafe { QueryServiceConfigW(self.handle, None, 0, &mut needed) };
        if let Err(e) = probe {
            if win32_code(&e) != ERROR_INSUFFICIENT_BUFFER {
                return Err(self.error("query config of", &e));
            }
        }

        let mut buf = vec![0u64; (needed as usize).div_ceil(8).max(1)];
        let size = (buf.len() * 8) as u32;
        // SAFETY: the buffer is aligned for QUERY_SERVICE_CONFIGW and `size` bytes long;
        // the string pointers it receives point into the same buffer.
        let (display_name, binary_path, start_type) = unsafe {
            let config = buf.as_mut_ptr().cast::<QUERY_SERVICE_CONFIGW>();
            QueryServiceConfigW(self.handle, Some(config), size, &mut needed)
                .map_err(|e| self.error("query config of", &e))?;
            let config = &*config;
            (
                pwstr_to_string(config.lpDisplayName),
                pwstr_to_string(config.lpBinaryPathName),
                start_type_from_code(config.dwStartType),
            )
        };

        Ok(EntryConfig {
            display_name,
            description: self.query_description()?,
            binary_path,
            start_type,
        })
    }

    fn start(&self) -> Result<()> {
        // SAFETY: no service arguments are passed.
        unsafe { StartServiceW(self.handle, None) }.map_err(|e| self.error("start", &e))
    }

    fn send_stop(&self) -> Result<EntryStatus> {
        let mut raw = SERVICE_STATUS::default();
        // SAFETY: `raw` is a valid out-pointer for the duration of the call.
        unsafe { ControlService(self.handle, SERVICE_CONTROL_STOP, &mut raw) }
            .map_err(|e| self.error("stop", &e))?;
        Ok(entry_status(&raw))
    }

    fn set_start_type(&self, start_type: StartType) -> Result<()> {
        // SAFETY: null strings and SERVICE_NO_CHANGE leave every other field untouched.
        unsafe {
            ChangeServiceConfigW(
                self.handle,
                ENUM_SERVICE_TYPE(SERVICE_NO_CHANGE),
                start_type_code(start_type),
                SERVICE_ERROR(SERVICE_NO_CHANGE),
                PCWSTR::null(),
                PCWSTR::null(),
                None,
                PCWSTR::null(),
                PCWSTR::null(),
                PCWSTR::null(),
                PCWSTR::null(),
            )
        }
        .map_err(|e| self.error("change start type of", &e))
    }

    fn set_description(&self, title: &str, description: &str) -> Result<()> {
        let wtitle = wide(title);
        // SAFETY: `wtitle` is NUL-terminated and outlives the call.
        unsafe {
            ChangeServiceConfigW(
                self.handle,
                ENUM_SERVICE_TYPE(SERVICE_NO_CHANGE),
                SERVICE_START_TYPE(SERVICE_NO_CHANGE),
                SERVICE_ERROR(SERVICE_NO_CHANGE),
                PCWSTR::null(),
                PCWSTR::null(),
                None,
                PCWSTR::null(),
                PCWSTR::null(),
                PCWSTR::null(),
                PCWSTR(wtitle.as_ptr()),
            )
        }
        .map_err(|e| self.error("change title of", &e))?;

        let mut wdesc = wide(description);
        let info = SERVICE_DESCRIPTIONW {
            lpDescription: PWSTR(wdesc.as_mut_ptr()),
        };
        // SAFETY: `info` and the string it points to outlive the call.
        unsafe {
            ChangeServiceConfig2W(
                self.handle,
                SERVICE_CONFIG_DESCRIPTION,
                Some(std::ptr::from_ref(&info).cast::<c_void>()),
            )
        }
        .map_err(|e| self.error("change description of", &e))
    }

    fn delete(&self) -> Result<()> {
        // SAFETY: the handle was opened with DELETE rights.
        unsafe { DeleteService(self.handle) }.map_err(|e| self.error("delete", &e))
    }
}

/// Status sink that forwards records to the SCM through `SetServiceStatus`.
pub struct ScmStatusSink {
    handle: SERVICE_STATUS_HANDLE,
}

impl ScmStatusSink {
    /// Wraps the handle returned by `RegisterServiceCtrlHandlerExW`.
    pub fn new(handle: SERVICE_STATUS_HANDLE) -> Self {
        ScmStatusSink { handle }
    }
}

impl StatusSink for ScmStatusSink {
    fn set_status(&mut self, record: &StatusRecord) -> Result<()> {
        let raw = SERVICE_STATUS {
            dwServiceType: SERVICE_WIN32_OWN_PROCESS,
            dwCurrentState: state_code(record.state),
            dwControlsAccepted: if record.accepts_stop {
                SERVICE_ACCEPT_STOP
            } else {
                0
            },
            dwWin32ExitCode: record.exit_code,
            dwServiceSpecificExitCode: 0,
            dwCheckPoint: record.checkpoint,
            dwWaitHint: record.wait_hint_ms,
        };
        // SAFETY: the status handle stays valid until the service reports Stopped.
        unsafe { SetServiceStatus(self.handle, &raw) }
            .map_err(|e| scm_error(format!("failed to report {}", record.state), &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_round_trip_through_scm_codes() {
        for state in [
            ServiceState::StartPending,
            ServiceState::Running,
            ServiceState::StopPending,
            ServiceState::Stopped,
        ] {
            assert_eq!(state_from_code(state_code(state)), state);
        }
    }

    #[test]
    fn wide_strings_are_nul_terminated() {
        assert_eq!(wide("ab"), vec![u16::from(b'a'), u16::from(b'b'), 0]);
    }
}
