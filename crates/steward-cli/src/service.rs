//! Service control dispatcher glue for the Windows service manager.

use std::ffi::c_void;
use std::path::PathBuf;
use std::sync::OnceLock;

use steward_registry::scm::{win32_code, ScmStatusSink};
use steward_registry::ServiceConfig;
use steward_runtime::{
    platform_interrupt, stop_signal_name, OutputSink, ServiceControl, ServiceState,
    StatusReporter, StewardError, StopSignal,
};
use tracing::{error, info};
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::System::Services::{
    RegisterServiceCtrlHandlerExW, StartServiceCtrlDispatcherW, SERVICE_TABLE_ENTRYW,
};

use crate::logging::{init_logging, LogLevel, LogTarget};

const ERROR_FAILED_SERVICE_CONTROLLER_CONNECT: u32 = 1063;
const ERROR_CALL_NOT_IMPLEMENTED: u32 = 120;
const NO_ERROR: u32 = 0;
const SERVICE_CONTROL_STOP: u32 = 0x0001;
const SERVICE_CONTROL_INTERROGATE: u32 = 0x0004;
const SERVICE_CONTROL_SHUTDOWN: u32 = 0x0005;

struct Launch {
    config_path: PathBuf,
    log_level: Option<LogLevel>,
}

static LAUNCH: OnceLock<Launch> = OnceLock::new();
/// Name the manager started us under; the control handler finds the latch by it.
static SERVICE_NAME: OnceLock<String> = OnceLock::new();

/// Hands the process to the service control dispatcher.
///
/// Returns `Ok(false)` when the process was not started by the service
/// manager and should run in the foreground instead.
pub fn dispatch(config_path: &std::path::Path, log_level: Option<LogLevel>) -> steward_runtime::Result<bool> {
    let _ = LAUNCH.set(Launch {
        config_path: config_path.to_path_buf(),
        log_level,
    });

    // The name is ignored for own-process services.
    let mut name: Vec<u16> = vec![0];
    let table = [
        SERVICE_TABLE_ENTRYW {
            lpServiceName: PWSTR(name.as_mut_ptr()),
            lpServiceProc: Some(service_main),
        },
        SERVICE_TABLE_ENTRYW::default(),
    ];

    // SAFETY: the table is NUL-terminated and outlives the blocking call.
    match unsafe { StartServiceCtrlDispatcherW(table.as_ptr()) } {
        Ok(()) => Ok(true),
        Err(e) if win32_code(&e) == ERROR_FAILED_SERVICE_CONTROLLER_CONNECT => Ok(false),
        Err(e) => Err(StewardError::registry(
            format!("failed to start service dispatcher: {}", e.message()),
            Some(win32_code(&e)),
        )),
    }
}

unsafe extern "system" fn service_main(argc: u32, argv: *mut PWSTR) {
    let Some(launch) = LAUNCH.get() else {
        return;
    };
    let scm_name = if argc > 0 && !argv.is_null() {
        (*argv).to_string().unwrap_or_default()
    } else {
        String::new()
    };
    let name = SERVICE_NAME.get_or_init(|| scm_name).clone();

    let wname: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
    let Ok(handle) =
        RegisterServiceCtrlHandlerExW(PCWSTR(wname.as_ptr()), Some(control_handler), None)
    else {
        return;
    };
    let sink = ScmStatusSink::new(handle);

    let config = match ServiceConfig::load(&launch.config_path) {
        Ok(config) => config,
        Err(e) => {
            report_failure(sink, &e);
            return;
        }
    };

    match config.open_log() {
        Ok(file) => init_logging(launch.log_level, config.log_level.as_deref(), LogTarget::File(file)),
        Err(e) => {
            report_failure(sink, &e);
            return;
        }
    }
    let child_log = match config.open_log() {
        Ok(file) => file,
        Err(e) => {
            error!(error = %e, "failed to open service log for the child");
            report_failure(sink, &e);
            return;
        }
    };

    info!(service = %name, config = %launch.config_path.display(), "service starting");
    let mut control = ServiceControl::new(
        name,
        config.process_spec(),
        config.options,
        sink,
        platform_interrupt(),
    );
    let _ = control.block_on_run(OutputSink::File(child_log));
}

fn report_failure(sink: ScmStatusSink, err: &StewardError) {
    let mut reporter = StatusReporter::new(sink);
    let _ = reporter.report(ServiceState::Stopped, err.code(), 0);
}

unsafe extern "system" fn control_handler(
    control: u32,
    _event_type: u32,
    _event_data: *mut c_void,
    _context: *mut c_void,
) -> u32 {
    match control {
        SERVICE_CONTROL_STOP | SERVICE_CONTROL_SHUTDOWN => {
            if let Some(stop) = SERVICE_NAME
                .get()
                .and_then(|name| StopSignal::open(&stop_signal_name(name)))
            {
                stop.set();
            }
            NO_ERROR
        }
        SERVICE_CONTROL_INTERROGATE => NO_ERROR,
        _ => ERROR_CALL_NOT_IMPLEMENTED,
    }
}
