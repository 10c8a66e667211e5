// SPDX-License-Identifier: Apache-2.0

//! Ctrl-C delivery through the child's console.
//!
//! A process can only raise console control events on the console it is
//! attached to, so the interrupt briefly moves this process onto the child's
//! console and back again.

use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};
use windows::Win32::System::Console::{
    AllocConsole, AttachConsole, FreeConsole, GenerateConsoleCtrlEvent, GetConsoleProcessList,
    SetConsoleCtrlHandler, CTRL_C_EVENT,
};

use super::Interrupt;
use crate::error::{Result, StewardError};

/// Console attachment is process-wide state.
static CONSOLE_LOCK: Mutex<()> = Mutex::new(());

/// Generates `CTRL_C_EVENT` on the child's console.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleInterrupt;

impl Interrupt for ConsoleInterrupt {
    fn interrupt(&self, pid: u32) -> Result<()> {
        if pid == 0 {
            return Err(signal_error(pid, "refusing to signal pid 0", None));
        }

        let _lock = CONSOLE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let peer = console_peer();

        // SAFETY: console calls only touch this process's console attachment,
        // which is serialized by CONSOLE_LOCK.
        let detached = unsafe { FreeConsole() }.is_ok();
        let result = unsafe { raise_ctrl_c(pid) };
        unsafe { restore_console(detached, peer) };

        if result.is_ok() {
            debug!(pid, "sent CTRL_C to child console");
        }
        result
    }
}

unsafe fn raise_ctrl_c(pid: u32) -> Result<()> {
    AttachConsole(pid).map_err(|e| signal_error(pid, "AttachConsole failed", Some(win32_code(&e))))?;
    if let Err(e) = SetConsoleCtrlHandler(None, true) {
        warn!(error = %e, "failed to ignore Ctrl-C while signalling");
    }
    GenerateConsoleCtrlEvent(CTRL_C_EVENT, 0)
        .map_err(|e| signal_error(pid, "GenerateConsoleCtrlEvent failed", Some(win32_code(&e))))
}

unsafe fn restore_console(detached: bool, peer: Option<u32>) {
    let _ = FreeConsole();
    if let Err(e) = SetConsoleCtrlHandler(None, false) {
        warn!(error = %e, "failed to restore Ctrl-C handling");
    }

    // A process that started without a console goes back to having none.
    let rejoined = detached && peer.is_some_and(|pid| AttachConsole(pid).is_ok());
    if needs_fresh_console(detached, rejoined) {
        if let Err(e) = AllocConsole() {
            warn!(error = %e, "failed to allocate a replacement console");
        }
    }
}

/// Only a console lost by detaching from it is replaced.
fn needs_fresh_console(detached: bool, rejoined: bool) -> bool {
    detached && !rejoined
}

/// Another process sharing our current console, used to re-join it later.
fn console_peer() -> Option<u32> {
    let own = std::process::id();
    let mut pids = [0u32; 64];
    // SAFETY: the buffer outlives the call and its length is passed along.
    let count = unsafe { GetConsoleProcessList(&mut pids) } as usize;
    pids[..count.min(pids.len())]
        .iter()
        .copied()
        .find(|pid| *pid != own && *pid != 0)
}

fn win32_code(err: &windows::core::Error) -> u32 {
    (err.code().0 as u32) & 0xFFFF
}

fn signal_error(pid: u32, reason: &str, code: Option<u32>) -> StewardError {
    StewardError::Signal {
        pid,
        reason: reason.to_string(),
        code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn pid_zero_is_rejected() {
        let err = ConsoleInterrupt.interrupt(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Signal);
    }

    #[test]
    fn console_is_replaced_only_when_detaching_lost_it() {
        assert!(needs_fresh_console(true, false));
        assert!(!needs_fresh_console(true, true));
        assert!(!needs_fresh_console(false, false));
    }

    #[test]
    fn win32_codes_are_extracted_from_hresults() {
        let err = windows::core::Error::from_hresult(windows::core::HRESULT(0x8007_0005u32 as i32));
        assert_eq!(win32_code(&err), 5);
    }
}
