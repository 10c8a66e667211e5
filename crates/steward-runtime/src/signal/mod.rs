// SPDX-License-Identifier: Apache-2.0

//! Cooperative interrupt delivery to the supervised child.

use crate::error::Result;

#[cfg(unix)]
mod process_group;
#[cfg(windows)]
mod console;

#[cfg(unix)]
pub use process_group::ProcessGroupInterrupt;
#[cfg(windows)]
pub use console::ConsoleInterrupt;

/// Delivers an interrupt-style shutdown request to a process.
///
/// Implementations must not kill the process; forced termination is the
/// supervisor's job.
pub trait Interrupt {
    fn interrupt(&self, pid: u32) -> Result<()>;
}

impl<I: Interrupt + ?Sized> Interrupt for Box<I> {
    fn interrupt(&self, pid: u32) -> Result<()> {
        (**self).interrupt(pid)
    }
}

/// Interrupt backend for the current platform.
pub fn platform_interrupt() -> Box<dyn Interrupt + Send + Sync> {
    #[cfg(unix)]
    {
        Box::new(ProcessGroupInterrupt)
    }

    #[cfg(windows)]
    {
        Box::new(ConsoleInterrupt)
    }

    #[cfg(not(any(unix, windows)))]
    {
        Box::new(Unsupported)
    }
}

#[cfg(not(any(unix, windows)))]
struct Unsupported;

#[cfg(not(any(unix, windows)))]
impl Interrupt for Unsupported {
    fn interrupt(&self, pid: u32) -> Result<()> {
        Err(crate::error::StewardError::Signal {
            pid,
            reason: "interrupts are not supported on this platform".to_string(),
            code: None,
        })
    }
}
