// SPDX-License-Identifier: Apache-2.0

//! Control loop, child supervision and status reporting for steward services.

pub mod control;
pub mod error;
pub mod signal;
pub mod status;
pub mod stop_signal;
pub mod supervisor;
pub mod waiter;

pub use control::{ControlOptions, ServiceControl};
pub use error::{ErrorKind, Result, StewardError};
pub use signal::{platform_interrupt, Interrupt};
pub use status::{LogStatusSink, ServiceState, StatusRecord, StatusReporter, StatusSink};
pub use stop_signal::{stop_signal_name, StopGuard, StopSignal};
pub use supervisor::{spawn, wait_any, ChildHandle, OutputSink, ProcessSpec, WaitOutcome};
pub use waiter::{poll_interval, wait_until, StatusSnapshot};

