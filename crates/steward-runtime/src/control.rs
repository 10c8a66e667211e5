// SPDX-License-Identifier: Apache-2.0

//! Service control loop: `StartPending -> Running -> StopPending -> Stopped`.

use std::io;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::{Result, StewardError, NO_ERROR};
use crate::signal::Interrupt;
use crate::status::{ServiceState, StatusReporter, StatusSink};
use crate::stop_signal::{stop_signal_name, StopSignal};
use crate::supervisor::{spawn, wait_any, ChildHandle, OutputSink, ProcessSpec, WaitOutcome};
use crate::waiter::{wait_until, StatusSnapshot};

pub const DEFAULT_START_WAIT_HINT: Duration = Duration::from_millis(3000);
pub const DEFAULT_STOP_WAIT_HINT: Duration = Duration::from_millis(10_000);

/// Wait hints advertised while starting and stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlOptions {
    pub start_wait_hint: Duration,
    pub stop_wait_hint: Duration,
}

impl Default for ControlOptions {
    fn default() -> Self {
        ControlOptions {
            start_wait_hint: DEFAULT_START_WAIT_HINT,
            stop_wait_hint: DEFAULT_STOP_WAIT_HINT,
        }
    }
}

/// Drives one service run from the first status report to the last.
pub struct ServiceControl<S, I> {
    name: String,
    spec: ProcessSpec,
    options: ControlOptions,
    reporter: StatusReporter<S>,
    interrupt: I,
}

impl<S: StatusSink, I: Interrupt> ServiceControl<S, I> {
    pub fn new(
        name: impl Into<String>,
        spec: ProcessSpec,
        options: ControlOptions,
        sink: S,
        interrupt: I,
    ) -> Self {
        ServiceControl {
            name: name.into(),
            spec,
            options,
            reporter: StatusReporter::new(sink),
            interrupt,
        }
    }

    pub fn reporter(&self) -> &StatusReporter<S> {
        &self.reporter
    }

    /// Runs the control loop on a current-thread runtime owned by the caller's thread.
    pub fn block_on_run(&mut self, output: OutputSink) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                StewardError::resource(
                    "failed to build tokio runtime",
                    io::Error::other(e.to_string()),
                )
            })?;
        runtime.block_on(self.run(output))
    }

    /// Runs the service until the child exits or a stop is requested.
    ///
    /// Always ends with a `Stopped` report carrying the terminal error code,
    /// and returns that error.
    pub async fn run(&mut self, output: OutputSink) -> Result<()> {
        let start_hint = hint_ms(self.options.start_wait_hint);
        if let Err(e) = self.reporter.report(ServiceState::StartPending, NO_ERROR, start_hint) {
            return self.finish(Some(e));
        }

        let stop = match StopSignal::create(&stop_signal_name(&self.name)) {
            Ok(guard) => guard,
            Err(e) => return self.finish(Some(e)),
        };

        let mut child = match spawn(&self.spec, output) {
            Ok(child) => child,
            Err(e) => return self.finish(Some(e)),
        };
        info!(service = %self.name, pid = child.id(), "service running");
        let _ = self.reporter.report(ServiceState::Running, NO_ERROR, 0);

        let failure = match wait_any(&mut child, &stop, None).await {
            WaitOutcome::ChildExited(status) => {
                info!(
                    service = %self.name,
                    code = status.code(),
                    "child exited on its own"
                );
                let stop_hint = hint_ms(self.options.stop_wait_hint);
                let _ = self.reporter.report(ServiceState::StopPending, NO_ERROR, stop_hint);
                None
            }
            WaitOutcome::StopRequested => self.shutdown(&mut child).await.err(),
            WaitOutcome::WaitError(e) => Some(e),
            WaitOutcome::TimedOut => Some(StewardError::Timeout {
                resource: format!("child process {}", child.id()),
                elapsed: Duration::ZERO,
            }),
        };

        drop(child);
        drop(stop);
        self.finish(failure)
    }

    /// Interrupts the child and waits for it within the stop wait hint.
    async fn shutdown(&mut self, child: &mut ChildHandle) -> Result<()> {
        let pid = child.id();
        let stop_hint = self.options.stop_wait_hint;
        let stop_hint_ms = hint_ms(stop_hint);
        info!(service = %self.name, pid, "stop requested");
        let _ = self.reporter.report(ServiceState::StopPending, NO_ERROR, stop_hint_ms);

        if let Err(e) = self.interrupt.interrupt(pid) {
            warn!(pid, error = %e, "failed to interrupt child, waiting anyway");
        }

        let reporter = &mut self.reporter;
        let resource = format!("child process {pid}");
        let waited = wait_until(
            &resource,
            || {
                let _ = reporter.report(ServiceState::StopPending, NO_ERROR, stop_hint_ms);
                let state = match child.try_exit()? {
                    Some(_) => ServiceState::Stopped,
                    None => ServiceState::StopPending,
                };
                // The child reports no progress of its own.
                Ok(StatusSnapshot::new(state, 0, stop_hint))
            },
            |state| state == ServiceState::Stopped,
        )
        .await;

        match waited {
            Ok(_) => {
                info!(
                    pid,
                    code = child.exit_status().and_then(|s| s.code()),
                    "child stopped"
                );
                Ok(())
            }
            Err(e) => {
                if e.kind() == crate::error::ErrorKind::Timeout {
                    warn!(pid, "child ignored the interrupt, killing it");
                }
                if let Err(kill_err) = child.kill().await {
                    error!(pid, error = %kill_err, "failed to kill child");
                }
                Err(e)
            }
        }
    }

    fn finish(&mut self, failure: Option<StewardError>) -> Result<()> {
        let code = failure.as_ref().map_or(NO_ERROR, StewardError::code);
        if let Some(e) = &failure {
            error!(service = %self.name, code, error = %e, "service failed");
        }
        let _ = self.reporter.report(ServiceState::Stopped, code, 0);
        info!(service = %self.name, code, "service stopped");
        failure.map_or(Ok(()), Err)
    }
}

fn hint_ms(hint: Duration) -> u32 {
    u32::try_from(hint.as_millis()).unwrap_or(u32::MAX)
}
