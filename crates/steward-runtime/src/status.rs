// SPDX-License-Identifier: Apache-2.0

//! Service status record and the reporter that forwards it to the manager.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use tracing::{error, info};

use crate::error::Result;

/// Lifecycle state as understood by the service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceState {
    StartPending,
    Running,
    StopPending,
    Stopped,
}

impl ServiceState {
    /// Returns whether the state is a transition the manager times.
    pub fn is_pending(self) -> bool {
        matches!(self, ServiceState::StartPending | ServiceState::StopPending)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::StartPending => write!(f, "start-pending"),
            ServiceState::Running => write!(f, "running"),
            ServiceState::StopPending => write!(f, "stop-pending"),
            ServiceState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Status record pushed to the service manager on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub state: ServiceState,
    pub exit_code: u32,
    pub wait_hint_ms: u32,
    pub checkpoint: u32,
    pub accepts_stop: bool,
}

impl Default for StatusRecord {
    fn default() -> Self {
        StatusRecord {
            state: ServiceState::Stopped,
            exit_code: 0,
            wait_hint_ms: 0,
            checkpoint: 0,
            accepts_stop: false,
        }
    }
}

impl StatusRecord {
    pub fn wait_hint(&self) -> Duration {
        Duration::from_millis(u64::from(self.wait_hint_ms))
    }
}

/// Destination for status records: the service manager, or a log in console runs.
pub trait StatusSink {
    fn set_status(&mut self, record: &StatusRecord) -> Result<()>;
}

impl<S: StatusSink + ?Sized> StatusSink for Box<S> {
    fn set_status(&mut self, record: &StatusRecord) -> Result<()> {
        (**self).set_status(record)
    }
}

/// Sink used when no service manager is attached; transitions go to the log.
#[derive(Debug, Default)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn set_status(&mut self, record: &StatusRecord) -> Result<()> {
        info!(
            state = %record.state,
            exit_code = record.exit_code,
            wait_hint_ms = record.wait_hint_ms,
            checkpoint = record.checkpoint,
            "service status"
        );
        Ok(())
    }
}

/// Single writer of the status record.
pub struct StatusReporter<S> {
    record: StatusRecord,
    sink: S,
}

impl<S: StatusSink> StatusReporter<S> {
    pub fn new(sink: S) -> Self {
        StatusReporter {
            record: StatusRecord::default(),
            sink,
        }
    }

    /// Updates the record for `state` and forwards it to the sink.
    pub fn report(&mut self, state: ServiceState, exit_code: u32, wait_hint_ms: u32) -> Result<()> {
        self.record.state = state;
        self.record.exit_code = exit_code;
        self.record.wait_hint_ms = wait_hint_ms;
        self.record.accepts_stop = state != ServiceState::StartPending;
        self.record.checkpoint = if state.is_pending() {
            self.record.checkpoint.saturating_add(1)
        } else {
            0
        };

        self.sink.set_status(&self.record).inspect_err(|e| {
            error!(state = %state, error = %e, "failed to report service status");
        })
    }

    pub fn record(&self) -> &StatusRecord {
        &self.record
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::StewardError;

    /// Sink that keeps every forwarded record.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) records: Vec<StatusRecord>,
        pub(crate) fail_on: Option<ServiceState>,
    }

    impl RecordingSink {
        pub(crate) fn states(&self) -> Vec<ServiceState> {
            self.records.iter().map(|r| r.state).collect()
        }
    }

    impl StatusSink for RecordingSink {
        fn set_status(&mut self, record: &StatusRecord) -> Result<()> {
            self.records.push(*record);
            if self.fail_on == Some(record.state) {
                return Err(StewardError::registry("set status rejected", Some(6)));
            }
            Ok(())
        }
    }

    #[test]
    fn start_pending_never_accepts_stop() {
        let states = [
            ServiceState::Running,
            ServiceState::StartPending,
            ServiceState::StopPending,
            ServiceState::StartPending,
            ServiceState::Stopped,
            ServiceState::StartPending,
        ];
        let mut reporter = StatusReporter::new(RecordingSink::default());
        for state in states {
            reporter.report(state, 0, 1000).unwrap();
            let record = reporter.record();
            assert_eq!(
                record.accepts_stop,
                state != ServiceState::StartPending,
                "state {state}"
            );
        }
    }

    #[test]
    fn checkpoint_counts_up_while_pending() {
        let mut reporter = StatusReporter::new(RecordingSink::default());
        reporter.report(ServiceState::StartPending, 0, 3000).unwrap();
        assert_eq!(reporter.record().checkpoint, 1);
        reporter.report(ServiceState::Running, 0, 0).unwrap();
        assert_eq!(reporter.record().checkpoint, 0);

        for expected in 1..=4 {
            reporter.report(ServiceState::StopPending, 0, 5000).unwrap();
            assert_eq!(reporter.record().checkpoint, expected);
        }
    }

    #[test]
    fn stopped_twice_keeps_checkpoint_at_zero() {
        let mut reporter = StatusReporter::new(RecordingSink::default());
        reporter.report(ServiceState::StopPending, 0, 5000).unwrap();
        reporter.report(ServiceState::Stopped, 0, 0).unwrap();
        reporter.report(ServiceState::Stopped, 0, 0).unwrap();
        assert_eq!(reporter.record().checkpoint, 0);
        assert!(reporter.sink().records.iter().skip(1).all(|r| r.checkpoint == 0));
    }

    #[test]
    fn sink_failure_is_returned_and_record_still_updated() {
        let mut reporter = StatusReporter::new(RecordingSink {
            fail_on: Some(ServiceState::Running),
            ..RecordingSink::default()
        });
        let err = reporter.report(ServiceState::Running, 0, 0).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Registry);
        assert_eq!(reporter.record().state, ServiceState::Running);

        reporter.report(ServiceState::Stopped, 0, 0).unwrap();
        assert_eq!(
            reporter.sink().states(),
            vec![ServiceState::Running, ServiceState::Stopped]
        );
    }

    #[test]
    fn state_names_are_kebab_case() {
        assert_eq!(ServiceState::StartPending.to_string(), "start-pending");
        assert_eq!(ServiceState::Stopped.to_string(), "stopped");
        assert!(ServiceState::StopPending.is_pending());
        assert!(!ServiceState::Running.is_pending());
    }
}
