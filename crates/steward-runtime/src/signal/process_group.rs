// SPDX-License-Identifier: Apache-2.0

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use tracing::debug;

use super::Interrupt;
use crate::error::{Result, StewardError};

/// Sends `SIGINT` to the child's process group.
///
/// The supervisor starts every child as a group leader, so the group id is
/// the child's pid. When the group is gone the signal goes to the pid alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessGroupInterrupt;

impl Interrupt for ProcessGroupInterrupt {
    fn interrupt(&self, pid: u32) -> Result<()> {
        let raw = i32::try_from(pid).map_err(|_| signal_error(pid, "pid out of range", None))?;
        if raw <= 0 {
            return Err(signal_error(pid, "refusing to signal pid 0", None));
        }
        let target = Pid::from_raw(raw);

        match killpg(target, Signal::SIGINT) {
            Ok(()) => {
                debug!(pid, "sent SIGINT to process group");
                Ok(())
            }
            Err(Errno::ESRCH) => {
                debug!(pid, "process group gone, signalling process");
                kill(target, Signal::SIGINT)
                    .map_err(|e| signal_error(pid, e.desc(), Some(e as i32 as u32)))
            }
            Err(e) => Err(signal_error(pid, e.desc(), Some(e as i32 as u32))),
        }
    }
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
    use crate::supervisor::{spawn, OutputSink, ProcessSpec};
    use std::fs;
    use std::time::Duration;

    #[tokio::test]
    async fn interrupt_reaches_a_trapping_child() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("ready");
        let out_path = tmp.path().join("out");
        let out = fs::File::create(&out_path).unwrap();
        let spec = ProcessSpec {
            command_line: format!(
                "sh -c 'trap \"echo interrupted; exit 7\" INT; touch {}; while :; do sleep 0.05; done'",
                marker.display()
            ),
            ..ProcessSpec::default()
        };

        let mut child = spawn(&spec, OutputSink::File(out)).unwrap();
        for _ in 0..200 {
            if marker.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(marker.exists(), "child never installed its trap");

        ProcessGroupInterrupt.interrupt(child.id()).unwrap();
        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .expect("child must exit after SIGINT")
            .unwrap();

        assert_eq!(status.code(), Some(7));
        assert!(fs::read_to_string(&out_path).unwrap().contains("interrupted"));
    }

    #[test]
    fn pid_zero_is_rejected() {
        let err = ProcessGroupInterrupt.interrupt(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Signal);
    }

    #[tokio::test]
    async fn reaped_child_is_a_signal_error() {
        let spec = ProcessSpec {
            command_line: "true".to_string(),
            ..ProcessSpec::default()
        };
        let mut child = spawn(&spec, OutputSink::Null).unwrap();
        child.wait().await.unwrap();

        let err = ProcessGroupInterrupt.interrupt(child.id()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Signal);
        assert_eq!(err.code(), Errno::ESRCH as i32 as u32);
    }
}
