// SPDX-License-Identifier: Apache-2.0

//! Child process spawning and the exit-vs-stop race.

use std::collections::BTreeMap;
use std::fs::File;
use std::future;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::error::{Result, StewardError};
use crate::stop_signal::StopSignal;

/// Process specification for launching the wrapped executable.
#[derive(Debug, Clone, Default)]
pub struct ProcessSpec {
    pub command_line: String,
    pub working_directory: String,
    pub env: BTreeMap<String, String>,
}

/// Where the child's stdout and stderr go.
#[derive(Debug)]
pub enum OutputSink {
    Inherit,
    Null,
    File(File),
}

impl OutputSink {
    fn into_stdio(self) -> io::Result<(Stdio, Stdio)> {
        Ok(match self {
            OutputSink::Inherit => (Stdio::inherit(), Stdio::inherit()),
            OutputSink::Null => (Stdio::null(), Stdio::null()),
            OutputSink::File(file) => {
                let err = file.try_clone()?;
                (Stdio::from(file), Stdio::from(err))
            }
        })
    }
}

/// Result of racing the child against the stop latch.
#[derive(Debug)]
pub enum WaitOutcome {
    ChildExited(ExitStatus),
    StopRequested,
    TimedOut,
    WaitError(StewardError),
}

/// Splits a command line into program and arguments.
pub fn split_command_line(command_line: &str) -> Result<(String, Vec<String>)> {
    let mut words = shell_words::split(command_line)
        .map_err(|e| StewardError::config(format!("invalid command line `{command_line}`: {e}")))?
        .into_iter();
    match words.next() {
        Some(program) if !program.is_empty() => Ok((program, words.collect())),
        _ => Err(StewardError::config("command line must not be empty")),
    }
}

/// Blank working directories mean "inherit ours" and are never passed on.
pub fn normalize_working_directory(dir: &str) -> Option<&Path> {
    if dir.trim().is_empty() {
        None
    } else {
        Some(Path::new(dir))
    }
}

/// Live child process owned by the supervisor.
///
/// Dropping the handle kills a child that is still running and closes its
/// process handle.
#[derive(Debug)]
pub struct ChildHandle {
    pid: u32,
    child: Child,
    exit: Option<ExitStatus>,
}

impl ChildHandle {
    pub fn id(&self) -> u32 {
        self.pid
    }

    /// Exit status once the child has been reaped.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit
    }

    /// Non-blocking exit check.
    pub fn try_exit(&mut self) -> Result<Option<ExitStatus>> {
        if self.exit.is_some() {
            return Ok(self.exit);
        }
        let status = self.child.try_wait().map_err(|source| StewardError::Wait {
            context: format!("polling process {}", self.pid),
            source,
        })?;
        self.exit = status;
        Ok(status)
    }

    /// Waits for the child to exit.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.exit {
            return Ok(status);
        }
        let status = self.child.wait().await.map_err(|source| StewardError::Wait {
            context: format!("waiting for process {}", self.pid),
            source,
        })?;
        self.exit = Some(status);
        Ok(status)
    }

    /// Forcefully terminates the child and reaps it.
    pub async fn kill(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.exit {
            return Ok(status);
        }
        self.child.kill().await.map_err(|source| StewardError::Wait {
            context: format!("killing process {}", self.pid),
            source,
        })?;
        self.wait().await
    }
}

/// Starts the wrapped executable.
pub fn spawn(spec: &ProcessSpec, output: OutputSink) -> Result<ChildHandle> {
    if spec.command_line.trim().is_empty() {
        return Err(StewardError::config("command line must not be empty"));
    }
    let (program, args) = split_command_line(&spec.command_line)?;
    let (stdout, stderr) = output
        .into_stdio()
        .map_err(|e| StewardError::resource("failed to duplicate output handle", e))?;

    let mut cmd = std::process::Command::new(&program);
    cmd.args(&args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr);

    if let Some(dir) = normalize_working_directory(&spec.working_directory) {
        cmd.current_dir(dir);
    }

    // Own process group / own console so the interrupt reaches only the child.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    let mut cmd = Command::from(cmd);
    cmd.kill_on_drop(true);

    let child = cmd.spawn().map_err(|source| StewardError::Spawn {
        command: spec.command_line.clone(),
        source,
    })?;
    let Some(pid) = child.id() else {
        return Err(StewardError::Spawn {
            command: spec.command_line.clone(),
            source: io::Error::other("child exited before its id could be read"),
        });
    };

    info!(pid, command = %program, "spawned child process");
    Ok(ChildHandle {
        pid,
        child,
        exit: None,
    })
}

/// Waits for whichever comes first: child exit, stop latch, or `timeout`.
///
/// A latch that is already set always wins.
pub async fn wait_any(
    child: &mut ChildHandle,
    stop: &StopSignal,
    timeout: Option<Duration>,
) -> WaitOutcome {
    if stop.is_set() {
        return WaitOutcome::StopRequested;
    }

    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => future::pending::<()>().await,
        }
    };

    let outcome = tokio::select! {
        biased;
        _ = stop.wait() => WaitOutcome::StopRequested,
        status = child.wait() => match status {
            Ok(status) => WaitOutcome::ChildExited(status),
            Err(e) => WaitOutcome::WaitError(e),
        },
        _ = deadline => WaitOutcome::TimedOut,
    };
    debug!(pid = child.id(), ?outcome, "supervision wait finished");
    outcome
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;

    fn sh(script: &str) -> ProcessSpec {
        ProcessSpec {
            command_line: format!("sh -c '{script}'"),
            ..ProcessSpec::default()
        }
    }

    #[test]
    fn split_honours_quotes() {
        let (program, args) = split_command_line("myapp.exe --serve \"two words\"").unwrap();
        assert_eq!(program, "myapp.exe");
        assert_eq!(args, vec!["--serve".to_string(), "two words".to_string()]);
    }

    #[test]
    fn blank_command_line_is_a_config_error() {
        let err = split_command_line("   ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        let err = spawn(&ProcessSpec::default(), OutputSink::Null).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn blank_working_directory_is_not_passed_on() {
        assert!(normalize_working_directory("").is_none());
        assert!(normalize_working_directory("  ").is_none());
        assert_eq!(
            normalize_working_directory("/srv/app"),
            Some(Path::new("/srv/app"))
        );
    }

    #[tokio::test]
    async fn empty_working_directory_inherits_ours() {
        let tmp = tempfile::tempdir().unwrap();
        let out_path = tmp.path().join("pwd.out");
        let out = fs::File::create(&out_path).unwrap();

        let mut child = spawn(&sh("pwd -P"), OutputSink::File(out)).unwrap();
        assert!(child.wait().await.unwrap().success());

        let printed = fs::read_to_string(&out_path).unwrap();
        let expected = fs::canonicalize(std::env::current_dir().unwrap()).unwrap();
        assert_eq!(Path::new(printed.trim()), expected);
    }

    #[tokio::test]
    async fn explicit_working_directory_is_used() {
        let tmp = tempfile::tempdir().unwrap();
        let out_path = tmp.path().join("pwd.out");
        let out = fs::File::create(&out_path).unwrap();

        let mut spec = sh("pwd -P");
        spec.working_directory = tmp.path().to_string_lossy().to_string();
        let mut child = spawn(&spec, OutputSink::File(out)).unwrap();
        child.wait().await.unwrap();

        let printed = fs::read_to_string(&out_path).unwrap();
        assert_eq!(
            Path::new(printed.trim()),
            fs::canonicalize(tmp.path()).unwrap()
        );
    }

    #[tokio::test]
    async fn environment_reaches_the_child() {
        let tmp = tempfile::tempdir().unwrap();
        let out_path = tmp.path().join("env.out");
        let out = fs::File::create(&out_path).unwrap();

        let mut spec = sh("echo $STEWARD_TEST_VALUE");
        spec.env
            .insert("STEWARD_TEST_VALUE".to_string(), "from-config".to_string());
        let mut child = spawn(&spec, OutputSink::File(out)).unwrap();
        child.wait().await.unwrap();

        assert_eq!(fs::read_to_string(&out_path).unwrap().trim(), "from-config");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let spec = ProcessSpec {
            command_line: "steward-definitely-missing-binary --flag".to_string(),
            ..ProcessSpec::default()
        };
        let err = spawn(&spec, OutputSink::Null).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Spawn);
        assert_ne!(err.code(), 0);
    }

    #[tokio::test]
    async fn wait_any_reports_child_exit() {
        let stop = StopSignal::create("wait-any-exit.stop").unwrap();
        let mut child = spawn(&sh("exit 3"), OutputSink::Null).unwrap();
        match wait_any(&mut child, &stop, None).await {
            WaitOutcome::ChildExited(status) => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(child.exit_status().and_then(|s| s.code()), Some(3));
    }

    #[tokio::test]
    async fn latched_stop_wins_over_live_child() {
        let stop = StopSignal::create("wait-any-latched.stop").unwrap();
        let mut child = spawn(&sh("sleep 30"), OutputSink::Null).unwrap();
        stop.set();

        let outcome = wait_any(&mut child, &stop, None).await;
        assert!(matches!(outcome, WaitOutcome::StopRequested));
        assert!(child.try_exit().unwrap().is_none());
        child.kill().await.unwrap();
    }

    #[tokio::test]
    async fn wait_any_honours_timeout() {
        let stop = StopSignal::create("wait-any-timeout.stop").unwrap();
        let mut child = spawn(&sh("sleep 30"), OutputSink::Null).unwrap();
        let outcome = wait_any(&mut child, &stop, Some(Duration::from_millis(50))).await;
        assert!(matches!(outcome, WaitOutcome::TimedOut));
        child.kill().await.unwrap();
    }

    #[tokio::test]
    async fn kill_reaps_the_child() {
        let mut child = spawn(&sh("sleep 30"), OutputSink::Null).unwrap();
        let status = child.kill().await.unwrap();
        assert!(!status.success());
        assert!(child.try_exit().unwrap().is_some());
    }
}
