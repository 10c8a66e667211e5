// SPDX-License-Identifier: Apache-2.0

//! Crate-wide error type shared by the runtime, registry and CLI crates.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Status code reported to the service manager when nothing went wrong.
pub const NO_ERROR: u32 = 0;
/// Generic failure code used when the platform did not supply one.
pub const ERROR_GEN_FAILURE: u32 = 31;
/// The service did not respond to the request in a timely fashion.
pub const ERROR_SERVICE_REQUEST_TIMEOUT: u32 = 1053;
/// The configuration data for this product is corrupt.
pub const ERROR_BAD_CONFIGURATION: u32 = 1610;

/// Failure classes of the service shim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Spawn,
    Signal,
    Wait,
    Timeout,
    Registry,
    Resource,
}

impl ErrorKind {
    /// Process exit code used by the CLI for this failure class.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Config => 2,
            ErrorKind::Spawn => 3,
            ErrorKind::Signal => 4,
            ErrorKind::Wait => 5,
            ErrorKind::Timeout => 6,
            ErrorKind::Registry => 7,
            ErrorKind::Resource => 8,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Config => "config",
            ErrorKind::Spawn => "spawn",
            ErrorKind::Signal => "signal",
            ErrorKind::Wait => "wait",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Registry => "registry",
            ErrorKind::Resource => "resource",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum StewardError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to interrupt process {pid}: {reason}")]
    Signal {
        pid: u32,
        reason: String,
        code: Option<u32>,
    },

    #[error("wait failed: {context}: {source}")]
    Wait {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out waiting for {resource} after {elapsed:?}")]
    Timeout { resource: String, elapsed: Duration },

    #[error("service registry error: {context}")]
    Registry { context: String, code: Option<u32> },

    #[error("{context}: {source}")]
    Resource {
        context: String,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, StewardError>;

impl StewardError {
    pub fn config(message: impl Into<String>) -> Self {
        StewardError::Config(message.into())
    }

    pub fn registry(context: impl Into<String>, code: Option<u32>) -> Self {
        StewardError::Registry {
            context: context.into(),
            code,
        }
    }

    pub fn resource(context: impl Into<String>, source: io::Error) -> Self {
        StewardError::Resource {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StewardError::Config(_) => ErrorKind::Config,
            StewardError::Spawn { .. } => ErrorKind::Spawn,
            StewardError::Signal { .. } => ErrorKind::Signal,
            StewardError::Wait { .. } => ErrorKind::Wait,
            StewardError::Timeout { .. } => ErrorKind::Timeout,
            StewardError::Registry { .. } => ErrorKind::Registry,
            StewardError::Resource { .. } => ErrorKind::Resource,
        }
    }

    /// Numeric code folded into the terminal service status.
    ///
    /// Prefers the platform error code carried by the error and falls back
    /// to a fixed code per kind.
    pub fn code(&self) -> u32 {
        let platform = match self {
            StewardError::Spawn { source, .. }
            | StewardError::Wait { source, .. }
            | StewardError::Resource { source, .. } => os_code(source),
            StewardError::Signal { code, .. } | StewardError::Registry { code, .. } => *code,
            StewardError::Config(_) | StewardError::Timeout { .. } => None,
        };

        platform.unwrap_or(match self.kind() {
            ErrorKind::Config => ERROR_BAD_CONFIGURATION,
            ErrorKind::Timeout => ERROR_SERVICE_REQUEST_TIMEOUT,
            _ => ERROR_GEN_FAILURE,
        })
    }
}

fn os_code(err: &io::Error) -> Option<u32> {
    err.raw_os_error()
        .and_then(|code| u32::try_from(code).ok())
        .filter(|code| *code != NO_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_prefers_platform_error() {
        let err = StewardError::Spawn {
            command: "missing".to_string(),
            source: io::Error::from_raw_os_error(2),
        };
        assert_eq!(err.kind(), ErrorKind::Spawn);
        assert_eq!(err.code(), 2);
    }

    #[test]
    fn code_falls_back_per_kind() {
        assert_eq!(
            StewardError::config("missing command_line").code(),
            ERROR_BAD_CONFIGURATION
        );
        let timeout = StewardError::Timeout {
            resource: "child".to_string(),
            elapsed: Duration::from_secs(5),
        };
        assert_eq!(timeout.code(), ERROR_SERVICE_REQUEST_TIMEOUT);
        assert_eq!(
            StewardError::registry("open failed", None).code(),
            ERROR_GEN_FAILURE
        );
    }

    #[test]
    fn exit_codes_are_distinct() {
        let kinds = [
            ErrorKind::Config,
            ErrorKind::Spawn,
            ErrorKind::Signal,
            ErrorKind::Wait,
            ErrorKind::Timeout,
            ErrorKind::Registry,
            ErrorKind::Resource,
        ];
        let mut codes: Vec<i32> = kinds.iter().map(|k| k.exit_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
        assert!(!codes.contains(&0));
    }
}
