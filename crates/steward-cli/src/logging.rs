//! Logging setup for `steward` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `[logging] level` in the service configuration
//! 3. `STEWARD_LOG` environment variable (e.g. "info", "debug")
//! 4. default to `info`

use clap::ValueEnum;
use std::fs::File;
use std::sync::Mutex;
use tracing_subscriber::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Where log lines go.
pub enum LogTarget {
    Stderr,
    /// Service log file; written without ANSI colors.
    File(File),
}

/// Installs the global subscriber. Later calls are ignored.
pub fn init_logging(cli_level: Option<LogLevel>, config_level: Option<&str>, target: LogTarget) {
    let level = resolve_level(
        cli_level,
        config_level,
        std::env::var("STEWARD_LOG").ok().as_deref(),
    );

    let builder = fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    let _ = match target {
        LogTarget::Stderr => builder.with_writer(std::io::stderr).try_init(),
        LogTarget::File(file) => builder.with_ansi(false).with_writer(Mutex::new(file)).try_init(),
    };
}

fn resolve_level(
    cli_level: Option<LogLevel>,
    config_level: Option<&str>,
    env_level: Option<&str>,
) -> tracing::Level {
    cli_level
        .map(level_from_log_level)
        .or_else(|| config_level.and_then(parse_level_str))
        .or_else(|| env_level.and_then(parse_level_str))
        .unwrap_or(tracing::Level::INFO)
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_beats_config_and_env() {
        assert_eq!(
            resolve_level(Some(LogLevel::Trace), Some("warn"), Some("error")),
            tracing::Level::TRACE
        );
    }

    #[test]
    fn config_beats_env() {
        assert_eq!(
            resolve_level(None, Some("debug"), Some("error")),
            tracing::Level::DEBUG
        );
    }

    #[test]
    fn unparseable_levels_fall_through() {
        assert_eq!(
            resolve_level(None, Some("loud"), Some("warning")),
            tracing::Level::WARN
        );
        assert_eq!(resolve_level(None, None, None), tracing::Level::INFO);
    }
}
