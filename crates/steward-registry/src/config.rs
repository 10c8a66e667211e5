// SPDX-License-Identifier: Apache-2.0

//! Service configuration file (`<exe>.toml`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use steward_runtime::control::{DEFAULT_START_WAIT_HINT, DEFAULT_STOP_WAIT_HINT};
use steward_runtime::{ControlOptions, ProcessSpec, Result, StewardError};
use tracing::debug;

/// Environment variable that overrides the configuration path.
pub const CONFIG_ENV: &str = "STEWARD_CONFIG";
/// Environment variable handed to the child with the configuration directory.
pub const BASEPATH_ENV: &str = "STEWARD_BASEPATH";

/// Immutable identity and launch data of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub title: String,
    pub description: String,
    pub command_line: String,
    pub working_directory: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ConfigFile {
    unit: UnitSection,
    logging: LoggingSection,
    environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct UnitSection {
    name: String,
    title: String,
    description: String,
    command_line: String,
    working_directory: String,
    start_wait_hint_ms: u64,
    stop_wait_hint_ms: u64,
}

impl Default for UnitSection {
    fn default() -> Self {
        UnitSection {
            name: String::new(),
            title: String::new(),
            description: String::new(),
            command_line: String::new(),
            working_directory: String::new(),
            start_wait_hint_ms: DEFAULT_START_WAIT_HINT.as_millis() as u64,
            stop_wait_hint_ms: DEFAULT_STOP_WAIT_HINT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct LoggingSection {
    path: String,
    level: Option<String>,
}

/// Loaded and resolved service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub path: PathBuf,
    pub descriptor: ServiceDescriptor,
    pub options: ControlOptions,
    pub log_path: PathBuf,
    pub log_level: Option<String>,
    pub environment: BTreeMap<String, String>,
}

/// Configuration path used when none is given: the executable with `.toml`.
pub fn default_config_path(exe: &Path) -> PathBuf {
    exe.with_extension("toml")
}

impl ServiceConfig {
    /// Reads and resolves the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StewardError::config(format!("config file not found: {}", path.display()))
            } else {
                StewardError::resource(format!("failed to read {}", path.display()), e)
            }
        })?;
        Self::from_toml_str(path, &text)
    }

    /// Parses configuration text as if it had been read from `path`.
    pub fn from_toml_str(path: &Path, text: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text)
            .map_err(|e| StewardError::config(format!("invalid {}: {e}", path.display())))?;
        let unit = file.unit;

        if unit.command_line.trim().is_empty() {
            return Err(StewardError::config(format!(
                "{}: [unit] command_line is required",
                path.display()
            )));
        }

        let name = match unit.name.trim() {
            "" => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .filter(|stem| !stem.is_empty())
                .ok_or_else(|| StewardError::config("service name cannot be derived"))?,
            name => name.to_string(),
        };
        if name.contains(['/', '\\']) {
            return Err(StewardError::config(format!(
                "service name `{name}` must not contain path separators"
            )));
        }
        let title = if unit.title.trim().is_empty() {
            name.clone()
        } else {
            unit.title
        };

        let descriptor = ServiceDescriptor {
            name,
            title,
            description: unit.description,
            command_line: unit.command_line,
            working_directory: unit.working_directory,
        };
        let options = ControlOptions {
            start_wait_hint: Duration::from_millis(unit.start_wait_hint_ms),
            stop_wait_hint: Duration::from_millis(unit.stop_wait_hint_ms),
        };
        let log_path = resolve_log_path(path, &file.logging.path);
        let log_level = file.logging.level.filter(|level| !level.trim().is_empty());

        debug!(service = %descriptor.name, log = %log_path.display(), "loaded configuration");
        Ok(ServiceConfig {
            path: path.to_path_buf(),
            descriptor,
            options,
            log_path,
            log_level,
            environment: file.environment,
        })
    }

    /// Directory holding the configuration file.
    pub fn base_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Launch specification for the wrapped executable.
    pub fn process_spec(&self) -> ProcessSpec {
        let mut env = self.environment.clone();
        env.insert(
            BASEPATH_ENV.to_string(),
            self.base_dir().to_string_lossy().to_string(),
        );
        ProcessSpec {
            command_line: self.descriptor.command_line.clone(),
            working_directory: self.descriptor.working_directory.clone(),
            env,
        }
    }

    /// Opens the service log for appending, creating its directory first.
    pub fn open_log(&self) -> Result<File> {
        if let Some(parent) = self.log_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    StewardError::resource(format!("failed to create {}", parent.display()), e)
                })?;
            }
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| {
                StewardError::resource(format!("failed to open {}", self.log_path.display()), e)
            })
    }
}

fn resolve_log_path(config_path: &Path, setting: &str) -> PathBuf {
    let setting = setting.trim();
    if setting.is_empty() {
        return config_path.with_extension("log");
    }
    let setting = Path::new(setting);
    if setting.is_absolute() {
        setting.to_path_buf()
    } else {
        config_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(setting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_runtime::ErrorKind;

    const FULL: &str = r#"
[unit]
name = "myapp"
title = "My App"
description = "Serves things"
command_line = "myapp.exe --serve"
working_directory = "C:\\apps"
start_wait_hint_ms = 2000
stop_wait_hint_ms = 5000

[logging]
path = "logs/myapp.log"
level = "debug"

[environment]
APP_MODE = "service"
"#;

    #[test]
    fn full_config_is_resolved() {
        let path = Path::new("/srv/steward/myapp-service.toml");
        let config = ServiceConfig::from_toml_str(path, FULL).unwrap();

        assert_eq!(config.descriptor.name, "myapp");
        assert_eq!(config.descriptor.title, "My App");
        assert_eq!(config.descriptor.command_line, "myapp.exe --serve");
        assert_eq!(config.options.stop_wait_hint, Duration::from_millis(5000));
        assert_eq!(config.log_path, PathBuf::from("/srv/steward/logs/myapp.log"));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.environment["APP_MODE"], "service");
    }

    #[test]
    fn missing_keys_take_defaults() {
        let path = Path::new("/srv/steward/worker.toml");
        let config =
            ServiceConfig::from_toml_str(path, "[unit]\ncommand_line = \"worker\"\n").unwrap();

        assert_eq!(config.descriptor.name, "worker");
        assert_eq!(config.descriptor.title, "worker");
        assert_eq!(config.descriptor.description, "");
        assert_eq!(config.descriptor.working_directory, "");
        assert_eq!(config.options, ControlOptions::default());
        assert_eq!(config.log_path, PathBuf::from("/srv/steward/worker.log"));
        assert!(config.log_level.is_none());
    }

    #[test]
    fn command_line_is_required() {
        let path = Path::new("/srv/steward/empty.toml");
        let err = ServiceConfig::from_toml_str(path, "[unit]\nname = \"x\"\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("command_line"));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = ServiceConfig::from_toml_str(Path::new("bad.toml"), "[unit\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn absolute_log_path_is_kept() {
        let log = if cfg!(windows) { "C:\\logs\\a.log" } else { "/var/log/a.log" };
        assert_eq!(
            resolve_log_path(Path::new("/srv/a.toml"), log),
            PathBuf::from(log)
        );
    }

    #[test]
    fn process_spec_carries_environment_and_basepath() {
        let path = Path::new("/srv/steward/myapp.toml");
        let config = ServiceConfig::from_toml_str(path, FULL).unwrap();
        let spec = config.process_spec();

        assert_eq!(spec.command_line, "myapp.exe --serve");
        assert_eq!(spec.env["APP_MODE"], "service");
        assert_eq!(spec.env[BASEPATH_ENV], "/srv/steward");
    }

    #[test]
    fn load_reports_missing_file_as_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ServiceConfig::load(&tmp.path().join("absent.toml")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn open_log_creates_relative_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("svc.toml");
        fs::write(
            &path,
            "[unit]\ncommand_line = \"svc\"\n[logging]\npath = \"nested/dir/svc.log\"\n",
        )
        .unwrap();

        let config = ServiceConfig::load(&path).unwrap();
        let log = config.open_log().unwrap();
        drop(log);
        assert!(tmp.path().join("nested/dir/svc.log").exists());
    }

    #[test]
    fn default_config_sits_next_to_the_executable() {
        assert_eq!(
            default_config_path(Path::new("/opt/steward/steward")),
            PathBuf::from("/opt/steward/steward.toml")
        );
    }
}
