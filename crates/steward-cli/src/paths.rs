use std::path::{Path, PathBuf};

use steward_registry::{default_config_path, CONFIG_ENV};

/// Resolves the configuration path: `--config`, then `STEWARD_CONFIG`,
/// then `<exe>.toml` next to the running binary.
pub fn config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return absolute(path);
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return absolute(Path::new(&path));
    }
    let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("steward"));
    default_config_path(&exe)
}

/// Makes `path` absolute so the registered service finds it from any directory.
pub fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Command line the service manager runs for an installed service.
pub fn service_command_line(exe: &Path, config: &Path) -> String {
    format!("\"{}\" run --config \"{}\"", exe.display(), config.display())
}
