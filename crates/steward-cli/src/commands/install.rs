//! Command handler for `steward install`.

use colored::Colorize;
use std::process;

use steward_registry::ServiceConfig;

use super::{connect, fail};
use crate::paths;

/// Executes the `steward install` command.
pub fn execute(config: &ServiceConfig) {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            eprintln!("{} Could not locate the steward executable: {e}", "✗".red().bold());
            process::exit(1);
        }
    };
    let binary_path = paths::service_command_line(&exe, &paths::absolute(&config.path));
    let name = &config.descriptor.name;

    let admin = connect();
    if let Err(e) = admin.install(&config.descriptor, &binary_path) {
        fail(&e);
    }

    println!("{} Installed {}.", "✓".green().bold(), name.cyan());
    println!("  Runs: {}", binary_path.dimmed());
    println!(
        "  Start it with {}.",
        format!("steward start --config \"{}\"", config.path.display()).bold()
    );
}
