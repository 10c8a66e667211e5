//! Command handler for `steward stop`.

use colored::Colorize;

use steward_registry::{ServiceConfig, StopOutcome};

use super::{block_on, connect, fail};

/// Executes the `steward stop` command.
pub fn execute(config: &ServiceConfig) {
    let name = &config.descriptor.name;
    let admin = connect();
    match block_on(admin.stop(name)) {
        Ok(StopOutcome::Stopped) => println!("{} Stopped {}.", "✓".green().bold(), name.cyan()),
        Ok(StopOutcome::AlreadyStopped) => println!(
            "{} {} is not running.",
            "!".yellow().bold(),
            name.cyan()
        ),
        Err(e) => fail(&e),
    }
}
