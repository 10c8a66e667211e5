//! Command handler for `steward start`.

use colored::Colorize;

use steward_registry::{ServiceConfig, StartOutcome};

use super::{block_on, connect, fail};

/// Executes the `steward start` command.
pub fn execute(config: &ServiceConfig) {
    let name = &config.descriptor.name;
    let admin = connect();
    match block_on(admin.start(name)) {
        Ok(StartOutcome::Started) => println!("{} Started {}.", "✓".green().bold(), name.cyan()),
        Ok(StartOutcome::AlreadyRunning) => println!(
            "{} {} is already running.",
            "!".yellow().bold(),
            name.cyan()
        ),
        Err(e) => fail(&e),
    }
}
