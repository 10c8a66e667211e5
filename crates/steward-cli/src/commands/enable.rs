//! Command handler for `steward enable`.

use colored::Colorize;

use steward_registry::ServiceConfig;

use super::{block_on, connect, fail};

/// Executes the `steward enable` command.
pub fn execute(config: &ServiceConfig) {
    let name = &config.descriptor.name;
    let admin = connect();
    match block_on(admin.enable(name)) {
        Ok(()) => println!(
            "{} {} will start automatically.",
            "✓".green().bold(),
            name.cyan()
        ),
        Err(e) => fail(&e),
    }
}
