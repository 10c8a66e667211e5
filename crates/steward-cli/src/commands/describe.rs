//! Command handler for `steward describe`.

use colored::Colorize;

use steward_registry::ServiceConfig;

use super::{block_on, connect, fail};

/// Executes the `steward describe` command.
pub fn execute(config: &ServiceConfig) {
    let descriptor = &config.descriptor;
    let admin = connect();
    match block_on(admin.describe(descriptor)) {
        Ok(()) => println!(
            "{} Updated {} title to {}.",
            "✓".green().bold(),
            descriptor.name.cyan(),
            descriptor.title.bold()
        ),
        Err(e) => fail(&e),
    }
}
