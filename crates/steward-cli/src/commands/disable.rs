//! Command handler for `steward disable`.

use colored::Colorize;

use steward_registry::ServiceConfig;

use super::{block_on, connect, fail};

/// Executes the `steward disable` command.
pub fn execute(config: &ServiceConfig) {
    let name = &config.descriptor.name;
    let admin = connect();
    match block_on(admin.disable(name)) {
        Ok(()) => println!("{} Disabled {}.", "✓".green().bold(), name.cyan()),
        Err(e) => fail(&e),
    }
}
