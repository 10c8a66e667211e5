//! Command handler for `steward delete`.

use colored::Colorize;

use steward_registry::ServiceConfig;

use super::{block_on, connect, fail};

/// Executes the `steward delete` command.
pub fn execute(config: &ServiceConfig) {
    let name = &config.descriptor.name;
    let admin = connect();
    match block_on(admin.delete(name)) {
        Ok(()) => println!("{} Deleted {}.", "✓".green().bold(), name.cyan()),
        Err(e) => fail(&e),
    }
}
