//! Steward CLI binary entrypoint.

mod commands;
mod logging;
pub mod paths;
#[cfg(windows)]
mod service;

use clap::Parser;
use std::path::PathBuf;

use commands::Commands;
use logging::LogLevel;

/// Steward: run any executable as a supervised operating-system service
#[derive(Parser)]
#[command(name = "steward", version, about, long_about = None)]
struct Cli {
    /// Service configuration file (defaults to `<exe>.toml`)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

/// Parses CLI arguments and dispatches to command handlers.
fn main() {
    let cli = Cli::parse();
    let config_path = paths::config_path(cli.config.as_deref());
    commands::execute(cli.command, &config_path, cli.log_level);
}
