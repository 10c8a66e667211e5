//! CLI subcommand declarations and dispatch.

pub mod delete;
pub mod describe;
pub mod disable;
pub mod enable;
pub mod install;
pub mod query;
pub mod run;
pub mod start;
pub mod stop;

use clap::Subcommand;
use colored::Colorize;
use std::future::Future;
use std::path::Path;
use std::process;

use steward_registry::{PlatformManager, ServiceAdmin, ServiceConfig};
use steward_runtime::StewardError;

use crate::logging::{init_logging, LogLevel, LogTarget};

/// Top-level CLI subcommands supported by `steward`.
#[derive(Subcommand)]
pub enum Commands {
    /// Register the configured executable with the service manager
    Install,

    /// Show the registered configuration and live status of the service
    Query {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-apply title and description from the configuration
    Describe,

    /// Start the service automatically at boot
    Enable,

    /// Prevent the service from being started
    Disable,

    /// Remove the service from the service manager
    Delete,

    /// Start the service and wait until it is running
    Start,

    /// Stop the service and wait until it has stopped
    Stop,

    /// Run the configured executable (invoked by the service manager)
    Run,
}

/// Dispatches the parsed subcommand to its handler.
pub fn execute(command: Commands, config_path: &Path, log_level: Option<LogLevel>) {
    let config = || load_config(config_path, log_level);
    match command {
        Commands::Install => install::execute(&config()),
        Commands::Query { json } => query::execute(&config(), json),
        Commands::Describe => describe::execute(&config()),
        Commands::Enable => enable::execute(&config()),
        Commands::Disable => disable::execute(&config()),
        Commands::Delete => delete::execute(&config()),
        Commands::Start => start::execute(&config()),
        Commands::Stop => stop::execute(&config()),
        // Logging for `run` depends on whether the service manager started us.
        Commands::Run => run::execute(config_path, log_level),
    }
}

/// Loads the configuration and starts stderr logging, or exits.
pub(crate) fn load_config(config_path: &Path, log_level: Option<LogLevel>) -> ServiceConfig {
    match ServiceConfig::load(config_path) {
        Ok(config) => {
            init_logging(log_level, config.log_level.as_deref(), LogTarget::Stderr);
            config
        }
        Err(e) => {
            init_logging(log_level, None, LogTarget::Stderr);
            fail(&e)
        }
    }
}

/// Connects to the service manager, or exits.
pub(crate) fn connect() -> ServiceAdmin<PlatformManager> {
    steward_registry::connect().unwrap_or_else(|e| fail(&e))
}

/// Runs an admin future on a current-thread runtime.
pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
    match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime.block_on(future),
        Err(e) => {
            eprintln!("{} Failed to build tokio runtime: {e}", "✗".red().bold());
            process::exit(1);
        }
    }
}

/// Prints `err` and exits with the code of its kind.
pub(crate) fn fail(err: &StewardError) -> ! {
    eprintln!("{} {err}", "✗".red().bold());
    process::exit(err.kind().exit_code());
}
