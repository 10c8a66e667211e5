//! Command handler for `steward run`.
//!
//! Under the service manager this hands the process to the service
//! dispatcher. Anywhere else the same control loop runs in the foreground and
//! Ctrl-C takes the place of the manager's stop request.

use colored::Colorize;
use std::path::Path;
use std::process;

use steward_runtime::{
    platform_interrupt, stop_signal_name, LogStatusSink, OutputSink, ServiceControl, StopSignal,
};
use tracing::{info, warn};

use super::{fail, load_config};
use crate::logging::LogLevel;

/// Executes the `steward run` command.
pub fn execute(config_path: &Path, log_level: Option<LogLevel>) {
    #[cfg(windows)]
    match crate::service::dispatch(config_path, log_level) {
        Ok(true) => return,
        Ok(false) => {}
        Err(e) => fail(&e),
    }

    foreground(config_path, log_level);
}

fn foreground(config_path: &Path, log_level: Option<LogLevel>) {
    let config = load_config(config_path, log_level);
    let log = config.open_log().unwrap_or_else(|e| fail(&e));
    let name = config.descriptor.name.clone();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{} Failed to build tokio runtime: {e}", "✗".red().bold());
            process::exit(1);
        }
    };

    let mut control = ServiceControl::new(
        name.clone(),
        config.process_spec(),
        config.options,
        LogStatusSink,
        platform_interrupt(),
    );

    let result = runtime.block_on(async {
        let latch = stop_signal_name(&name);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                match StopSignal::open(&latch) {
                    Some(stop) => {
                        info!("Ctrl-C received, stopping");
                        stop.set();
                    }
                    None => warn!("Ctrl-C received before the service was running"),
                }
            }
        });
        control.run(OutputSink::File(log)).await
    });

    if let Err(e) = result {
        fail(&e);
    }
}
