//! Command handler for `steward query`.

use colored::Colorize;

use steward_registry::{EntryInfo, ServiceConfig};
use steward_runtime::ServiceState;

use super::{block_on, connect, fail};

/// Executes the `steward query` command.
pub fn execute(config: &ServiceConfig, json: bool) {
    let admin = connect();
    let info = match block_on(admin.query(&config.descriptor.name)) {
        Ok(info) => info,
        Err(e) => fail(&e),
    };

    if json {
        match serde_json::to_string_pretty(&info) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => {
                eprintln!("{} Failed to render JSON: {e}", "✗".red().bold());
                std::process::exit(1);
            }
        }
        return;
    }
    print_info(&info);
}

fn print_info(info: &EntryInfo) {
    let state = info.status.state.to_string();
    let state = match info.status.state {
        ServiceState::Running => state.green(),
        ServiceState::Stopped => state.red(),
        _ => state.yellow(),
    };
    println!("{} ({})", info.name.cyan().bold(), info.config.display_name);
    println!("  State:       {state}");
    println!("  Start type:  {}", info.config.start_type);
    println!("  Command:     {}", info.config.binary_path);
    if info.status.exit_code != 0 {
        println!("  Exit code:   {}", info.status.exit_code);
    }
    if !info.config.description.is_empty() {
        println!("  Description: {}", info.config.description);
    }
}
