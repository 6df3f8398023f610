//! claude-helper-hook: CLI hook handler for Claude Helper session tracking.
//!
//! Called directly by Claude Code hooks configured in ~/.claude/settings.json.
//! Every hook event runs `claude-helper-hook handle` with the event JSON on
//! stdin.
//!
//! ## Exit Status
//!
//! - `0`: handled (including events that were deliberately ignored)
//! - `1`: the handler failed, or a blocking wait was interrupted
//!
//! The decision itself is never encoded in the exit status; blocking events
//! print it on stdout.

mod handle;
mod logging;

use clap::{Parser, Subcommand};
use helper_core::StorageConfig;

#[derive(Parser)]
#[command(name = "claude-helper-hook")]
#[command(about = "Claude Helper session state tracker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle a hook event (reads JSON from stdin)
    Handle,
}

fn main() {
    let cli = Cli::parse();
    let storage = StorageConfig::from_env();
    let _logging_guard = logging::init(storage.as_ref().ok());

    match cli.command {
        Commands::Handle => {
            let storage = match storage {
                Ok(storage) => storage,
                Err(e) => {
                    tracing::error!(error = %e, "claude-helper-hook cannot locate storage");
                    std::process::exit(1);
                }
            };

            match handle::run(storage) {
                Ok(handle::Outcome::Done) => {}
                Ok(handle::Outcome::Decision(output)) => match output.to_json() {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to encode decision");
                        std::process::exit(1);
                    }
                },
                Ok(handle::Outcome::Cancelled) => std::process::exit(1),
                Err(e) => {
                    tracing::error!(error = %e, "claude-helper-hook handle failed");
                    std::process::exit(1);
                }
            }
        }
    }
}
