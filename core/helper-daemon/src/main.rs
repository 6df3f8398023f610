//! Claude Helper daemon entrypoint.
//!
//! `run` is the aggregator: a single long-lived reader that polls session
//! state, reclaims sessions whose driver exited and publishes `status.json`.
//! The remaining subcommands are one-shot actions against the same store.

use std::env;
use std::thread;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use helper_core::aggregate::{publish, read_published};
use helper_core::{
    answer_question, respond_permission, AggregateState, Aggregator, ElicitationMode, FsStateStore,
    HelperConfig, HelperError, PermissionChoice, ProcessProbe, Result, StorageConfig,
};

mod render;

#[derive(Parser, Debug)]
#[command(name = "claude-helper-daemon")]
#[command(about = "Claude Helper aggregator and action surface")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Poll sessions forever, publishing status.json (default)
    Run,
    /// Run one poll cycle and print the result
    Status {
        /// Print the snapshot as JSON instead of the text menu
        #[arg(long)]
        json: bool,
        /// Show the snapshot last published by `run` instead of polling
        #[arg(long)]
        cached: bool,
    },
    /// Answer a pending permission request
    Respond {
        session_id: String,
        item_id: String,
        /// allow, always-allow or deny
        #[arg(value_parser = parse_choice)]
        decision: PermissionChoice,
    },
    /// Answer one question of a pending elicitation
    Answer {
        session_id: String,
        item_id: String,
        index: usize,
        label: String,
    },
    /// Choose where multiple-choice questions are answered
    Mode {
        /// terminal or menubar
        mode: ElicitationMode,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let storage = match StorageConfig::from_env() {
        Ok(storage) => storage,
        Err(err) => {
            error!(error = %err, "Failed to resolve storage root");
            std::process::exit(1);
        }
    };

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(storage),
        Commands::Status { json, cached } => status(storage, json, cached),
        Commands::Respond {
            session_id,
            item_id,
            decision,
        } => respond(storage, &session_id, &item_id, decision),
        Commands::Answer {
            session_id,
            item_id,
            index,
            label,
        } => answer(storage, &session_id, &item_id, index, &label),
        Commands::Mode { mode } => set_mode(storage, mode),
    };

    if let Err(err) = result {
        error!(error = %err, "claude-helper-daemon failed");
        std::process::exit(1);
    }
}

/// Strict spelling check for the command line; the wire format treats unknown values as deny.
fn parse_choice(value: &str) -> std::result::Result<PermissionChoice, String> {
    value.parse()
}

fn init_logging() {
    let debug_enabled = env::var("CLAUDE_HELPER_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(storage: StorageConfig) -> Result<()> {
    let config = HelperConfig::load(&storage);
    let store = FsStateStore::new(storage.clone());
    let aggregator = Aggregator::new(&store, &ProcessProbe);

    let swept = aggregator.sweep(Utc::now().timestamp(), config.stale_session_secs)?;
    info!(
        root = %storage.root().display(),
        swept = swept.len(),
        poll_interval_secs = config.poll_interval_secs,
        "Claude Helper daemon started"
    );

    let mut last_state: Option<AggregateState> = None;
    loop {
        match aggregator.poll() {
            Ok(snapshot) => {
                if last_state != Some(snapshot.state) {
                    info!(
                        from = last_state.map(AggregateState::as_str).unwrap_or("none"),
                        to = snapshot.state.as_str(),
                        sessions = snapshot.sessions.len(),
                        "Aggregate state changed"
                    );
                    last_state = Some(snapshot.state);
                }
                for session_id in &snapshot.reclaimed {
                    info!(session = %session_id, "Reclaimed session of exited driver");
                }
                if let Err(err) = publish(&storage, &snapshot) {
                    warn!(error = %err, "Failed to publish status snapshot");
                }
            }
            Err(err) => warn!(error = %err, "Poll cycle failed"),
        }
        thread::sleep(config.poll_interval());
    }
}

fn status(storage: StorageConfig, json: bool, cached: bool) -> Result<()> {
    let config = HelperConfig::load(&storage);
    let published = if cached {
        read_published(&storage)?
    } else {
        None
    };
    let snapshot = match published {
        Some(snapshot) => snapshot,
        None => {
            if cached {
                info!("No published snapshot yet, polling instead");
            }
            let store = FsStateStore::new(storage);
            Aggregator::new(&store, &ProcessProbe).poll()?
        }
    };

    if json {
        let text = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| HelperError::json("encode status snapshot", e))?;
        println!("{}", text);
    } else {
        print!("{}", render::render_menu(&snapshot, &config));
    }
    Ok(())
}

fn respond(
    storage: StorageConfig,
    session_id: &str,
    item_id: &str,
    decision: PermissionChoice,
) -> Result<()> {
    let store = FsStateStore::new(storage);
    respond_permission(&store, session_id, item_id, decision)?;
    info!(
        session = %session_id,
        item = %item_id,
        decision = %String::from(decision),
        "Recorded permission response"
    );
    Ok(())
}

fn answer(
    storage: StorageConfig,
    session_id: &str,
    item_id: &str,
    index: usize,
    label: &str,
) -> Result<()> {
    let store = FsStateStore::new(storage);
    let response = answer_question(&store, session_id, item_id, index, label)?;
    info!(
        session = %session_id,
        item = %item_id,
        index,
        answered = response.answers.len(),
        "Recorded question answer"
    );
    Ok(())
}

fn set_mode(storage: StorageConfig, mode: ElicitationMode) -> Result<()> {
    let mut config = HelperConfig::load(&storage);
    config.elicitation_mode = mode;
    config.save(&storage)?;
    info!(mode = ?mode, "Updated question mode for new sessions");
    Ok(())
}
