//! Wishsync CLI - inspect and drain the offline wishlist action queue
//!
//! Headless access to the same durable queue the app uses: check what
//! is waiting, force a drain, and settle conflicts from the terminal.

mod cli;
mod error;

use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{CommandFactory, Parser};
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};
use serde::Serialize;
use wishsync_core::{
    ActionId, ActionStatus, Database, DrainOutcome, OfflineAction, SyncQueueManager, SyncService,
    SyncSettings,
};

use crate::cli::{Cli, Commands, CompletionShell, Strategy};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wishsync=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Status { json } => run_status(json, &db_path)?,
        Commands::List { limit, json } => run_list(limit, json, &db_path)?,
        Commands::Drain => run_drain(&SyncSettings::from_env(), &db_path).await?,
        Commands::Conflicts { json } => run_conflicts(json, &db_path)?,
        Commands::Resolve { id, strategy } => {
            run_resolve(id, strategy, &SyncSettings::from_env(), &db_path).await?;
        }
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusSummary {
    pending: usize,
    conflicted: usize,
    failed: usize,
    total: usize,
}

fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let queue = open_queue(db_path)?;
    let actions = queue.actions()?;

    let count =
        |status: ActionStatus| actions.iter().filter(|action| action.status == status).count();
    let summary = StatusSummary {
        pending: count(ActionStatus::Pending) + count(ActionStatus::InFlight),
        conflicted: count(ActionStatus::Conflicted),
        failed: count(ActionStatus::Failed),
        total: actions.len(),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if summary.total == 0 {
        println!("Queue is empty");
    } else {
        println!(
            "{} queued: {} pending, {} conflicted, {} failed",
            summary.total, summary.pending, summary.conflicted, summary.failed
        );
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct ActionListItem {
    id: i64,
    kind: String,
    entity: String,
    status: String,
    created_at: i64,
    relative_time: String,
}

fn run_list(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let queue = open_queue(db_path)?;
    let actions = queue.actions()?;
    let actions = &actions[..limit.min(actions.len())];

    if as_json {
        let items = actions.iter().map(action_to_list_item).collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for item in actions.iter().map(action_to_list_item) {
            println!(
                "{:<6}  {:<16}  {:<24}  {:<10}  {}",
                item.id, item.kind, item.entity, item.status, item.relative_time
            );
        }
    }

    Ok(())
}

async fn run_drain(settings: &SyncSettings, db_path: &Path) -> Result<(), CliError> {
    if !settings.is_configured() {
        return Err(CliError::SyncNotConfigured);
    }

    let (service, _scheduler, _surfaced) = SyncService::new(open_database(db_path)?, settings)?;

    match service.drain_now().await? {
        DrainOutcome::Completed(summary) => {
            println!(
                "Drained: {} committed, {} conflicted, {} skipped, {} remaining",
                summary.committed, summary.conflicted, summary.skipped, summary.remaining
            );
            if summary.stopped_on_transient {
                println!("Stopped early on a network failure; run again to retry");
            }
            if summary.conflicted > 0 {
                println!("Run `wishsync conflicts` to inspect, then `wishsync resolve`");
            }
        }
        DrainOutcome::AlreadyRunning => println!("A drain is already in progress"),
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct ConflictListItem {
    id: i64,
    kind: String,
    entity: String,
    local_data: serde_json::Value,
}

fn run_conflicts(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let queue = open_queue(db_path)?;
    let conflicted = queue.query(|action| action.status == ActionStatus::Conflicted)?;

    if as_json {
        let items = conflicted
            .iter()
            .map(|action| ConflictListItem {
                id: action.id.value(),
                kind: action.kind.to_string(),
                entity: action.entity().to_string(),
                local_data: serde_json::Value::Object(action.payload.local_view()),
            })
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if conflicted.is_empty() {
        println!("No unresolved conflicts");
    } else {
        for action in &conflicted {
            let local = serde_json::to_string(&action.payload.local_view())?;
            println!(
                "{:<6}  {:<16}  {:<24}  local: {local}",
                action.id, action.kind, action.entity().to_string()
            );
        }
    }

    Ok(())
}

async fn run_resolve(
    id: i64,
    strategy: Strategy,
    settings: &SyncSettings,
    db_path: &Path,
) -> Result<(), CliError> {
    if !settings.is_configured() {
        return Err(CliError::SyncNotConfigured);
    }

    let (service, _scheduler, _surfaced) = SyncService::new(open_database(db_path)?, settings)?;

    let action_id = ActionId::new(id);
    if service.queue().find(action_id)?.is_none() {
        return Err(CliError::ActionNotFound(id));
    }

    service.resolve(action_id, strategy.into()).await?;

    match strategy {
        Strategy::Local => println!("Resolved {id}: local version re-applied"),
        Strategy::Server => println!("Resolved {id}: server version kept"),
    }
    Ok(())
}

fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let mut command = Cli::command();
    let mut buffer = Vec::new();

    match shell {
        CompletionShell::Bash => generate_for_shell(shells::Bash, &mut command, &mut buffer),
        CompletionShell::Zsh => generate_for_shell(shells::Zsh, &mut command, &mut buffer),
        CompletionShell::Fish => generate_for_shell(shells::Fish, &mut command, &mut buffer),
    }

    if let Some(path) = output_path {
        std::fs::write(path, &buffer)?;
        println!("{}", path.display());
    } else {
        io::stdout().write_all(&buffer)?;
    }

    Ok(())
}

fn generate_for_shell<G: Generator>(
    generator: G,
    command: &mut clap::Command,
    buffer: &mut Vec<u8>,
) {
    generate(generator, command, "wishsync", buffer);
}

fn action_to_list_item(action: &OfflineAction) -> ActionListItem {
    let now_ms = Utc::now().timestamp_millis();
    ActionListItem {
        id: action.id.value(),
        kind: action.kind.to_string(),
        entity: action.entity().to_string(),
        status: action.status.as_str().to_string(),
        created_at: action.created_at,
        relative_time: format_relative_time(action.created_at, now_ms),
    }
}

fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

fn open_queue(db_path: &Path) -> Result<SyncQueueManager, CliError> {
    Ok(SyncQueueManager::new(open_database(db_path)?)?)
}

fn open_database(path: &Path) -> Result<Database, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    tracing::debug!(path = %path.display(), "opening queue database");
    Ok(Database::open(path)?)
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("WISHSYNC_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wishsync")
        .join("queue.db")
}
