//! Command-line front end for a local yard store.
//!
//! Every command opens the store named by `--db`, the config file or
//! `YARDSYNC_DB_PATH`, in that order of precedence.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;
use yardsync_core::model::now_epoch_ms;
use yardsync_core::sync::{Credentials, LoopbackRemote, SyncDirection, SyncState};
use yardsync_core::{
    init_logging_with, CoreConfig, LogLevel, LogSettings, OperationDraft, OperationPriority,
    RecordType, ResetConfirmation, SyncConfig, TaskDraft, WagonDraft, WagonStatus, Workspace,
    YardService, RESET_PHRASE,
};

const LOOPBACK_ENDPOINT: &str = "ws://loopback.local:4984/yard";

#[derive(Parser)]
#[command(name = "yardsync")]
#[command(about = "Train-yard record store with background sync", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overrides config and environment
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage wagons
    #[command(subcommand)]
    Wagons(WagonCommand),

    /// Manage tasks
    #[command(subcommand)]
    Tasks(TaskCommand),

    /// Manage yard operations
    #[command(subcommand)]
    Ops(OperationCommand),

    /// Count live records, optionally of one type
    Count {
        #[arg(long = "type")]
        kind: Option<String>,
    },

    /// Dump every stored document as JSON
    Raw,

    /// Create sample wagons
    Seed {
        #[arg(default_value_t = 10)]
        count: usize,
    },

    /// Drop pushed tombstones and old conflict history
    Compact {
        /// Keep conflicts resolved within this many days
        #[arg(long, default_value_t = 7)]
        conflict_days: u64,
    },

    /// Delete every record
    Reset {
        /// Confirmation phrase; prompted for when absent
        #[arg(long)]
        confirm: Option<String>,
    },

    /// Run a sync session against an in-process loopback remote
    SyncLoopback(SyncLoopbackArgs),
}

#[derive(Subcommand)]
enum WagonCommand {
    List,
    Add(WagonArgs),
    /// Change the status of one wagon
    Status { id: Uuid, status: String },
    Delete { id: Uuid },
}

#[derive(Args)]
struct WagonArgs {
    /// Wagon number, e.g. WGN-1001
    number: String,
    #[arg(long = "type", default_value = "")]
    wagon_type: String,
    #[arg(long, default_value = "Available")]
    status: String,
    #[arg(long, default_value = "")]
    location: String,
    #[arg(long, default_value = "")]
    destination: String,
    #[arg(long)]
    legal_check: bool,
    #[arg(long, default_value = "")]
    notes: String,
}

#[derive(Subcommand)]
enum TaskCommand {
    List,
    Add {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Mark a task completed
    Done { id: Uuid },
    Delete { id: Uuid },
}

#[derive(Subcommand)]
enum OperationCommand {
    List {
        /// Only operations for this wagon
        #[arg(long)]
        wagon: Option<Uuid>,
    },
    Add {
        title: String,
        #[arg(long)]
        wagon: Option<Uuid>,
        #[arg(long = "type", default_value = "")]
        operation_type: String,
        #[arg(long, default_value = "")]
        assigned_to: String,
        #[arg(long, default_value = "Normal")]
        priority: String,
    },
    Complete { id: Uuid },
}

#[derive(Args)]
struct SyncLoopbackArgs {
    /// push | pull | push_and_pull; defaults to the config file, then push
    #[arg(long)]
    direction: Option<String>,
    /// Keep the session open until Ctrl-C
    #[arg(long)]
    continuous: bool,
    #[arg(long)]
    username: Option<String>,
    /// Falls back to the config file and YARDSYNC_SYNC_PASSWORD
    #[arg(long)]
    password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => CoreConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CoreConfig::from_env(),
    };
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = Some(level.clone());
    }
    start_logging(&config)?;

    let remote = LoopbackRemote::new();
    let workspace = Workspace::open(&config.db_path, Arc::new(remote.transport()))
        .with_context(|| format!("opening store {}", config.db_path.display()))?;
    info!(
        "event=cli_start module=cli status=ok db={}",
        config.db_path.display()
    );
    run(&workspace, &remote, &config, cli.command).await
}

fn start_logging(config: &CoreConfig) -> Result<()> {
    let level: LogLevel = config.log_level()?;
    let log_dir = match &config.log_dir {
        Some(dir) => dir.clone(),
        None => std::env::temp_dir().join("yardsync-logs"),
    };
    init_logging_with(LogSettings {
        level,
        log_dir,
        echo_warnings: true,
    })?;
    Ok(())
}

async fn run(
    workspace: &Workspace,
    remote: &LoopbackRemote,
    config: &CoreConfig,
    command: Commands,
) -> Result<()> {
    let service = workspace.service();
    match command {
        Commands::Wagons(command) => run_wagons(service, command)?,
        Commands::Tasks(command) => run_tasks(service, command)?,
        Commands::Ops(command) => run_operations(service, command)?,
        Commands::Count { kind } => {
            let count = match kind {
                Some(raw) => {
                    let kind = RecordType::parse(&raw)
                        .with_context(|| format!("unknown record type `{raw}`"))?;
                    workspace.store().count(kind)?
                }
                None => service.total_count()?,
            };
            println!("{count}");
        }
        Commands::Raw => {
            for document in service.raw_documents()? {
                println!("{}", document.json);
            }
        }
        Commands::Seed { count } => {
            let created = service.seed_sample_wagons(count)?;
            println!("Created {} wagon(s)", created.len());
        }
        Commands::Compact { conflict_days } => {
            let store = workspace.store();
            let retention_ms = i64::try_from(conflict_days.saturating_mul(24 * 60 * 60 * 1000))
                .unwrap_or(i64::MAX);
            let purged = store.purge_tombstones()?;
            let pruned = store.prune_conflicts(now_epoch_ms().saturating_sub(retention_ms))?;
            println!("Purged {purged} tombstone(s), pruned {pruned} conflict(s)");
        }
        Commands::Reset { confirm } => {
            let phrase = match confirm {
                Some(phrase) => phrase,
                None => prompt(&format!("Type {RESET_PHRASE} to delete every record: "))?,
            };
            let Some(confirmation) = ResetConfirmation::confirm(phrase.trim()) else {
                bail!("reset cancelled: confirmation phrase did not match");
            };
            let report = workspace.reset_all(confirmation).await?;
            println!(
                "Removed {} record(s); new store id {}",
                report.removed_records, report.store_id
            );
        }
        Commands::SyncLoopback(args) => run_sync_loopback(workspace, remote, config, args).await?,
    }
    Ok(())
}

fn run_wagons(service: &YardService, command: WagonCommand) -> Result<()> {
    match command {
        WagonCommand::List => {
            for wagon in service.list_wagons()? {
                println!(
                    "{}  {:<10} {:<17} {:<12} -> {}",
                    wagon.id,
                    wagon.wagon_number,
                    wagon.status.as_str(),
                    wagon.current_location,
                    wagon.destination
                );
            }
        }
        WagonCommand::Add(args) => {
            let draft = WagonDraft {
                wagon_number: args.number,
                wagon_type: args.wagon_type,
                status: parse_status(&args.status)?,
                current_location: args.location,
                destination: args.destination,
                requires_legal_check: args.legal_check,
                last_inspection: None,
                notes: args.notes,
            };
            println!("{}", service.create_wagon(&draft)?);
        }
        WagonCommand::Status { id, status } => {
            service.set_wagon_status(id, parse_status(&status)?)?;
        }
        WagonCommand::Delete { id } => service.delete_wagon(id)?,
    }
    Ok(())
}

fn run_tasks(service: &YardService, command: TaskCommand) -> Result<()> {
    match command {
        TaskCommand::List => {
            for task in service.list_tasks()? {
                let mark = if task.is_completed { "x" } else { " " };
                println!("{}  [{mark}] {}", task.id, task.title);
            }
        }
        TaskCommand::Add { title, description } => {
            let draft = TaskDraft {
                title,
                description,
                is_completed: false,
            };
            println!("{}", service.create_task(&draft)?);
        }
        TaskCommand::Done { id } => {
            service.set_task_completed(id, true)?;
        }
        TaskCommand::Delete { id } => service.delete_task(id)?,
    }
    Ok(())
}

fn run_operations(service: &YardService, command: OperationCommand) -> Result<()> {
    match command {
        OperationCommand::List { wagon } => {
            let operations = match wagon {
                Some(wagon_id) => service.operations_for_wagon(wagon_id)?,
                None => service.list_operations()?,
            };
            for operation in operations {
                println!(
                    "{}  {:<10} {:<8} {}",
                    operation.id,
                    operation.draft.status.as_str(),
                    operation.draft.priority.as_str(),
                    operation.draft.title
                );
            }
        }
        OperationCommand::Add {
            title,
            wagon,
            operation_type,
            assigned_to,
            priority,
        } => {
            let priority = OperationPriority::parse(&priority)
                .with_context(|| format!("unknown priority `{priority}`"))?;
            let wagon_number = match wagon {
                Some(wagon_id) => service
                    .get_wagon(wagon_id)?
                    .with_context(|| format!("wagon {wagon_id} not found"))?
                    .wagon_number,
                None => String::new(),
            };
            let draft = OperationDraft {
                wagon_id: wagon,
                wagon_number,
                operation_type,
                assigned_to,
                priority,
                ..OperationDraft::new(title)
            };
            println!("{}", service.create_operation(&draft)?);
        }
        OperationCommand::Complete { id } => {
            service.complete_operation(id)?;
        }
    }
    Ok(())
}

/// Pushes (and optionally pulls) through a loopback remote, printing
/// every status event until the session ends or Ctrl-C.
async fn run_sync_loopback(
    workspace: &Workspace,
    remote: &LoopbackRemote,
    config: &CoreConfig,
    args: SyncLoopbackArgs,
) -> Result<()> {
    let mut config = config.clone();
    if let (Some(section), Some(password)) = (config.sync.as_mut(), &args.password) {
        section.password = Some(password.clone());
    }
    let session = loopback_session(config.sync_config()?, args)?;
    println!("Syncing with {} ({})", session.endpoint, session.direction.as_str());

    let continuous = session.continuous;
    let mut events = workspace.sync().subscribe();
    workspace.start_sync(session).await?;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                println!("{}", event.status);
                if session_finished(&event.state, continuous) {
                    break;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("waiting for Ctrl-C")?;
                break;
            }
        }
    }

    workspace.stop_sync().await;
    println!("Remote holds {} document(s)", remote.documents().len());
    Ok(())
}

/// A failed one-shot session ends without `Stopped`; a continuous one
/// keeps retrying through `Offline` and `Error`.
fn session_finished(state: &SyncState, continuous: bool) -> bool {
    match state {
        SyncState::Stopped => true,
        SyncState::Offline | SyncState::Error(_) => !continuous,
        _ => false,
    }
}

/// Config-file session with flag overrides, or a push-only default.
fn loopback_session(
    from_config: Option<SyncConfig>,
    args: SyncLoopbackArgs,
) -> Result<SyncConfig> {
    let mut session = from_config.unwrap_or_else(|| {
        SyncConfig::new(LOOPBACK_ENDPOINT, Credentials::new("yard", "loopback"))
    });
    if let Some(raw) = &args.direction {
        let direction = SyncDirection::parse(raw)
            .with_context(|| format!("unknown sync direction `{raw}`"))?;
        session = session.with_direction(direction);
    }
    if let Some(username) = args.username {
        session.credentials.username = username;
    }
    if let Some(password) = args.password {
        session.credentials.password = password;
    }
    session.continuous = args.continuous;
    Ok(session)
}

fn parse_status(raw: &str) -> Result<WagonStatus> {
    WagonStatus::parse(raw).with_context(|| format!("unknown wagon status `{raw}`"))
}

fn prompt(message: &str) -> Result<String> {
    let mut stdout = std::io::stdout();
    stdout.write_all(message.as_bytes())?;
    stdout.flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}
