use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::{info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use vaultflow::clock::{Clock, SystemClock};
use vaultflow::config::{Config, SUPPORT_DIRS};
use vaultflow::daemon::{Tick, TickConfig, run_loop, shutdown_channel};
use vaultflow::domain::{Lane, RawItem, Stage};
use vaultflow::external::{CommandSender, CommandSource, INBOX_ORIGIN, InboxSource, Sender, Source};
use vaultflow::queue::Admission;
use vaultflow::scheduler::{ActionRegistry, DispatchOutcome, Schedule, ScheduleEngine, ScheduleFile};
use vaultflow::storage::StateStore;
use vaultflow::workflow::{BUILTIN_ACTIONS, Drainer, Producer, Workflow, builtin_registry};

mod cli;

use cli::Cli;
use cli::commands::{Commands, PollArgs};

/// State file used by `enqueue`
const MANUAL_STATE_FILE: &str = "manual_state.json";

fn setup_logging(config: &Config) -> Result<()> {
    let log_dir = config.log_dir();
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join(format!("{}.log", env!("CARGO_PKG_NAME")));

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let level = config.log_level.as_deref().unwrap_or("info");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
        println!("Vault: {}", config.vault_path.display());
    }

    match &cli.command {
        Commands::Scheduler {
            list,
            action,
            validate,
            schedule,
            poll,
        } => handle_scheduler_command(config, schedule.as_deref(), *list, *validate, action.as_deref(), poll).await,
        Commands::Watch { source, list, poll } => handle_watch_command(config, source, *list, poll).await,
        Commands::Send { sender, list, poll } => handle_send_command(config, sender, *list, poll).await,
        Commands::Approve { item, to } => handle_approve_command(config, item, to.clone()),
        Commands::Reject { item } => handle_reject_command(config, item),
        Commands::Enqueue {
            item_type,
            title,
            origin,
            lane,
            fields,
            body,
            dedup_id,
        } => {
            let mut raw = RawItem::new(origin.as_str(), item_type.as_str(), title.as_str());
            for (key, value) in fields {
                raw.frontmatter.set(key.as_str(), value.as_str());
            }
            raw.body = body.clone().unwrap_or_default();
            raw.dedup_id = dedup_id.clone();
            raw.lane = lane.clone();
            handle_enqueue_command(config, raw)
        }
        Commands::Status => handle_status_command(config),
        Commands::Init => handle_init_command(config),
    }
}

fn tick_config(poll: &PollArgs, default_secs: u64) -> TickConfig {
    let config = TickConfig::new(Duration::from_secs(poll.interval.unwrap_or(default_secs)));
    if poll.check_once { config.with_max_ticks(1) } else { config }
}

/// Run `task` on the real clock until Ctrl-C
async fn run_until_interrupted<T: Tick + ?Sized>(task: &mut T, config: &TickConfig) {
    let (tx, rx) = shutdown_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                let _ = tx.send(true);
            }
            Err(e) => {
                warn!("Cannot listen for Ctrl-C: {}", e);
                // Dropping the sender would stop the loop
                std::future::pending::<()>().await;
            }
        }
    });

    let state = run_loop(task, &SystemClock, config, rx).await;
    println!(
        "{} {} passes, {} units of work, {} failed",
        "Stopped:".cyan(),
        state.tick_count,
        state.total_work,
        state.total_failed
    );
}

fn workflow(config: &Config) -> Result<Arc<Workflow>> {
    let workflow = Workflow::from_config(config);
    workflow
        .queue()
        .ensure_layout(&config.lanes())
        .context("Failed to create vault folders")?;
    Ok(Arc::new(workflow))
}

/// Build every configured sender; a missing credential aborts startup
fn build_senders(config: &Config) -> Result<BTreeMap<String, Arc<dyn Sender>>> {
    let mut senders: BTreeMap<String, Arc<dyn Sender>> = BTreeMap::new();
    for sender_config in &config.senders {
        let sender = CommandSender::from_config(sender_config)?;
        senders.insert(sender_config.name.clone(), Arc::new(sender));
    }
    Ok(senders)
}

fn print_schedule(engine: &ScheduleEngine, now: chrono::NaiveDateTime) {
    println!("{}", "Scheduled tasks:".green());
    for scheduled in engine.schedule().tasks() {
        let task = &scheduled.task;
        let status = if task.enabled { "enabled".green() } else { "disabled".red() };
        let last = engine
            .last_run(&task.name)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        let next = engine
            .next_due(scheduled, now)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} [{}] {} -> {} (last: {}, next: {})",
            task.name.bold(),
            status,
            task.frequency,
            task.action,
            last,
            next
        );
        if let Some(description) = &task.description {
            println!("      {}", description.dimmed());
        }
    }
}

/// One line describing a manual run
///
/// A manual run always exits cleanly; unknown and failed actions are warnings.
fn manual_run_report(action: &str, outcome: &DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::Completed => format!("{} {}", "Completed:".green(), action),
        DispatchOutcome::Unknown => format!("{} unknown action '{}', nothing ran", "Warning:".yellow(), action),
        DispatchOutcome::Failed(reason) => {
            format!("{} action '{}' failed: {}", "Warning:".yellow(), action, reason)
        }
    }
}

async fn handle_scheduler_command(
    config: &Config,
    schedule_path: Option<&Path>,
    list: bool,
    validate: bool,
    action: Option<&str>,
    poll: &PollArgs,
) -> Result<()> {
    let schedule_path = config.resolve(schedule_path.unwrap_or(config.scheduler.schedule_file.as_path()));
    let state_path = config.resolve(&config.scheduler.state_file);
    let clock = SystemClock;

    // A manual run does not need a schedule file
    if let Some(action) = action {
        let workflow = workflow(config)?;
        let actions = builtin_registry(workflow, &build_senders(config)?, config);
        let mut engine = ScheduleEngine::new(Schedule::default(), StateStore::load(&state_path), actions);
        info!("Manual run of {}", action);
        let outcome = engine.run_manual(action, clock.now()).await;
        println!("{}", manual_run_report(action, &outcome));
        return Ok(());
    }

    let schedule = Schedule::load(&schedule_path)?;

    if validate {
        println!("{} {} tasks in {}", "Valid:".green(), schedule.len(), schedule_path.display());
        for scheduled in schedule.tasks() {
            let task = &scheduled.task;
            println!("  {} {} -> {}", task.name, scheduled.cron, task.action);
            if !BUILTIN_ACTIONS.contains(&task.action.as_str()) {
                println!("    {} unknown action '{}'", "Warning:".yellow(), task.action);
            }
        }
        return Ok(());
    }

    if list {
        let engine = ScheduleEngine::new(schedule, StateStore::load(&state_path), ActionRegistry::new());
        print_schedule(&engine, clock.now());
        return Ok(());
    }

    let workflow = workflow(config)?;
    let actions = builtin_registry(workflow, &build_senders(config)?, config);
    for scheduled in schedule.enabled() {
        if !actions.contains(&scheduled.task.action) {
            warn!("Task {} names unknown action {}", scheduled.task.name, scheduled.task.action);
        }
    }

    let mut engine = ScheduleEngine::new(schedule, StateStore::load(&state_path), actions);
    println!(
        "{} {} tasks from {}",
        "Scheduler started:".cyan(),
        engine.schedule().len(),
        schedule_path.display()
    );
    run_until_interrupted(&mut engine, &tick_config(poll, config.scheduler.poll_interval_secs)).await;
    Ok(())
}

async fn handle_watch_command(config: &Config, source_name: &str, list: bool, poll: &PollArgs) -> Result<()> {
    let workflow = workflow(config)?;

    if list {
        let items = workflow.queue().scan(&Lane::new(Stage::NeedsAction))?;
        println!("{} {} items in Needs_Action", "Pending:".green(), items.len());
        for item in items {
            println!("  [{}] {}", item.priority, item.file_name());
        }
        return Ok(());
    }

    let (source, state_file, interval): (Box<dyn Source>, PathBuf, u64) = if source_name == INBOX_ORIGIN {
        let inbox = workflow.queue().lane_dir(&Lane::new(Stage::Inbox));
        let source = InboxSource::new(inbox, config.inbox.clone(), workflow.classifier().clone());
        (
            Box::new(source) as Box<dyn Source>,
            config.inbox.state_file.clone(),
            config.inbox.interval_secs,
        )
    } else {
        let source_config = config
            .source(source_name)
            .ok_or_else(|| eyre!("No source named '{}' in config", source_name))?;
        let source = CommandSource::from_config(source_config)?;
        (
            Box::new(source) as Box<dyn Source>,
            source_config.state_file(),
            source_config.interval_secs,
        )
    };

    let state = StateStore::load(config.resolve(&state_file));
    let mut producer = Producer::new(workflow, source, state);
    println!("{} {}", "Watching:".cyan(), source_name);
    run_until_interrupted(&mut producer, &tick_config(poll, interval)).await;
    Ok(())
}

async fn handle_send_command(config: &Config, sender_name: &str, list: bool, poll: &PollArgs) -> Result<()> {
    let sender_config = config
        .sender(sender_name)
        .ok_or_else(|| eyre!("No sender named '{}' in config", sender_name))?;
    let workflow = workflow(config)?;

    if list {
        let items = workflow.consume_ready(&sender_config.lane)?;
        println!("{} {} items in {}", "Ready:".green(), items.len(), sender_config.lane);
        for item in items {
            println!("  [{}] {}", item.priority, item.file_name());
        }
        return Ok(());
    }

    let sender = CommandSender::from_config(sender_config)?;
    let mut drainer = Drainer::new(workflow, sender_config.lane.clone(), Arc::new(sender));
    println!("{} {} -> {}", "Sending:".cyan(), sender_config.lane, sender_name);
    run_until_interrupted(&mut drainer, &tick_config(poll, sender_config.interval_secs)).await;
    Ok(())
}

fn handle_approve_command(config: &Config, target: &str, to: Option<Lane>) -> Result<()> {
    info!("Approving: {}", target);
    let workflow = workflow(config)?;
    let item = workflow.locate(target, Stage::PendingApproval)?;
    let path = workflow.approve(&item, to, SystemClock.now().date())?;
    println!("{} {}", "Approved:".green(), path.display());
    Ok(())
}

fn handle_reject_command(config: &Config, target: &str) -> Result<()> {
    info!("Rejecting: {}", target);
    let workflow = workflow(config)?;
    let item = workflow.locate(target, Stage::PendingApproval)?;
    let path = workflow.reject(&item, SystemClock.now().date())?;
    println!("{} {}", "Rejected:".red(), path.display());
    Ok(())
}

fn handle_enqueue_command(config: &Config, raw: RawItem) -> Result<()> {
    let workflow = workflow(config)?;
    let mut state = StateStore::load(config.resolve(Path::new(MANUAL_STATE_FILE)));
    match workflow.produce(raw, &mut state, SystemClock.now())? {
        Admission::Admitted(path) => println!("{} {}", "Enqueued:".green(), path.display()),
        Admission::Skipped => println!("{}", "Already enqueued; skipped".yellow()),
    }
    Ok(())
}

fn handle_status_command(config: &Config) -> Result<()> {
    let workflow = Workflow::from_config(config);
    let queue = workflow.queue();
    println!("{} {}", "Vault:".green(), queue.root().display());
    if !queue.root().is_dir() {
        println!("  {}", "not initialized (run `vaultflow init`)".yellow());
        return Ok(());
    }

    for stage in Stage::ALL {
        let top = queue.count(&Lane::new(stage));
        let total = queue.count_stage(stage);
        let line = format!("  {:<18} {:>4}", stage.dir_name(), total);
        println!("{}", if total > 0 { line.bold() } else { line.normal() });
        if total > top {
            for channel in queue.channels(stage) {
                let count = queue.count(&Lane::with_channel(stage, channel.as_str()));
                println!("    {:<16} {:>4}", channel, count);
            }
        }
    }
    Ok(())
}

fn handle_init_command(config: &Config) -> Result<()> {
    let workflow = workflow(config)?;
    let root = workflow.queue().root();
    for dir in SUPPORT_DIRS {
        fs::create_dir_all(root.join(dir)).with_context(|| format!("Failed to create {}", dir))?;
    }
    println!("{} {}", "Vault ready:".green(), root.display());

    let schedule_path = config.resolve(&config.scheduler.schedule_file);
    if schedule_path.exists() {
        println!("  schedule kept: {}", schedule_path.display());
    } else {
        let yaml = serde_yaml::to_string(&ScheduleFile::starter()).context("Failed to render schedule")?;
        fs::write(&schedule_path, yaml).context("Failed to write schedule")?;
        println!("  schedule written: {}", schedule_path.display());
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(vault) = &cli.vault {
        config.vault_path = vault.clone();
    }

    // Setup logging
    setup_logging(&config).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
