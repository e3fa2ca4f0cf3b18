//! Subcommands: `submit`, `tasks`, `show`, `status`.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use uuid::Uuid;

use nexus_agent::{Agent, NexusConfig};
use nexus_kernel::{EventBus, TaskStatus};
use nexus_store::{Database, TaskRepository, TaskStore};

use crate::cli::Cli;
use crate::helpers::{init_tracing, short_id, subscribe_task_logging, task_row};

async fn open_store(config: &NexusConfig) -> Result<TaskStore> {
    let db = Database::open(config.store.db_path.clone())
        .await
        .with_context(|| format!("failed to open database {}", config.store.db_path.display()))?;
    Ok(TaskStore::new(db))
}

fn load(config_path: &str, quiet: bool) -> Result<NexusConfig> {
    let config = NexusConfig::load(config_path).context("failed to load configuration")?;
    init_tracing(if quiet { "warn" } else { config.log.level.as_str() });
    Ok(config)
}

// ---------------------------------------------------------------------------
// Subcommand: submit
// ---------------------------------------------------------------------------

/// Handle one request, optionally waiting for its tasks to settle.
pub async fn cmd_submit(config_path: &str, words: &[String], wait: u64) -> Result<()> {
    let config = load(config_path, false)?;
    let utterance = Cli::utterance(words);

    let bus = EventBus::new();
    subscribe_task_logging(&bus);
    let agent = Agent::start(&config, bus)
        .await
        .context("failed to start agent")?;

    let submission = agent.handle(&utterance).await;
    for (descriptor, error) in &submission.rejected {
        println!("  [rejected] {}: {error}", descriptor.description);
    }
    if submission.accepted.is_empty() {
        agent.shutdown().await;
        bail!("no task was accepted");
    }

    let tasks = if wait > 0 {
        agent
            .wait_for(&submission.ids(), Duration::from_secs(wait))
            .await
            .context("failed to read task state")?
    } else {
        submission.accepted.clone()
    };

    println!();
    for task in &tasks {
        println!("{}", task_row(task));
    }
    println!();

    let unfinished = tasks.iter().filter(|t| !t.status.is_terminal()).count();
    if unfinished > 0 {
        println!("  {unfinished} task(s) still pending; they run only while a Nexus process is alive.");
        println!();
    }

    agent.shutdown().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: tasks
// ---------------------------------------------------------------------------

pub async fn cmd_tasks(config_path: &str, status: Option<&str>, limit: usize) -> Result<()> {
    let config = load(config_path, true)?;
    let store = open_store(&config).await?;

    let tasks = match status {
        Some(s) => {
            let status: TaskStatus = s.trim().to_lowercase().parse()?;
            store.list_by_status(status).await?
        }
        None => store.list().await?,
    };

    if tasks.is_empty() {
        println!("  No tasks recorded.");
        return Ok(());
    }

    println!();
    println!(
        "  {:<8}  {:<9}  {:<19}  {:<28}  {}",
        "ID", "STATUS", "CREATED", "DESCRIPTION", "OUTCOME"
    );
    for task in tasks.iter().take(limit) {
        println!("{}", task_row(task));
    }
    if tasks.len() > limit {
        println!("  ... {} more", tasks.len() - limit);
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: show
// ---------------------------------------------------------------------------

/// Print one task as JSON.  Accepts a full id or a unique prefix.
pub async fn cmd_show(config_path: &str, id: &str) -> Result<()> {
    let config = load(config_path, true)?;
    let store = open_store(&config).await?;

    let task = match Uuid::parse_str(id) {
        Ok(uuid) => store.get(uuid).await?,
        Err(_) => {
            let prefix = id.trim().to_lowercase();
            let mut matches: Vec<_> = store
                .list()
                .await?
                .into_iter()
                .filter(|t| t.id.to_string().starts_with(&prefix))
                .collect();
            match matches.len() {
                0 => None,
                1 => matches.pop(),
                n => bail!("id prefix `{id}` is ambiguous ({n} tasks)"),
            }
        }
    };

    let Some(task) = task else {
        bail!("no task with id `{id}`");
    };

    println!("{}", serde_json::to_string_pretty(&task)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: status
// ---------------------------------------------------------------------------

pub async fn cmd_status(config_path: &str) -> Result<()> {
    let config = load(config_path, true)?;

    println!();
    println!("  Nexus Status");
    println!("  ============");
    println!();
    println!("  Config file:      {config_path}");
    println!("  Provider:         {}", config.provider.kind);
    println!("  Model:            {}", config.provider.model);
    println!("  Vision:           {}", if config.provider.vision { "on" } else { "off" });
    println!(
        "  Scheduler:        {} workers, queue {}",
        config.scheduler.max_concurrent, config.scheduler.queue_capacity
    );
    println!("  Database:         {}", config.store.db_path.display());

    let store = open_store(&config).await?;
    let counts = store.counts().await.context("failed to count tasks")?;
    println!(
        "  Tasks:            {} total ({} pending, {} running, {} completed, {} failed)",
        counts.total(),
        counts.pending,
        counts.running,
        counts.completed,
        counts.failed
    );
    if let Some(latest) = store.list().await?.first() {
        println!("  Latest task:      {} {}", short_id(latest), latest.description);
    }

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!();
        for warning in warnings {
            println!("  [!] {warning}");
        }
    }
    println!();
    Ok(())
}
