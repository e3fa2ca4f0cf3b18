//! Subcommand: `nexus run` -- interactive prompt.
//!
//! Each line is segmented into tasks and submitted; outcomes are printed as
//! the lifecycle events arrive, so the prompt never blocks on execution.

use std::io::Write as _;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use nexus_agent::{Agent, NexusConfig};
use nexus_kernel::EventBus;

use crate::helpers::{init_tracing, subscribe_console_feedback, subscribe_task_logging};

/// Run the interactive prompt until EOF, `quit`, or Ctrl+C.
pub async fn cmd_run(config_path: &str) -> Result<()> {
    let config = NexusConfig::load(config_path).context("failed to load configuration")?;
    init_tracing(&config.log.level);
    info!("starting Nexus");

    let bus = EventBus::new();
    subscribe_task_logging(&bus);
    subscribe_console_feedback(&bus);

    let agent = Agent::start(&config, bus)
        .await
        .context("failed to start agent")?;

    println!();
    println!("  Nexus v{}", env!("CARGO_PKG_VERSION"));
    println!("  Provider: {}", agent.provider_name());
    println!("  Database: {}", config.store.db_path.display());
    println!("  Type a request, or 'quit' to exit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read input")?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                info!("interrupted");
                break;
            }
        };

        let Some(line) = line else {
            println!();
            info!("EOF received, exiting");
            break;
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "quit" || trimmed == "exit" {
            info!("user requested exit");
            break;
        }

        let submission = agent.handle(trimmed).await;
        for task in &submission.accepted {
            match task.scheduled_time {
                Some(at) => println!(
                    "  [scheduled] {} at {}",
                    task.description,
                    at.with_timezone(&chrono::Local).format("%H:%M:%S")
                ),
                None => println!("  [queued] {}", task.description),
            }
        }
        for (descriptor, error) in &submission.rejected {
            println!("  [rejected] {}: {error}", descriptor.description);
        }
    }

    info!("shutting down");
    agent.shutdown().await;
    Ok(())
}
