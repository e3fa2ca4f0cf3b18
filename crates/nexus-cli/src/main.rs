//! CLI entry point for Nexus.
//!
//! This binary provides the `nexus` command with subcommands for the
//! interactive prompt, one-shot requests, and inspecting recorded tasks.

mod cli;
mod commands;
mod helpers;
mod repl;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => repl::cmd_run(&cli.config).await,
        Commands::Submit { text, wait } => commands::cmd_submit(&cli.config, &text, wait).await,
        Commands::Tasks { status, limit } => {
            commands::cmd_tasks(&cli.config, status.as_deref(), limit).await
        }
        Commands::Show { id } => commands::cmd_show(&cli.config, &id).await,
        Commands::Status => commands::cmd_status(&cli.config).await,
    }
}
