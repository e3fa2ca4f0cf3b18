//! CLI argument definitions for Nexus.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use clap::{Parser, Subcommand};

/// Nexus -- natural-language command runtime.
#[derive(Parser)]
#[command(
    name = "nexus",
    version,
    about = "Nexus -- turn natural-language requests into tracked desktop tasks",
    long_about = "Splits each request into independent tasks (open an app, search the web, \
                  set a reminder, run a command, ...) and executes them in the background, \
                  recording every task in a local SQLite database."
)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, short, global = true, default_value = nexus_agent::DEFAULT_CONFIG_PATH)]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the interactive prompt.
    Run,

    /// Handle a single request and exit.
    Submit {
        /// The request, e.g. `open notepad and check emails`.
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,

        /// Seconds to wait for the submitted tasks to finish.
        #[arg(long, short, default_value_t = 10)]
        wait: u64,
    },

    /// List recorded tasks, newest first.
    Tasks {
        /// Only show tasks in this state (pending, running, completed, failed).
        #[arg(long, short)]
        status: Option<String>,

        /// Maximum number of tasks to show.
        #[arg(long, short, default_value_t = 20)]
        limit: usize,
    },

    /// Show one task in full.
    Show {
        /// The task id.
        id: String,
    },

    /// Show configuration and task counts.
    Status,
}

impl Cli {
    /// The request text of `submit`, joined back into one utterance.
    pub fn utterance(words: &[String]) -> String {
        words.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn submit_joins_words() {
        let cli = Cli::parse_from(["nexus", "submit", "open", "notepad", "--wait", "3"]);
        match cli.command {
            Commands::Submit { text, wait } => {
                assert_eq!(Cli::utterance(&text), "open notepad");
                assert_eq!(wait, 3);
            }
            _ => panic!("expected submit"),
        }
        assert_eq!(cli.config, nexus_agent::DEFAULT_CONFIG_PATH);
    }

    #[test]
    fn tasks_defaults() {
        let cli = Cli::parse_from(["nexus", "tasks", "--status", "failed"]);
        match cli.command {
            Commands::Tasks { status, limit } => {
                assert_eq!(status.as_deref(), Some("failed"));
                assert_eq!(limit, 20);
            }
            _ => panic!("expected tasks"),
        }
    }
}
