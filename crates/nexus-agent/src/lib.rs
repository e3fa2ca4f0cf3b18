//! Nexus agent runtime.
//!
//! Wires the intent segmenter to the task dispatcher and the store.
//!
//! ## Architecture
//!
//! ```text
//! utterance ──> IntentSegmenter ──> [TaskDescriptor] ──> Dispatcher
//!                                                          │
//!                ┌──────────────┬───────────────┬──────────┤
//!                ▼              ▼               ▼          ▼
//!           TaskStore      EventBus        Scheduler   Collaborators
//!           (SQLite)    (lifecycle)   (pool + delay)  (actuator, shell,
//!                                                      search, player)
//! ```
//!
//! ## Modules
//!
//! - [`config`] -- `NexusConfig`: TOML file plus environment overrides.
//! - [`orchestrator`] -- The dispatcher and its execution pipeline.
//! - [`runtime`] -- The `Agent` front door used by the CLI.
//! - [`error`] -- Agent error types.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod runtime;

pub use config::{DEFAULT_CONFIG_PATH, NexusConfig, ProviderKind};
pub use error::{AgentError, Result};
pub use orchestrator::{Collaborators, Dispatcher, DispatcherConfig, REMINDER_TITLE};
pub use runtime::{Agent, Submission};
