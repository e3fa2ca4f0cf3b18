//! # nexus-store
//!
//! Storage engine for Nexus.
//!
//! Task records live in a single SQLite table (WAL mode, mmap) so they
//! survive process restarts.  The dispatcher is the only writer; the CLI
//! polls the same file for task lists and status.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  TaskRepository (trait) / TaskStore      │
//! ├─────────────────────────────────────────┤
//! │  Database (rusqlite WAL + mmap)          │
//! │  Schema (user_version stamped)           │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use nexus_store::{Database, TaskRepository, TaskStore};
//!
//! let db = Database::open("data/nexus.db").await?;
//! let store = TaskStore::new(db);
//! store.upsert(&task).await?;
//! let recent = store.list().await?;
//! ```

pub mod db;
pub mod error;
pub mod schema;
pub mod task_store;

// ── re-exports ───────────────────────────────────────────────────────

pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use task_store::{StatusCounts, TaskRepository, TaskStore};
