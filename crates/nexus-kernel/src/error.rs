//! Kernel error types.
//!
//! All kernel subsystems surface errors through [`KernelError`], which is the
//! single error type returned by every public API in this crate.  Each variant
//! carries enough context for callers to decide how to handle the failure
//! without inspecting opaque strings.

use uuid::Uuid;

use crate::task::TaskStatus;

/// Unified error type for the Nexus kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    // -- Task model errors --------------------------------------------------
    /// A lifecycle transition was requested that the state machine forbids
    /// (e.g. completing a task that never started).
    #[error("invalid task state transition for {task_id}: {from} -> {to}")]
    InvalidTaskState {
        task_id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// A persisted status string did not name a known lifecycle state.
    #[error("unknown task status `{0}`")]
    UnknownStatus(String),

    // -- Scheduler errors ---------------------------------------------------
    /// The run queue is at capacity and the submission was rejected.
    #[error("run queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The scheduler has been shut down and will not accept new work.
    #[error("scheduler is shut down")]
    SchedulerShutdown,

    /// [`crate::Scheduler::start`] was called more than once.
    #[error("scheduler already started")]
    AlreadyStarted,

    // -- Generic ------------------------------------------------------------
    /// Catch-all for unexpected internal errors that don't fit a specific
    /// variant.  Prefer a typed variant whenever possible.
    #[error("internal kernel error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;
