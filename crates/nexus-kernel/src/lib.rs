//! Nexus kernel.
//!
//! Shared foundations for the Nexus command runtime:
//!
//! - **[`task`]** -- The task model: typed metadata ([`TaskKind`]), the
//!   segmenter's [`TaskDescriptor`], and the [`Task`] lifecycle state machine.
//! - **[`ipc`]** -- Named-topic event bus with concurrent, isolated fan-out.
//! - **[`scheduler`]** -- Bounded worker pool fed by a bounded run queue, plus
//!   a single shared delay queue for deferred work.
//! - **[`error`]** -- Unified kernel error types via [`thiserror`].
//!
//! All public types are `Send + Sync` and designed for use within a
//! multi-threaded tokio runtime.

pub mod error;
pub mod ipc;
pub mod scheduler;
pub mod task;

// Re-export the most commonly used types at the crate root for convenience.
pub use error::{KernelError, Result};
pub use ipc::{
    Event, EventBus, HandlerResult, PublishReport, TASK_COMPLETED, TASK_FAILED, TASK_STARTED,
    TASK_SUBMITTED, TASK_TOPICS,
};
pub use scheduler::{RunSlot, Scheduler, SchedulerConfig, TaskFn};
pub use task::{
    GuiAction, PRIORITY_MAX, PRIORITY_MIN, Task, TaskDescriptor, TaskId, TaskKind, TaskMetadata,
    TaskStatus,
};
