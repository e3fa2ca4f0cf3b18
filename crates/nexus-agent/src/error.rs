//! Agent error types.
//!
//! All agent subsystems surface errors through [`AgentError`].  Inside the
//! dispatch pipeline an error never escapes: it is stringified into the
//! task's `error` field.  Only [`Dispatcher::submit`](crate::Dispatcher::submit)
//! and configuration loading return it to callers.

/// Unified error type for the agent runtime.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // -- Dispatch errors -----------------------------------------------------
    /// An actuator reported that it could not perform an action.
    #[error("{action} failed: {reason}")]
    ActionFailed { action: &'static str, reason: String },

    /// The task failed while running; carries the stringified cause.
    #[error("{0}")]
    Execution(String),

    // -- Configuration errors ------------------------------------------------
    /// Configuration validation or loading failed.
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    // -- Upstream crate errors -----------------------------------------------
    /// An error propagated from the kernel crate (queue full, shutdown,
    /// illegal transition).
    #[error("kernel error: {0}")]
    Kernel(#[from] nexus_kernel::KernelError),

    /// An error propagated from the store crate.
    #[error("store error: {0}")]
    Store(#[from] nexus_store::StoreError),

    /// An error propagated from a collaborator.
    #[error("{0}")]
    Adapter(#[from] nexus_adapters::AdapterError),

    /// An error propagated from the intent crate.
    #[error("intent error: {0}")]
    Intent(#[from] nexus_intent::IntentError),
}

impl AgentError {
    /// Whether the run queue rejected the submission.
    pub fn is_queue_full(&self) -> bool {
        matches!(self, Self::Kernel(nexus_kernel::KernelError::QueueFull { .. }))
    }
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;
