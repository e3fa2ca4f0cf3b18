//! Adapter error types.
//!
//! All collaborator implementations surface errors through [`AdapterError`].
//! Actuator calls are the exception: they report expected failures as
//! [`crate::ActionOutcome::Failure`] instead.

/// Unified error type for Nexus adapters.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// An I/O operation failed within the adapter.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// An HTTP request could not be completed.
    #[error("http error during {operation}: {reason}")]
    Http { operation: String, reason: String },

    /// An operation failed after it was started.
    #[error("{operation} failed: {reason}")]
    ExecutionFailed { operation: String, reason: String },

    /// An operation exceeded its time limit.
    #[error("timeout after {seconds}s: {reason}")]
    Timeout { seconds: u64, reason: String },

    /// Invalid input provided to adapter.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The operation is not available on this platform.
    #[error("unsupported on {platform}: {operation}")]
    Unsupported {
        platform: &'static str,
        operation: String,
    },
}

impl AdapterError {
    pub(crate) fn http(operation: &str, err: impl std::fmt::Display) -> Self {
        Self::Http {
            operation: operation.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Convenience alias used throughout the adapters crate.
pub type Result<T> = std::result::Result<T, AdapterError>;
