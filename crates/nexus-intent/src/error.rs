//! Intent engine error types.
//!
//! None of these reach the dispatcher: the fallback chain turns every
//! provider error into a local classification and logs it.

/// Unified error type for the intent engine.
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    // -- Classification ------------------------------------------------------
    /// A provider answered but its output could not be turned into tasks.
    #[error("failed to parse classifier output: {reason}")]
    ParseFailed { reason: String },

    /// A provider produced no tasks at all.
    #[error("provider `{provider}` returned no tasks")]
    EmptyClassification { provider: String },

    // -- Remote providers ----------------------------------------------------
    /// A remote provider was configured without credentials.
    #[error("missing API key for provider `{provider}`")]
    MissingApiKey { provider: String },

    /// The HTTP round trip to a remote provider failed.
    #[error("classifier request failed: {reason}")]
    RequestFailed { reason: String },

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the intent crate.
pub type Result<T> = std::result::Result<T, IntentError>;
