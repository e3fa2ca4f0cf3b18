//! Intent segmentation for Nexus.
//!
//! This crate turns a free-form utterance into an ordered list of
//! [`TaskDescriptor`](nexus_kernel::TaskDescriptor)s:
//!
//! - **Rules**: the deterministic offline classifier, [`rules::LocalClassifier`].
//! - **Providers**: the [`provider::IntentProvider`] seam and the
//!   [`provider::FallbackProvider`] chain (primary → secondary → local).
//! - **Remote**: an OpenAI-compatible classifier with optional vision,
//!   [`llm::RemoteClassifier`].
//! - **Segmenter**: the entry point, [`segmenter::IntentSegmenter`], which
//!   also decides when to capture the screen.

pub mod error;
pub mod llm;
pub mod provider;
pub mod rules;
pub mod segmenter;

pub use error::{IntentError, Result};
pub use llm::{RemoteClassifier, RemoteConfig};
pub use provider::{FallbackProvider, IntentProvider};
pub use rules::{LocalClassifier, fallback_descriptor, suppressed_by_play_intent};
pub use segmenter::{IntentSegmenter, wants_screen};
