//! The segmenter front door: utterance in, non-empty task list out.

use std::sync::Arc;

use tracing::{debug, info, warn};

use nexus_adapters::ScreenCapture;
use nexus_kernel::TaskDescriptor;

use crate::provider::{FallbackProvider, IntentProvider};
use crate::rules::LocalClassifier;

/// Words that suggest the user is asking about what is on screen.
const VISION_WORDS: [&str; 7] = ["screen", "look", "see", "what", "summarize", "describe", "read"];

/// Whether `utterance` should trigger a screen capture.
pub fn wants_screen(utterance: &str) -> bool {
    let lowered = utterance.to_lowercase();
    VISION_WORDS.iter().any(|w| lowered.contains(w))
}

/// Turns utterances into task descriptors through an injected provider.
pub struct IntentSegmenter {
    provider: Arc<dyn IntentProvider>,
    capture: Option<Arc<dyn ScreenCapture>>,
    local: LocalClassifier,
}

impl IntentSegmenter {
    pub fn new(provider: Arc<dyn IntentProvider>) -> Self {
        Self {
            provider,
            capture: None,
            local: LocalClassifier::new(),
        }
    }

    /// A segmenter that only uses the local rule classifier.
    pub fn local() -> Self {
        Self::new(Arc::new(FallbackProvider::local_only()))
    }

    /// Attach a screen capture collaborator used by [`interpret`](Self::interpret).
    pub fn with_capture(mut self, capture: Arc<dyn ScreenCapture>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Classify `utterance`, optionally with a screenshot.  Never empty.
    pub async fn analyze(&self, utterance: &str, image: Option<&[u8]>) -> Vec<TaskDescriptor> {
        let tasks = match self.provider.analyze(utterance, image).await {
            Ok(tasks) if !tasks.is_empty() => tasks,
            Ok(_) => {
                warn!(provider = self.provider.name(), "provider returned no tasks; using local rules");
                self.local.classify(utterance)
            }
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "provider failed; using local rules");
                self.local.classify(utterance)
            }
        };

        info!(count = tasks.len(), "utterance segmented");
        for (i, task) in tasks.iter().enumerate() {
            debug!(
                index = i + 1,
                description = %task.description,
                kind = task.kind().type_name(),
                "task descriptor"
            );
        }
        tasks
    }

    /// Classify `utterance`, capturing the screen first when the wording asks
    /// about it and the provider can use an image.
    pub async fn interpret(&self, utterance: &str) -> Vec<TaskDescriptor> {
        let image = match &self.capture {
            Some(capture) if self.provider.supports_vision() && wants_screen(utterance) => {
                match capture.capture().await {
                    Ok(Some(bytes)) => {
                        debug!(bytes = bytes.len(), "screen captured");
                        Some(bytes)
                    }
                    Ok(None) => {
                        warn!("screen capture unavailable on this platform");
                        None
                    }
                    Err(e) => {
                        warn!(error = %e, "screen capture failed");
                        None
                    }
                }
            }
            _ => None,
        };

        self.analyze(utterance, image.as_deref()).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
