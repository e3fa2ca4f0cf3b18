//! Provider abstraction and the fallback chain.
//!
//! An [`IntentProvider`] turns an utterance (and optionally a screenshot)
//! into task descriptors.  [`FallbackProvider`] chains a primary and an
//! optional secondary provider in front of the [`LocalClassifier`], so
//! analysis through it never fails and never comes back empty.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use nexus_kernel::TaskDescriptor;

use crate::error::{IntentError, Result};
use crate::rules::LocalClassifier;

/// Something that can classify an utterance into task descriptors.
#[async_trait]
pub trait IntentProvider: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Whether `analyze` makes use of an image.
    fn supports_vision(&self) -> bool {
        false
    }

    /// Classify `utterance`.  Providers without vision ignore `image`.
    async fn analyze(&self, utterance: &str, image: Option<&[u8]>) -> Result<Vec<TaskDescriptor>>;
}

// ---------------------------------------------------------------------------
// Fallback chain
// ---------------------------------------------------------------------------

/// primary → secondary → local.
pub struct FallbackProvider {
    chain: Vec<Arc<dyn IntentProvider>>,
    local: LocalClassifier,
}

impl FallbackProvider {
    /// A chain with `primary` in front of the local classifier.
    pub fn new(primary: Arc<dyn IntentProvider>) -> Self {
        Self {
            chain: vec![primary],
            local: LocalClassifier::new(),
        }
    }

    /// A chain that only consults the local classifier.
    pub fn local_only() -> Self {
        Self {
            chain: Vec::new(),
            local: LocalClassifier::new(),
        }
    }

    /// Add a provider to try after the ones already in the chain.
    pub fn with_secondary(mut self, secondary: Arc<dyn IntentProvider>) -> Self {
        self.chain.push(secondary);
        self
    }

    /// Names of the remote providers, in the order they are tried.
    pub fn provider_names(&self) -> Vec<&str> {
        self.chain.iter().map(|p| p.name()).collect()
    }

    /// Classify, falling through the chain on error or empty output.
    pub async fn resolve(&self, utterance: &str, image: Option<&[u8]>) -> Vec<TaskDescriptor> {
        for provider in &self.chain {
            let image = image.filter(|_| provider.supports_vision());
            match provider.analyze(utterance, image).await {
                Ok(tasks) if !tasks.is_empty() => {
                    debug!(provider = provider.name(), count = tasks.len(), "classified");
                    return tasks;
                }
                Ok(_) => {
                    let err = IntentError::EmptyClassification {
                        provider: provider.name().to_owned(),
                    };
                    warn!(provider = provider.name(), error = %err, "falling back");
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "falling back");
                }
            }
        }

        self.local.classify(utterance)
    }
}

impl Default for FallbackProvider {
    fn default() -> Self {
        Self::local_only()
    }
}

#[async_trait]
impl IntentProvider for FallbackProvider {
    fn name(&self) -> &str {
        "fallback"
    }

    fn supports_vision(&self) -> bool {
        self.chain.iter().any(|p| p.supports_vision())
    }

    async fn analyze(&self, utterance: &str, image: Option<&[u8]>) -> Result<Vec<TaskDescriptor>> {
        Ok(self.resolve(utterance, image).await)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use nexus_kernel::TaskKind;

    use super::*;

    /// Scripted provider that counts calls and records whether it saw an image.
    struct Scripted {
        name: &'static str,
        vision: bool,
        output: Option<Vec<TaskDescriptor>>,
        calls: AtomicUsize,
        saw_image: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &'static str, output: Option<Vec<TaskDescriptor>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                vision: false,
                output,
                calls: AtomicUsize::new(0),
                saw_image: AtomicUsize::new(0),
            })
        }

        fn with_vision(name: &'static str, output: Option<Vec<TaskDescriptor>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                vision: true,
                output,
                calls: AtomicUsize::new(0),
                saw_image: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl IntentProvider for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn supports_vision(&self) -> bool {
            self.vision
        }

        async fn analyze(&self, _utterance: &str, image: Option<&[u8]>) -> Result<Vec<TaskDescriptor>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if image.is_some() {
                self.saw_image.fetch_add(1, Ordering::SeqCst);
            }
            self.output.clone().ok_or_else(|| IntentError::RequestFailed {
                reason: "scripted failure".into(),
            })
        }
    }

    fn reply(text: &str) -> Vec<TaskDescriptor> {
        vec![TaskDescriptor::new(text, TaskKind::Response { text: text.into() })]
    }

    #[tokio::test]
    async fn primary_wins_when_it_answers() {
        let primary = Scripted::new("primary", Some(reply("from primary")));
        let secondary = Scripted::new("secondary", Some(reply("from secondary")));
        let chain = FallbackProvider::new(primary.clone()).with_secondary(secondary.clone());

        let tasks = chain.resolve("anything", None).await;
        assert_eq!(tasks[0].description, "from primary");
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_primary_falls_to_secondary() {
        let primary = Scripted::new("primary", None);
        let secondary = Scripted::new("secondary", Some(reply("from secondary")));
        let chain = FallbackProvider::new(primary.clone()).with_secondary(secondary);

        let tasks = chain.resolve("anything", None).await;
        assert_eq!(tasks[0].description, "from secondary");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn everything_failing_lands_on_local() {
        let chain = FallbackProvider::new(Scripted::new("primary", None))
            .with_secondary(Scripted::new("secondary", Some(Vec::new())));

        let tasks = chain.analyze("install vlc", None).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].description, "Install vlc");
    }

    #[tokio::test]
    async fn local_only_never_empty() {
        let tasks = FallbackProvider::local_only().resolve("", None).await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].description, "Process Request");
    }

    #[tokio::test]
    async fn image_only_reaches_vision_providers() {
        let blind = Scripted::new("blind", None);
        let seeing = Scripted::with_vision("seeing", Some(reply("a code editor")));
        let chain = FallbackProvider::new(blind.clone()).with_secondary(seeing.clone());
        assert!(chain.supports_vision());

        let png = [0x89, b'P', b'N', b'G'];
        let tasks = chain.resolve("describe my screen", Some(&png[..])).await;

        assert_eq!(tasks[0].description, "a code editor");
        assert_eq!(blind.saw_image.load(Ordering::SeqCst), 0);
        assert_eq!(seeing.saw_image.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn provider_names_in_order() {
        let chain = FallbackProvider::new(Scripted::new("a", None))
            .with_secondary(Scripted::new("b", None));
        assert_eq!(chain.provider_names(), vec!["a", "b"]);
        assert!(!chain.supports_vision());
    }
}
