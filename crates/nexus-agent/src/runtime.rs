//! The agent front door.
//!
//! An [`Agent`] pairs the intent segmenter with the dispatcher: each
//! utterance is split into task descriptors and every descriptor is handed to
//! the dispatcher independently.  A rejected descriptor (queue full, store
//! down) never blocks its siblings.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use nexus_adapters::DesktopCapture;
use nexus_intent::IntentSegmenter;
use nexus_kernel::{EventBus, Scheduler, Task, TaskDescriptor, TaskId};
use nexus_store::{Database, TaskRepository, TaskStore};

use crate::config::NexusConfig;
use crate::error::{AgentError, Result};
use crate::orchestrator::{Collaborators, Dispatcher};

/// How often [`Agent::wait_for`] re-reads the store.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of handing one utterance to the agent.
#[derive(Debug, Default)]
pub struct Submission {
    /// Tasks persisted and queued, in segment order.
    pub accepted: Vec<Task>,
    /// Descriptors the dispatcher refused, with the reason.
    pub rejected: Vec<(TaskDescriptor, AgentError)>,
}

impl Submission {
    pub fn ids(&self) -> Vec<TaskId> {
        self.accepted.iter().map(|t| t.id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty() && self.rejected.is_empty()
    }
}

/// Segmenter plus dispatcher.
pub struct Agent {
    segmenter: IntentSegmenter,
    dispatcher: Dispatcher,
    store: TaskStore,
    scheduler_handle: Option<JoinHandle<()>>,
}

impl Agent {
    /// Assemble an agent from parts.  The dispatcher's scheduler must already
    /// be started.
    pub fn new(segmenter: IntentSegmenter, dispatcher: Dispatcher, store: TaskStore) -> Self {
        Self {
            segmenter,
            dispatcher,
            store,
            scheduler_handle: None,
        }
    }

    /// Build and start a full agent from configuration: open the store, start
    /// the scheduler, wire the host collaborators and the configured intent
    /// provider.
    pub async fn start(config: &NexusConfig, bus: EventBus) -> Result<Self> {
        for warning in config.validate() {
            warn!(%warning, "configuration");
        }

        let db = Database::open(config.store.db_path.clone()).await?;
        let store = TaskStore::new(db);

        let scheduler = Scheduler::new(config.scheduler_config());
        let handle = scheduler.start()?;

        let dispatcher = Dispatcher::new(
            Arc::new(store.clone()),
            bus,
            scheduler,
            Collaborators::system(),
            config.dispatcher_config(),
        );
        let segmenter =
            IntentSegmenter::new(config.build_provider()).with_capture(Arc::new(DesktopCapture::new()));

        info!(
            provider = segmenter.provider_name(),
            db = %config.store.db_path.display(),
            "agent started"
        );

        Ok(Self {
            segmenter,
            dispatcher,
            store,
            scheduler_handle: Some(handle),
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn provider_name(&self) -> &str {
        self.segmenter.provider_name()
    }

    /// Segment `utterance` and submit every resulting task.
    pub async fn handle(&self, utterance: &str) -> Submission {
        let descriptors = self.segmenter.interpret(utterance).await;
        let mut submission = Submission::default();

        for descriptor in descriptors {
            match self.dispatcher.submit_descriptor(descriptor.clone()).await {
                Ok(task) => submission.accepted.push(task),
                Err(e) => {
                    warn!(description = %descriptor.description, error = %e, "task rejected");
                    submission.rejected.push((descriptor, e));
                }
            }
        }

        submission
    }

    /// Poll the store until every task in `ids` is terminal or `timeout`
    /// elapses.  Returns the latest stored record of each task found.
    pub async fn wait_for(&self, ids: &[TaskId], timeout: Duration) -> Result<Vec<Task>> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut tasks = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(task) = self.store.get(*id).await? {
                    tasks.push(task);
                }
            }

            let settled = tasks.len() == ids.len() && tasks.iter().all(|t| t.status.is_terminal());
            if settled || Instant::now() >= deadline {
                return Ok(tasks);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Stop the scheduler.  Queued and deferred work is abandoned; tasks
    /// already running finish.
    pub async fn shutdown(mut self) {
        self.dispatcher.scheduler().shutdown();
        if let Some(handle) = self.scheduler_handle.take()
            && let Err(e) = handle.await
        {
            warn!(error = %e, "scheduler did not stop cleanly");
        }
        info!("agent stopped");
    }
}
