//! Task dispatcher.
//!
//! The dispatcher owns every task after the segmenter hands it over.  It is
//! the only writer of `status`, `result` and `error`, and it drives each task
//! through
//!
//! ```text
//! Pending --> Running --> Completed
//!                    \--> Failed
//! ```
//!
//! recording every transition in the store before publishing the matching
//! lifecycle event.  Execution runs on the kernel [`Scheduler`]: immediate
//! tasks take a run-queue slot at submission time, deferred tasks wait in the
//! scheduler's shared delay queue until their `scheduled_time`.
//!
//! Each task is routed to a collaborator by an exhaustive match on its
//! [`TaskKind`].  Errors and panics raised while dispatching are caught at
//! the pipeline boundary and turned into a `Failed` task.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use nexus_adapters::{
    ActionOutcome, Actuator, DesktopActuator, DuckDuckGoSearch, ShellRunner, SystemShell,
    WebAutomation, WebSearch, YouTubeAutomation,
};
use nexus_kernel::{
    Event, EventBus, GuiAction, KernelError, Scheduler, Task, TaskDescriptor, TaskFn, TaskKind,
};
use nexus_store::TaskRepository;

use crate::error::{AgentError, Result};

/// Notification title used for reminders.
pub const REMINDER_TITLE: &str = "Nexus Reminder";

/// Notification title used when the open fallback kicks in.
const NOTICE_TITLE: &str = "Nexus";

// ---------------------------------------------------------------------------
// Configuration and collaborators
// ---------------------------------------------------------------------------

/// Dispatcher tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Cap on the simulated work of `general` tasks, in seconds.
    pub max_work_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { max_work_secs: 30 }
    }
}

/// The external collaborators a dispatcher routes work to.
#[derive(Clone)]
pub struct Collaborators {
    pub actuator: Arc<dyn Actuator>,
    pub shell: Arc<dyn ShellRunner>,
    pub search: Arc<dyn WebSearch>,
    pub automation: Arc<dyn WebAutomation>,
}

impl Collaborators {
    /// The default implementations for the host system.
    pub fn system() -> Self {
        Self {
            actuator: Arc::new(DesktopActuator::new()),
            shell: Arc::new(SystemShell::new()),
            search: Arc::new(DuckDuckGoSearch::new()),
            automation: Arc::new(YouTubeAutomation::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Persists, schedules and executes tasks.
///
/// Cheaply cloneable; clones share the same store, bus and scheduler.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    store: Arc<dyn TaskRepository>,
    bus: EventBus,
    scheduler: Scheduler,
    collaborators: Collaborators,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Create a dispatcher.  `scheduler` must be started separately for work
    /// to actually run.
    pub fn new(
        store: Arc<dyn TaskRepository>,
        bus: EventBus,
        scheduler: Scheduler,
        collaborators: Collaborators,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                store,
                bus,
                scheduler,
                collaborators,
                config,
            }),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn store(&self) -> &Arc<dyn TaskRepository> {
        &self.inner.store
    }

    /// Create a task from `descriptor` and submit it.
    pub async fn submit_descriptor(&self, descriptor: TaskDescriptor) -> Result<Task> {
        self.submit(Task::from_descriptor(descriptor)).await
    }

    /// Accept a pending task.  Returns once it is persisted and queued,
    /// without waiting for it to run.
    ///
    /// A task whose `scheduled_time` lies in the future is parked in the
    /// delay queue.  Any other task needs a free run-queue slot; when none is
    /// available the submission is rejected before anything is written.
    pub async fn submit(&self, task: Task) -> Result<Task> {
        let inner = &self.inner;

        if let Some(when) = task.scheduled_time
            && when > Utc::now()
        {
            if inner.scheduler.is_shutdown() {
                return Err(KernelError::SchedulerShutdown.into());
            }
            inner.store.upsert(&task).await?;
            inner
                .scheduler
                .schedule_at(task.id, task.description.clone(), when, self.pipeline(task.clone()))?;
            info!(task_id = %task.id, description = %task.description, at = %when, "task scheduled");
            return Ok(task);
        }

        let slot = inner.scheduler.reserve()?;
        inner.store.upsert(&task).await?;
        self.publish(Event::task_submitted(task.id)).await;
        slot.submit(task.id, task.description.clone(), self.pipeline(task.clone()));

        info!(task_id = %task.id, description = %task.description, "task submitted");
        Ok(task)
    }

    /// Wrap the execution pipeline for the scheduler.
    fn pipeline(&self, task: Task) -> TaskFn {
        let this = self.clone();
        Box::new(move || Box::pin(async move { this.execute(task).await }))
    }

    // -- Pipeline ------------------------------------------------------------

    /// Run a pending task to a terminal state.  `Err` carries the failure
    /// cause so the scheduler can log it.
    async fn execute(&self, mut task: Task) -> std::result::Result<(), String> {
        if let Err(e) = task.begin() {
            error!(task_id = %task.id, error = %e, "refusing to start task");
            return Err(e.to_string());
        }
        if let Err(e) = self.inner.store.upsert(&task).await {
            return self.record_failure(task, format!("persistence error: {e}")).await;
        }
        self.publish(Event::task_started(task.id)).await;
        debug!(task_id = %task.id, kind = task.kind().type_name(), "task started");

        let outcome = match AssertUnwindSafe(self.dispatch(&task)).catch_unwind().await {
            Ok(outcome) => outcome.map_err(|e| e.to_string()),
            Err(panic) => Err(format!("task panicked: {}", panic_message(panic.as_ref()))),
        };

        let result = match outcome {
            Ok(result) => result,
            Err(reason) => return self.record_failure(task, reason).await,
        };

        let mut done = task.clone();
        if let Err(e) = done.complete(result.as_str()) {
            return self.record_failure(task, e.to_string()).await;
        }
        if let Err(e) = self.inner.store.upsert(&done).await {
            return self.record_failure(task, format!("persistence error: {e}")).await;
        }

        info!(task_id = %done.id, result = %result, "task completed");
        self.publish(Event::task_completed(done.id, &result)).await;
        Ok(())
    }

    /// Mark a running task failed, persist it best-effort, and announce it.
    async fn record_failure(&self, mut task: Task, reason: String) -> std::result::Result<(), String> {
        if let Err(e) = task.fail(reason.as_str()) {
            error!(task_id = %task.id, error = %e, "could not mark task failed");
        }
        if let Err(e) = self.inner.store.upsert(&task).await {
            error!(task_id = %task.id, error = %e, "could not persist task failure");
        }

        warn!(task_id = %task.id, error = %reason, "task failed");
        self.publish(Event::task_failed(task.id, &reason)).await;
        Err(reason)
    }

    async fn publish(&self, event: Event) {
        let topic = event.name.clone();
        let report = self.inner.bus.publish(event).await;
        if !report.is_clean() {
            warn!(topic = %topic, failures = ?report.failures, "event subscribers failed");
        }
    }

    // -- Dispatch table ------------------------------------------------------

    async fn dispatch(&self, task: &Task) -> Result<String> {
        let c = &self.inner.collaborators;

        match task.kind() {
            TaskKind::GuiAutomation(action) => self.automate(action).await,

            TaskKind::WebSearch { query } => {
                if is_media_request(query, &task.description) {
                    Ok(c.automation.search_and_play(query).await?)
                } else {
                    let results = c.search.search(query).await?;
                    Ok(format!("Search results for '{query}': {} found", results.len()))
                }
            }

            TaskKind::Reminder { message } => {
                let message = non_empty_or(message, &task.description);
                checked("notify", c.actuator.notify(REMINDER_TITLE, message).await)?;
                Ok(format!("Reminder sent: {message}"))
            }

            TaskKind::Shell { command } => {
                let output = c.shell.run(command).await?;
                let mut result = format!("Command executed. Output: {}", output.stdout);
                if !output.stderr.is_empty() {
                    result.push_str(&format!(" Error: {}", output.stderr));
                }
                Ok(result)
            }

            TaskKind::Response { text } => Ok(non_empty_or(text, &task.description).to_owned()),

            TaskKind::General { duration, .. } => {
                let secs = (*duration).min(self.inner.config.max_work_secs);
                tokio::time::sleep(Duration::from_secs(secs)).await;
                Ok(format!("Executed: {}", task.description))
            }
        }
    }

    async fn automate(&self, action: &GuiAction) -> Result<String> {
        let actuator = &self.inner.collaborators.actuator;

        match action {
            GuiAction::Open { app } => match actuator.open(app).await {
                ActionOutcome::Success(message) => Ok(message),
                ActionOutcome::Failure(reason) => self.open_website_instead(app, reason).await,
            },
            GuiAction::Type { text } => checked("type", actuator.type_text(text).await),
            GuiAction::Press { key } => checked("press", actuator.press(key).await),
            GuiAction::Close { app } => checked("close", actuator.close(app).await),
            GuiAction::Install { app } => checked("install", actuator.install(app).await),
            GuiAction::Uninstall { app } => checked("uninstall", actuator.uninstall(app).await),
        }
    }

    /// Open-failure recovery: tell the user, look up the app's website, and
    /// open the first hit.  With no hit the original failure stands.
    async fn open_website_instead(&self, app: &str, reason: String) -> Result<String> {
        let c = &self.inner.collaborators;
        warn!(app, reason = %reason, "app not found; falling back to its website");

        let notice = c
            .actuator
            .notify(NOTICE_TITLE, &format!("Could not find {app}, opening website instead."))
            .await;
        if !notice.is_success() {
            debug!(reason = notice.message(), "fallback notice not shown");
        }

        let query = format!("{app} official website");
        let results = c.search.search(&query).await.map_err(|e| AgentError::ActionFailed {
            action: "open",
            reason: format!("{reason}; website lookup failed: {e}"),
        })?;

        let Some(first) = results.first() else {
            return Err(AgentError::ActionFailed {
                action: "open",
                reason,
            });
        };

        c.automation.open_url(&first.url).await?;
        Ok(format!("App not found. Opened website: {}", first.url))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Music and video requests go to the player instead of the search engine.
fn is_media_request(query: &str, description: &str) -> bool {
    let query = query.to_lowercase();
    query.contains("song") || query.contains("music") || description.to_lowercase().contains("play")
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() { fallback } else { value }
}

fn checked(action: &'static str, outcome: ActionOutcome) -> Result<String> {
    outcome
        .into_result()
        .map_err(|reason| AgentError::ActionFailed { action, reason })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_detection() {
        assert!(is_media_request("jazz song", "Play jazz"));
        assert!(is_media_request("lofi MUSIC", "Search"));
        assert!(is_media_request("lofi", "Play lofi"));
        assert!(!is_media_request("rust traits", "Search: rust traits"));
    }

    #[test]
    fn empty_text_falls_back_to_description() {
        assert_eq!(non_empty_or("  ", "Remind: stretch"), "Remind: stretch");
        assert_eq!(non_empty_or("stretch", "Remind: stretch"), "stretch");
    }

    #[test]
    fn checked_maps_failure_to_action_error() {
        assert_eq!(checked("close", ActionOutcome::success("Closed vlc")).unwrap(), "Closed vlc");

        let err = checked("close", ActionOutcome::failure("no such process")).unwrap_err();
        assert_eq!(err.to_string(), "close failed: no such process");
    }

    #[test]
    fn panic_payloads() {
        let s: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(s.as_ref()), "boom");
        let s: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(s.as_ref()), "bang");
        let s: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(s.as_ref()), "unknown panic");
    }
}
