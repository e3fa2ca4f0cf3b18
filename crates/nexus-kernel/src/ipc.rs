//! Named-topic event bus.
//!
//! Subscribers register an async handler against a topic name.  Publishing
//! an [`Event`] runs every handler currently subscribed to `event.name`
//! concurrently and returns once all of them have finished.
//!
//! Each handler invocation runs on its own tokio task, so an error *or a
//! panic* in one subscriber never aborts its siblings or the publisher.
//! Failures are collected into the returned [`PublishReport`].
//!
//! # Usage
//!
//! ```rust,no_run
//! # use nexus_kernel::ipc::{EventBus, Event, HandlerResult};
//! # async fn example() {
//! let bus = EventBus::new();
//! bus.subscribe("task_completed", |event| async move {
//!     println!("{}: {}", event.name, event.payload);
//!     HandlerResult::Ok(())
//! });
//!
//! let report = bus.publish(Event::task_completed(uuid::Uuid::now_v7(), "done")).await;
//! assert!(report.is_clean());
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{BoxFuture, join_all};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Published when a task has been persisted and handed to the worker pool.
pub const TASK_SUBMITTED: &str = "task_submitted";
/// Published when a task enters `Running`.
pub const TASK_STARTED: &str = "task_started";
/// Published when a task reaches `Completed`.
pub const TASK_COMPLETED: &str = "task_completed";
/// Published when a task reaches `Failed`.
pub const TASK_FAILED: &str = "task_failed";

/// All task lifecycle topics, in lifecycle order.
pub const TASK_TOPICS: [&str; 4] = [TASK_SUBMITTED, TASK_STARTED, TASK_COMPLETED, TASK_FAILED];

/// An immutable notification flowing through the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Topic identifier.
    pub name: String,
    /// JSON object payload.
    pub payload: Value,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn task_submitted(task_id: Uuid) -> Self {
        Self::new(TASK_SUBMITTED, json!({ "task_id": task_id }))
    }

    pub fn task_started(task_id: Uuid) -> Self {
        Self::new(TASK_STARTED, json!({ "task_id": task_id }))
    }

    pub fn task_completed(task_id: Uuid, result: &str) -> Self {
        Self::new(TASK_COMPLETED, json!({ "task_id": task_id, "result": result }))
    }

    pub fn task_failed(task_id: Uuid, error: &str) -> Self {
        Self::new(TASK_FAILED, json!({ "task_id": task_id, "error": error }))
    }

    /// The `task_id` carried by lifecycle events, if any.
    pub fn task_id(&self) -> Option<Uuid> {
        self.payload
            .get("task_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Outcome of a single handler invocation.
pub type HandlerResult = std::result::Result<(), String>;

type Handler = Arc<dyn Fn(Arc<Event>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Summary of one [`EventBus::publish`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Number of handlers that were invoked.
    pub delivered: usize,
    /// One message per handler that returned an error or panicked.
    pub failures: Vec<String>,
}

impl PublishReport {
    /// `true` when every handler succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Event bus
// ---------------------------------------------------------------------------

/// Publish/subscribe bus keyed by topic name.
///
/// The bus is cheaply cloneable (`Arc`-backed) and `Send + Sync`.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

#[derive(Default)]
struct EventBusInner {
    handlers: DashMap<String, Vec<Handler>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events named `topic`.
    ///
    /// Handlers receive a shared [`Arc<Event>`]; the event is never cloned
    /// per subscriber.
    pub fn subscribe<F, Fut>(&self, topic: impl Into<String>, handler: F)
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let topic = topic.into();
        let handler: Handler =
            Arc::new(move |event: Arc<Event>| -> BoxFuture<'static, HandlerResult> {
                Box::pin(handler(event))
            });
        tracing::trace!(topic = %topic, "handler subscribed");
        self.inner.handlers.entry(topic).or_default().push(handler);
    }

    /// Number of handlers subscribed to `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.handlers.get(topic).map_or(0, |h| h.len())
    }

    /// Deliver `event` to every handler subscribed to its topic.
    ///
    /// Handlers run concurrently, each isolated on its own tokio task.  The
    /// returned future completes when all of them have finished or failed.
    /// Publishing to a topic with no subscribers is a no-op.
    pub async fn publish(&self, event: Event) -> PublishReport {
        // Snapshot the handler list so the map shard lock is not held while
        // handlers run (a handler may itself subscribe or publish).
        let handlers: Vec<Handler> = match self.inner.handlers.get(&event.name) {
            Some(entry) => entry.value().clone(),
            None => {
                tracing::trace!(topic = %event.name, "event published but no subscribers");
                return PublishReport::default();
            }
        };

        let event = Arc::new(event);
        let joins = handlers.into_iter().map(|handler| {
            let event = Arc::clone(&event);
            tokio::spawn(async move { handler(event).await })
        });
        let outcomes = join_all(joins).await;

        let mut report = PublishReport {
            delivered: outcomes.len(),
            failures: Vec::new(),
        };
        for outcome in outcomes {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(reason)) => report.failures.push(reason),
                Err(join_err) => report.failures.push(format!("handler panicked: {join_err}")),
            }
        }

        if !report.is_clean() {
            tracing::warn!(
                topic = %event.name,
                delivered = report.delivered,
                failed = report.failures.len(),
                failures = ?report.failures,
                "event handlers failed"
            );
        } else {
            tracing::trace!(topic = %event.name, delivered = report.delivered, "event published");
        }

        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
