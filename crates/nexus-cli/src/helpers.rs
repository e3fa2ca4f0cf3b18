//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, the lifecycle logging subscriber, and
//! task formatting.

use std::sync::Arc;

use nexus_kernel::{Event, EventBus, TASK_COMPLETED, TASK_FAILED, TASK_TOPICS, Task};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
/// `RUST_LOG` takes precedence when set.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Event subscribers
// ---------------------------------------------------------------------------

/// Log every task lifecycle event.
pub fn subscribe_task_logging(bus: &EventBus) {
    for topic in TASK_TOPICS {
        bus.subscribe(topic, |event: Arc<Event>| async move {
            let task_id = event.task_id().map(|id| id.to_string()).unwrap_or_default();
            match event.name.as_str() {
                TASK_FAILED => warn!(%task_id, error = %detail(&event, "error"), "task event: failed"),
                TASK_COMPLETED => {
                    info!(%task_id, result = %detail(&event, "result"), "task event: completed")
                }
                other => info!(%task_id, "task event: {other}"),
            }
            Ok::<(), String>(())
        });
    }
}

/// Print task outcomes to the console as they arrive.
pub fn subscribe_console_feedback(bus: &EventBus) {
    bus.subscribe(TASK_COMPLETED, |event: Arc<Event>| async move {
        println!("  [done] {}", detail(&event, "result"));
        Ok::<(), String>(())
    });
    bus.subscribe(TASK_FAILED, |event: Arc<Event>| async move {
        println!("  [failed] {}", detail(&event, "error"));
        Ok::<(), String>(())
    });
}

fn detail(event: &Event, field: &str) -> String {
    event
        .payload
        .get(field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_owned()
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// First eight characters of a task id.
pub fn short_id(task: &Task) -> String {
    task.id.to_string().chars().take(8).collect()
}

/// Shorten `text` to at most `max` characters, marking the cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// One table row for `nexus tasks`.
pub fn task_row(task: &Task) -> String {
    let outcome = task
        .error
        .as_deref()
        .or(task.result.as_deref())
        .unwrap_or("");
    format!(
        "  {:<8}  {:<9}  {}  {:<28}  {}",
        short_id(task),
        task.status.as_str(),
        task.created_at.format("%Y-%m-%d %H:%M:%S"),
        truncate(&task.description, 28),
        truncate(outcome, 40),
    )
}
