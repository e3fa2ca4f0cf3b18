//! Task model.
//!
//! A [`Task`] is the unit of work that flows from the intent segmenter to the
//! dispatcher.  Its metadata is a typed [`TaskKind`] rather than a loose map;
//! the JSON form keeps the familiar `{"type": ..., ...}` shape so remote
//! classifiers and the store can exchange it as a document.
//!
//! # Lifecycle
//!
//! ```text
//! Pending  -->  Running  -->  Completed
//!                       \->  Failed
//! ```
//!
//! `Completed` and `Failed` are terminal.  Exactly one of `result` / `error`
//! is set once a task is terminal; neither is set before that.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{KernelError, Result};

/// Unique, time-ordered task identifier (UUID v7).
pub type TaskId = Uuid;

/// Lowest advisory priority.
pub const PRIORITY_MIN: u8 = 1;
/// Highest advisory priority.
pub const PRIORITY_MAX: u8 = 10;

/// Work-simulation duration used when a general task does not carry one.
const DEFAULT_GENERAL_DURATION: u64 = 2;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created and persisted, waiting to run (possibly until a scheduled time).
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl TaskStatus {
    /// The lowercase name used in storage and event payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transition can happen from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(KernelError::UnknownStatus(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// A GUI automation request routed to the actuator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GuiAction {
    Open { app: String },
    Type { text: String },
    Press { key: String },
    Close { app: String },
    Install { app: String },
    Uninstall { app: String },
}

impl GuiAction {
    /// The action name as it appears in the metadata document.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Type { .. } => "type",
            Self::Press { .. } => "press",
            Self::Close { .. } => "close",
            Self::Install { .. } => "install",
            Self::Uninstall { .. } => "uninstall",
        }
    }
}

/// What a task does.  Selects the dispatcher branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// Drive an application through the actuator.
    GuiAutomation(GuiAction),

    /// Search the web, or play media when the intent is music/video.
    WebSearch { query: String },

    /// Notify the user.  An empty message falls back to the description.
    Reminder {
        #[serde(default)]
        message: String,
    },

    /// Run a system command.
    Shell { command: String },

    /// Reply to the user; no external call.  An empty text falls back to
    /// the description.
    Response {
        #[serde(default)]
        text: String,
    },

    /// Simulated bounded work.  `topic` keeps the category a classifier
    /// assigned (e.g. `email`, `finance`) when it has no dedicated branch.
    General {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        #[serde(default = "default_general_duration")]
        duration: u64,
    },
}

fn default_general_duration() -> u64 {
    DEFAULT_GENERAL_DURATION
}

impl TaskKind {
    /// Shorthand for a [`TaskKind::General`] task.
    pub fn general(topic: Option<&str>, duration: u64) -> Self {
        Self::General {
            topic: topic.map(str::to_string),
            duration,
        }
    }

    /// The `type` discriminator used in the metadata document.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::GuiAutomation(_) => "gui_automation",
            Self::WebSearch { .. } => "web_search",
            Self::Reminder { .. } => "reminder",
            Self::Shell { .. } => "shell",
            Self::Response { .. } => "response",
            Self::General { .. } => "general",
        }
    }
}

/// Typed task metadata: the kind plus an optional scheduling delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    #[serde(flatten)]
    pub kind: TaskKind,

    /// Seconds after creation at which the task becomes due.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_delay_seconds: Option<u64>,
}

impl TaskMetadata {
    /// Metadata for an immediately runnable task.
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            scheduled_delay_seconds: None,
        }
    }

    /// Decode a metadata document.
    ///
    /// Never fails: a document whose `type` is unknown or whose fields do not
    /// fit the declared type degrades to [`TaskKind::General`], keeping the
    /// declared type as the topic.  A delay given as a float or a numeric
    /// string is rounded up to whole seconds; an unusable delay is dropped
    /// without affecting the kind.
    pub fn from_value(mut value: Value) -> Self {
        normalize_delay(&mut value);
        if let Ok(meta) = serde_json::from_value::<Self>(value.clone()) {
            return meta;
        }

        let topic = value
            .get("type")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let duration = value
            .get("duration")
            .and_then(|d| d.as_u64().or_else(|| d.as_f64().map(|f| f.max(0.0).ceil() as u64)))
            .unwrap_or(DEFAULT_GENERAL_DURATION);
        let scheduled_delay_seconds = value.get("scheduled_delay_seconds").and_then(Value::as_u64);

        Self {
            kind: TaskKind::General { topic, duration },
            scheduled_delay_seconds,
        }
    }

    /// Encode as a JSON document.
    pub fn to_value(&self) -> Value {
        // Serializing plain strings and integers into a `Value` cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

const DELAY_FIELD: &str = "scheduled_delay_seconds";

/// Rewrite the delay field as whole seconds, or remove it when unusable.
fn normalize_delay(value: &mut Value) {
    let Some(fields) = value.as_object_mut() else {
        return;
    };
    let Some(raw) = fields.get(DELAY_FIELD) else {
        return;
    };

    let seconds = match raw {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(whole_seconds)),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(whole_seconds),
        _ => None,
    };
    match seconds {
        Some(secs) => {
            fields.insert(DELAY_FIELD.to_string(), Value::from(secs));
        }
        None => {
            fields.remove(DELAY_FIELD);
        }
    }
}

fn whole_seconds(secs: f64) -> Option<u64> {
    // `as` saturates at u64::MAX for values past its range.
    (secs.is_finite() && secs >= 0.0).then(|| secs.ceil() as u64)
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// The segmenter's output unit: a description plus typed metadata, before it
/// becomes a persisted [`Task`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub description: String,
    pub metadata: TaskMetadata,
}

impl TaskDescriptor {
    pub fn new(description: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            description: description.into(),
            metadata: TaskMetadata::new(kind),
        }
    }

    /// Defer the task by `seconds` after creation.
    pub fn with_delay(mut self, seconds: u64) -> Self {
        self.metadata.scheduled_delay_seconds = Some(seconds);
        self
    }

    pub fn kind(&self) -> &TaskKind {
        &self.metadata.kind
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A persisted, trackable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    /// Advisory only; no scheduler orders by it.
    pub priority: u8,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    /// Absent means the task is eligible for immediate execution.
    pub scheduled_time: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub metadata: TaskMetadata,
}

impl Task {
    /// Create a pending task.  `scheduled_time` is derived once, here, from
    /// `metadata.scheduled_delay_seconds`; a delay past the calendar's end
    /// saturates to the latest representable instant.
    pub fn new(description: impl Into<String>, metadata: TaskMetadata) -> Self {
        let created_at = Utc::now();
        let scheduled_time = metadata.scheduled_delay_seconds.map(|secs| {
            i64::try_from(secs)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .and_then(|delta| created_at.checked_add_signed(delta))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        });

        Self {
            id: Uuid::now_v7(),
            description: description.into(),
            priority: PRIORITY_MIN,
            status: TaskStatus::Pending,
            created_at,
            scheduled_time,
            result: None,
            error: None,
            metadata,
        }
    }

    pub fn from_descriptor(descriptor: TaskDescriptor) -> Self {
        Self::new(descriptor.description, descriptor.metadata)
    }

    /// Set the advisory priority, clamped to `1..=10`.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(PRIORITY_MIN, PRIORITY_MAX);
        self
    }

    pub fn kind(&self) -> &TaskKind {
        &self.metadata.kind
    }

    /// Whether the task may start at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_time.is_none_or(|at| at <= now)
    }

    /// `Pending -> Running`.
    pub fn begin(&mut self) -> Result<()> {
        self.transition(TaskStatus::Pending, TaskStatus::Running)
    }

    /// `Running -> Completed`, recording the result.
    pub fn complete(&mut self, result: impl Into<String>) -> Result<()> {
        self.transition(TaskStatus::Running, TaskStatus::Completed)?;
        self.result = Some(result.into());
        self.error = None;
        Ok(())
    }

    /// `Running -> Failed`, recording the error.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(TaskStatus::Running, TaskStatus::Failed)?;
        self.error = Some(error.into());
        self.result = None;
        Ok(())
    }

    fn transition(&mut self, expected: TaskStatus, next: TaskStatus) -> Result<()> {
        if self.status != expected {
            return Err(KernelError::InvalidTaskState {
                task_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
