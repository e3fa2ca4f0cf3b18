//! Durable task records.
//!
//! [`TaskStore`] keeps one row per task id.  Writes are whole-row upserts, so
//! each call atomically replaces the previous state of that task.  Metadata is
//! stored as a JSON document; timestamps as Unix microseconds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nexus_kernel::{Task, TaskId, TaskMetadata, TaskStatus};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

const SELECT_COLUMNS: &str = "SELECT id, description, priority, status, created_at, \
     scheduled_time, result, error, metadata FROM tasks";

// ═══════════════════════════════════════════════════════════════════════
//  Repository trait
// ═══════════════════════════════════════════════════════════════════════

/// Persistence contract the dispatcher writes through.
///
/// Only the dispatcher writes, and it writes a given task id sequentially, so
/// no conflict resolution beyond per-id atomic replace is required.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert or fully replace the record with `task.id`.
    async fn upsert(&self, task: &Task) -> StoreResult<()>;

    /// Fetch a task by id.
    async fn get(&self, id: TaskId) -> StoreResult<Option<Task>>;

    /// All tasks, newest `created_at` first.
    async fn list(&self) -> StoreResult<Vec<Task>>;

    /// Tasks in `status`, newest `created_at` first.
    async fn list_by_status(&self, status: TaskStatus) -> StoreResult<Vec<Task>>;
}

/// Number of tasks per lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.running + self.completed + self.failed
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  TaskStore
// ═══════════════════════════════════════════════════════════════════════

/// SQLite-backed [`TaskRepository`].
#[derive(Clone)]
pub struct TaskStore {
    db: Database,
}

impl TaskStore {
    /// Create a new task store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Count tasks grouped by status.
    #[instrument(skip(self))]
    pub async fn counts(&self) -> StoreResult<StatusCounts> {
        self.db
            .run(|conn| {
                let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;

                let mut counts = StatusCounts::default();
                for (status, n) in rows {
                    let n = u64::try_from(n).unwrap_or(0);
                    match status.parse::<TaskStatus>() {
                        Ok(TaskStatus::Pending) => counts.pending = n,
                        Ok(TaskStatus::Running) => counts.running = n,
                        Ok(TaskStatus::Completed) => counts.completed = n,
                        Ok(TaskStatus::Failed) => counts.failed = n,
                        Err(_) => {}
                    }
                }
                Ok(counts)
            })
            .await
    }

    async fn query(&self, status: Option<TaskStatus>) -> StoreResult<Vec<Task>> {
        self.db
            .run(move |conn| {
                let rows = match status {
                    Some(status) => {
                        let mut stmt = conn.prepare(&format!(
                            "{SELECT_COLUMNS} WHERE status = ?1 ORDER BY created_at DESC, id DESC"
                        ))?;
                        stmt.query_map(rusqlite::params![status.as_str()], TaskRow::from_row)?
                            .collect::<Result<Vec<_>, _>>()?
                    }
                    None => {
                        let mut stmt = conn.prepare(&format!(
                            "{SELECT_COLUMNS} ORDER BY created_at DESC, id DESC"
                        ))?;
                        stmt.query_map([], TaskRow::from_row)?
                            .collect::<Result<Vec<_>, _>>()?
                    }
                };

                rows.into_iter().map(TaskRow::into_task).collect()
            })
            .await
    }
}

#[async_trait]
impl TaskRepository for TaskStore {
    #[instrument(skip(self, task), fields(task_id = %task.id, status = %task.status))]
    async fn upsert(&self, task: &Task) -> StoreResult<()> {
        let id = task.id.to_string();
        let description = task.description.clone();
        let priority = i64::from(task.priority);
        let status = task.status.as_str();
        let created_at = task.created_at.timestamp_micros();
        let scheduled_time = task.scheduled_time.map(|t| t.timestamp_micros());
        let result = task.result.clone();
        let error = task.error.clone();
        let metadata = serde_json::to_string(&task.metadata)?;

        self.db
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO tasks (id, description, priority, status, created_at, scheduled_time, result, error, metadata) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                     ON CONFLICT(id) DO UPDATE SET \
                        description = excluded.description, \
                        priority = excluded.priority, \
                        status = excluded.status, \
                        created_at = excluded.created_at, \
                        scheduled_time = excluded.scheduled_time, \
                        result = excluded.result, \
                        error = excluded.error, \
                        metadata = excluded.metadata",
                    rusqlite::params![
                        id,
                        description,
                        priority,
                        status,
                        created_at,
                        scheduled_time,
                        result,
                        error,
                        metadata
                    ],
                )?;
                Ok(())
            })
            .await?;

        debug!("task persisted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: TaskId) -> StoreResult<Option<Task>> {
        let id = id.to_string();
        self.db
            .run(move |conn| {
                let result = conn.query_row(
                    &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                    rusqlite::params![id],
                    TaskRow::from_row,
                );
                match result {
                    Ok(row) => row.into_task().map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await
    }

    #[instrument(skip(self))]
    async fn list(&self) -> StoreResult<Vec<Task>> {
        self.query(None).await
    }

    #[instrument(skip(self))]
    async fn list_by_status(&self, status: TaskStatus) -> StoreResult<Vec<Task>> {
        self.query(Some(status)).await
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Internal row type
// ═══════════════════════════════════════════════════════════════════════

/// Raw row from the `tasks` table before parsing.
struct TaskRow {
    id: String,
    description: String,
    priority: i64,
    status: String,
    created_at: i64,
    scheduled_time: Option<i64>,
    result: Option<String>,
    error: Option<String>,
    metadata: String,
}

impl TaskRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            description: row.get(1)?,
            priority: row.get(2)?,
            status: row.get(3)?,
            created_at: row.get(4)?,
            scheduled_time: row.get(5)?,
            result: row.get(6)?,
            error: row.get(7)?,
            metadata: row.get(8)?,
        })
    }

    /// Convert raw column values into a [`Task`].
    fn into_task(self) -> StoreResult<Task> {
        let corrupt = |message: String| StoreError::CorruptRecord {
            id: self.id.clone(),
            message,
        };

        let id = Uuid::parse_str(&self.id).map_err(|e| corrupt(format!("bad id: {e}")))?;
        let status = self
            .status
            .parse::<TaskStatus>()
            .map_err(|e| corrupt(e.to_string()))?;
        let created_at = micros_to_datetime(self.created_at)
            .ok_or_else(|| corrupt(format!("bad created_at {}", self.created_at)))?;
        let scheduled_time = match self.scheduled_time {
            Some(micros) => Some(
                micros_to_datetime(micros)
                    .ok_or_else(|| corrupt(format!("bad scheduled_time {micros}")))?,
            ),
            None => None,
        };
        let metadata = TaskMetadata::from_value(serde_json::from_str(&self.metadata)?);

        Ok(Task {
            id,
            description: self.description,
            priority: u8::try_from(self.priority).unwrap_or(nexus_kernel::PRIORITY_MIN),
            status,
            created_at,
            scheduled_time,
            result: self.result,
            error: self.error,
            metadata,
        })
    }
}

fn micros_to_datetime(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}

// ── tests ────────────────────────────────────────────────────────────
