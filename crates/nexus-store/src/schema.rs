//! Layout of the task database.
//!
//! The layout version lives in SQLite's `user_version` header field.  A new
//! file reads as version 0 and receives the `tasks` table; a file stamped by
//! a newer build is refused rather than misread.

use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// Layout written and understood by this build.
pub const SCHEMA_VERSION: i32 = 1;

const TASKS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS tasks (
        id             TEXT PRIMARY KEY,
        description    TEXT NOT NULL,
        priority       INTEGER NOT NULL DEFAULT 1,
        status         TEXT NOT NULL CHECK(status IN ('pending','running','completed','failed')),
        created_at     INTEGER NOT NULL,
        scheduled_time INTEGER,
        result         TEXT,
        error          TEXT,
        metadata       TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
    CREATE INDEX IF NOT EXISTS idx_tasks_created ON tasks(created_at);
";

/// The layout version stamped on `conn`'s file.
pub fn version(conn: &Connection) -> StoreResult<i32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Make sure `conn` holds the current layout.  Blocking.
///
/// The check and the table creation share one immediate transaction, so two
/// processes opening a new file at once do not both stamp it.
pub fn ensure(conn: &mut Connection) -> StoreResult<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    match version(&tx)? {
        SCHEMA_VERSION => {
            debug!(version = SCHEMA_VERSION, "task schema present");
            Ok(())
        }
        0 => {
            tx.execute_batch(TASKS_TABLE)?;
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            tx.commit()?;
            info!(version = SCHEMA_VERSION, "task schema created");
            Ok(())
        }
        found => Err(StoreError::UnsupportedSchema {
            found,
            supported: SCHEMA_VERSION,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_connection_is_stamped() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(version(&conn).unwrap(), 0);

        ensure(&mut conn).unwrap();
        assert_eq!(version(&conn).unwrap(), SCHEMA_VERSION);

        ensure(&mut conn).unwrap();
        assert_eq!(version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn newer_layout_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1).unwrap();

        let err = ensure(&mut conn).unwrap_err();
        assert!(matches!(
            err,
            StoreError::UnsupportedSchema { found, supported: SCHEMA_VERSION } if found == SCHEMA_VERSION + 1
        ));
    }

    #[test]
    fn tasks_table_rejects_unknown_status() {
        let mut conn = Connection::open_in_memory().unwrap();
        ensure(&mut conn).unwrap();

        conn.execute(
            "INSERT INTO tasks (id, description, status, created_at, metadata) \
             VALUES ('ok', 'fine', 'pending', 0, '{}')",
            [],
        )
        .unwrap();

        let bad_status = conn.execute(
            "INSERT INTO tasks (id, description, status, created_at, metadata) \
             VALUES ('bad', 'nope', 'cancelled', 0, '{}')",
            [],
        );
        assert!(bad_status.is_err());
    }
}
