//! SQLite-backed session and timer-state storage.
//!
//! Two tables:
//! - `focus_sessions`: one row per focus session
//! - `timer_state`: at most one row, the active timer snapshot

use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{minutes_between, Session, SessionStore, StateStore};
use crate::{
    clock::SharedClock,
    error::StoreError,
    timer::{Snapshot, SnapshotMode},
};

/// SQLite database holding sessions and the live-timer snapshot
pub struct SqliteStore {
    clock: SharedClock,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent directories
    /// and the schema as needed.
    pub fn open(path: impl AsRef<Path>, clock: SharedClock) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?, clock)
    }

    pub fn open_in_memory(clock: SharedClock) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, clock)
    }

    fn from_connection(conn: Connection, clock: SharedClock) -> Result<Self, StoreError> {
        migrate(&conn)?;
        Ok(Self {
            clock,
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS focus_sessions (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            activity_type    TEXT NOT NULL,
            start_time       TEXT NOT NULL,
            end_time         TEXT,
            duration_minutes REAL,
            completed        BOOLEAN NOT NULL DEFAULT FALSE
        );

        CREATE TABLE IF NOT EXISTS timer_state (
            id                      INTEGER PRIMARY KEY,
            mode                    TEXT NOT NULL,
            activity_type           TEXT NOT NULL,
            start_time              TEXT,
            elapsed_time_seconds    REAL NOT NULL,
            target_duration_minutes REAL,
            paused                  BOOLEAN NOT NULL DEFAULT FALSE,
            session_id              INTEGER,
            saved_at                TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_focus_sessions_start_time ON focus_sessions(start_time);",
    )
}

fn parse_time(raw: &str, column: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

struct SnapshotRow {
    mode: String,
    activity_type: String,
    start_time: Option<String>,
    elapsed_time_seconds: f64,
    target_duration_minutes: Option<f64>,
    paused: bool,
    session_id: Option<i64>,
    saved_at: String,
}

impl SnapshotRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            mode: row.get(0)?,
            activity_type: row.get(1)?,
            start_time: row.get(2)?,
            elapsed_time_seconds: row.get(3)?,
            target_duration_minutes: row.get(4)?,
            paused: row.get(5)?,
            session_id: row.get(6)?,
            saved_at: row.get(7)?,
        })
    }

    fn into_snapshot(self) -> Result<Snapshot, StoreError> {
        Ok(Snapshot {
            mode: self.mode.parse::<SnapshotMode>()?,
            activity_type: self.activity_type,
            start_time: self
                .start_time
                .as_deref()
                .map(|raw| parse_time(raw, "start_time"))
                .transpose()?,
            elapsed_time_seconds: self.elapsed_time_seconds,
            target_duration_minutes: self.target_duration_minutes,
            paused: self.paused,
            session_id: self.session_id,
            saved_at: parse_time(&self.saved_at, "saved_at")?,
        })
    }
}

impl StateStore for SqliteStore {
    fn get(&self) -> Result<Option<Snapshot>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT mode, activity_type, start_time, elapsed_time_seconds,
                        target_duration_minutes, paused, session_id, saved_at
                 FROM timer_state LIMIT 1",
                [],
                SnapshotRow::from_row,
            )
            .optional()
            .map_err(|e| match e {
                rusqlite::Error::FromSqlConversionFailure(..)
                | rusqlite::Error::InvalidColumnType(..) => StoreError::Corrupt(e.to_string()),
                other => StoreError::Sqlite(other),
            })?;

        row.map(SnapshotRow::into_snapshot).transpose()
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM timer_state", [])?;
        tx.execute(
            "INSERT INTO timer_state
             (id, mode, activity_type, start_time, elapsed_time_seconds,
              target_duration_minutes, paused, session_id, saved_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                snapshot.mode.as_str(),
                snapshot.activity_type,
                snapshot.start_time.map(|t| t.to_rfc3339()),
                snapshot.elapsed_time_seconds,
                snapshot.target_duration_minutes,
                snapshot.paused,
                snapshot.session_id,
                snapshot.saved_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.conn()?.execute("DELETE FROM timer_state", [])?;
        Ok(())
    }
}

impl SessionStore for SqliteStore {
    fn start_session(&self, activity_type: &str) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO focus_sessions (activity_type, start_time) VALUES (?1, ?2)",
            params![activity_type, self.clock.now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn end_session(&self, session_id: i64, completed: bool) -> Result<(), StoreError> {
        let end_time = self.clock.now();
        let conn = self.conn()?;
        let start_raw: String = conn
            .query_row(
                "SELECT start_time FROM focus_sessions WHERE id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::UnknownSession(session_id))?;
        let start_time = parse_time(&start_raw, "start_time")?;

        conn.execute(
            "UPDATE focus_sessions SET end_time = ?1, duration_minutes = ?2, completed = ?3
             WHERE id = ?4",
            params![
                end_time.to_rfc3339(),
                minutes_between(start_time, end_time),
                completed,
                session_id,
            ],
        )?;
        Ok(())
    }

    fn session(&self, session_id: i64) -> Result<Option<Session>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, activity_type, start_time, end_time, duration_minutes, completed
                 FROM focus_sessions WHERE id = ?1",
                params![session_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<f64>>(4)?,
                        row.get::<_, bool>(5)?,
                    ))
                },
            )
            .optional()?;

        row.map(
            |(id, activity_type, start_time, end_time, duration_minutes, completed)| {
                Ok(Session {
                    id,
                    activity_type,
                    start_time: parse_time(&start_time, "start_time")?,
                    end_time: end_time
                        .as_deref()
                        .map(|raw| parse_time(raw, "end_time"))
                        .transpose()?,
                    duration_minutes,
                    completed,
                })
            },
        )
        .transpose()
    }
}
