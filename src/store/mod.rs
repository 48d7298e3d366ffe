//! Persistence boundaries
//!
//! The timer core only ever talks to these traits. `MemoryStore` backs tests
//! and `--in-memory` runs; `SqliteStore` is the on-disk default.

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::StoreError, timer::Snapshot};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// One recorded focus session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub activity_type: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<f64>,
    pub completed: bool,
}

impl Session {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Holds the single live-timer snapshot
pub trait StateStore: Send + Sync {
    fn get(&self) -> Result<Option<Snapshot>, StoreError>;

    /// Replace any existing snapshot
    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    fn clear(&self) -> Result<(), StoreError>;
}

/// Records focus sessions
pub trait SessionStore: Send + Sync {
    fn start_session(&self, activity_type: &str) -> Result<i64, StoreError>;

    /// Close a session; the store derives its duration from its own timestamps
    fn end_session(&self, session_id: i64, completed: bool) -> Result<(), StoreError>;

    fn session(&self, session_id: i64) -> Result<Option<Session>, StoreError>;
}

/// Minutes between two instants, as stored in `duration_minutes`
pub(crate) fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    crate::clock::duration_between(start, end).as_secs_f64() / 60.0
}
