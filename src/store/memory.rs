//! In-process store

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use super::{minutes_between, Session, SessionStore, StateStore};
use crate::{clock::SharedClock, error::StoreError, timer::Snapshot};

#[derive(Debug, Default)]
struct Inner {
    snapshot: Option<Snapshot>,
    sessions: BTreeMap<i64, Session>,
    next_id: i64,
}

/// State and session store kept entirely in memory
#[derive(Debug)]
pub struct MemoryStore {
    clock: SharedClock,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// All sessions in id order
    pub fn sessions(&self) -> Result<Vec<Session>, StoreError> {
        Ok(self.lock()?.sessions.values().cloned().collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl StateStore for MemoryStore {
    fn get(&self) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.lock()?.snapshot.clone())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.lock()?.snapshot = Some(snapshot.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.lock()?.snapshot = None;
        Ok(())
    }
}

impl SessionStore for MemoryStore {
    fn start_session(&self, activity_type: &str) -> Result<i64, StoreError> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.sessions.insert(
            id,
            Session {
                id,
                activity_type: activity_type.to_string(),
                start_time: self.clock.now(),
                end_time: None,
                duration_minutes: None,
                completed: false,
            },
        );
        Ok(id)
    }

    fn end_session(&self, session_id: i64, completed: bool) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut inner = self.lock()?;
        let session = inner
            .sessions
            .get_mut(&session_id)
            .ok_or(StoreError::UnknownSession(session_id))?;
        session.end_time = Some(now);
        session.duration_minutes = Some(minutes_between(session.start_time, now));
        session.completed = completed;
        Ok(())
    }

    fn session(&self, session_id: i64) -> Result<Option<Session>, StoreError> {
        Ok(self.lock()?.sessions.get(&session_id).cloned())
    }
}
