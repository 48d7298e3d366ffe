//! Error types

use thiserror::Error;

/// Misuse of the timer state machine
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    #[error("timer is already running")]
    AlreadyRunning,
    #[error("timer is not running")]
    NotRunning,
    #[error("timer is not paused")]
    NotPaused,
}

/// A persisted snapshot that cannot be turned back into a timer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("corrupt timer snapshot: {0}")]
    Corrupt(String),
}

/// Persistence failures from a state or session store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt timer snapshot: {0}")]
    Corrupt(String),

    #[error("unknown session {0}")]
    UnknownSession(i64),

    #[error("store lock poisoned")]
    Poisoned,
}

impl From<SnapshotError> for StoreError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::Corrupt(msg) => StoreError::Corrupt(msg),
        }
    }
}

/// Completion notification failures. Never fatal.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("failed to run notification command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("notification failed: {0}")]
    Failed(String),
}

/// Errors returned by the timer controller
#[derive(Error, Debug)]
pub enum FocusError {
    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error("a timer session is already active; stop it first")]
    ActiveTimerExists,

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to lock {0}")]
    Poisoned(&'static str),
}
