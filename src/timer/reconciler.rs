//! Conversion between a live [`TimerEngine`] and its persisted [`Snapshot`]
//!
//! Restoring treats time that passed while the process was down exactly like
//! time that passed while it was running: the gap since the open segment
//! started is folded into the elapsed total, so a countdown that ran out
//! during a restart comes back already expired.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{
    engine::{TimerEngine, TimerMode, TimerStatus},
    snapshot::{Snapshot, SnapshotMode},
};
use crate::{
    clock::{duration_between, SharedClock},
    error::SnapshotError,
};

/// A timer rebuilt from a snapshot, with the metadata stored alongside it
#[derive(Debug)]
pub struct Restored {
    pub engine: TimerEngine,
    pub activity_type: String,
    pub session_id: Option<i64>,
    /// The countdown ran out while nothing was watching
    pub expired: bool,
}

/// Project an active engine into its persisted form.
///
/// Returns `None` for idle and stopped engines, which have nothing to persist.
pub fn to_snapshot(
    engine: &TimerEngine,
    session_id: Option<i64>,
    activity_type: &str,
    saved_at: DateTime<Utc>,
) -> Option<Snapshot> {
    let paused = match engine.status() {
        TimerStatus::Running => false,
        TimerStatus::Paused => true,
        TimerStatus::Idle | TimerStatus::Stopped => return None,
    };
    let target = engine.mode().target();

    Some(Snapshot {
        mode: if target.is_some() {
            SnapshotMode::Timer
        } else {
            SnapshotMode::Stopwatch
        },
        activity_type: activity_type.to_string(),
        start_time: if paused { None } else { engine.segment_start() },
        elapsed_time_seconds: engine.accumulated().as_secs_f64(),
        target_duration_minutes: target.map(|t| t.as_secs_f64() / 60.0),
        paused,
        session_id,
        saved_at,
    })
}

/// Rebuild a live engine from a snapshot at the clock's current instant
pub fn from_snapshot(snapshot: &Snapshot, clock: SharedClock) -> Result<Restored, SnapshotError> {
    snapshot.validate()?;

    let now = clock.now();
    let mut accumulated = snapshot.elapsed();
    if !snapshot.paused {
        // validate() guarantees a start_time on running snapshots
        if let Some(start) = snapshot.start_time {
            accumulated += duration_between(start, now);
        }
    }

    let mode = match snapshot.target_duration() {
        Some(target) => TimerMode::Countdown { target },
        None => TimerMode::Stopwatch,
    };
    let expired = !snapshot.paused
        && mode
            .target()
            .is_some_and(|target| target.saturating_sub(accumulated) == Duration::ZERO);

    let engine = TimerEngine::restored(clock, mode, accumulated, !snapshot.paused);

    Ok(Restored {
        engine,
        activity_type: snapshot.activity_type.clone(),
        session_id: snapshot.session_id,
        expired,
    })
}
