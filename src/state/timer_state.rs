//! Serializable view of the live timer

use serde::{Deserialize, Serialize};

use crate::timer::{SnapshotMode, TimerEngine, TimerStatus};

/// What clients see when they ask for the timer's state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerView {
    pub status: TimerStatus,
    pub mode: SnapshotMode,
    pub activity_type: Option<String>,
    pub session_id: Option<i64>,
    pub elapsed_seconds: f64,
    /// Countdown only
    pub remaining_seconds: Option<f64>,
    pub target_duration_minutes: Option<f64>,
    /// `HH:MM:SS`: remaining for an active countdown, elapsed otherwise
    pub display: String,
    pub progress: Option<f64>,
}

impl TimerView {
    pub fn new(engine: &TimerEngine, activity_type: Option<String>, session_id: Option<i64>) -> Self {
        let target = engine.mode().target();
        Self {
            status: engine.status(),
            mode: if target.is_some() {
                SnapshotMode::Timer
            } else {
                SnapshotMode::Stopwatch
            },
            activity_type,
            session_id,
            elapsed_seconds: engine.elapsed().as_secs_f64(),
            remaining_seconds: target.map(|_| engine.remaining().as_secs_f64()),
            target_duration_minutes: target.map(|t| t.as_secs_f64() / 60.0),
            display: engine.display_time(),
            progress: engine.progress(),
        }
    }
}
