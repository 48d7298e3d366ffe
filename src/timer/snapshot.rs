//! Persisted form of the single active timer

use std::{fmt, str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;

/// Timer kind as stored on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotMode {
    Timer,
    Stopwatch,
}

impl SnapshotMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotMode::Timer => "timer",
            SnapshotMode::Stopwatch => "stopwatch",
        }
    }
}

impl fmt::Display for SnapshotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotMode {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timer" => Ok(SnapshotMode::Timer),
            "stopwatch" => Ok(SnapshotMode::Stopwatch),
            other => Err(SnapshotError::Corrupt(format!("unknown mode {other:?}"))),
        }
    }
}

/// The record a [`crate::store::StateStore`] keeps while a timer is active.
///
/// `start_time` is the start of the open running segment and
/// `elapsed_time_seconds` excludes that segment, so the time that passes
/// while the process is down is recovered as `now - start_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub mode: SnapshotMode,
    pub activity_type: String,
    pub start_time: Option<DateTime<Utc>>,
    pub elapsed_time_seconds: f64,
    pub target_duration_minutes: Option<f64>,
    pub paused: bool,
    pub session_id: Option<i64>,
    pub saved_at: DateTime<Utc>,
}

impl Snapshot {
    /// Reject snapshots that cannot describe a reachable timer
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if !self.elapsed_time_seconds.is_finite() || self.elapsed_time_seconds < 0.0 {
            return Err(SnapshotError::Corrupt(format!(
                "elapsed_time_seconds out of range: {}",
                self.elapsed_time_seconds
            )));
        }

        match (self.mode, self.target_duration_minutes) {
            (SnapshotMode::Timer, Some(minutes)) if minutes.is_finite() && minutes > 0.0 => {}
            (SnapshotMode::Timer, Some(minutes)) => {
                return Err(SnapshotError::Corrupt(format!(
                    "target_duration_minutes out of range: {minutes}"
                )));
            }
            (SnapshotMode::Timer, None) => {
                return Err(SnapshotError::Corrupt(
                    "timer snapshot without a target duration".to_string(),
                ));
            }
            (SnapshotMode::Stopwatch, Some(_)) => {
                return Err(SnapshotError::Corrupt(
                    "stopwatch snapshot with a target duration".to_string(),
                ));
            }
            (SnapshotMode::Stopwatch, None) => {}
        }

        if !self.paused && self.start_time.is_none() {
            return Err(SnapshotError::Corrupt(
                "running snapshot without a start_time".to_string(),
            ));
        }

        Ok(())
    }

    pub fn elapsed(&self) -> Duration {
        Duration::try_from_secs_f64(self.elapsed_time_seconds).unwrap_or(Duration::ZERO)
    }

    pub fn target_duration(&self) -> Option<Duration> {
        self.target_duration_minutes
            .and_then(|minutes| Duration::try_from_secs_f64(minutes * 60.0).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_timer() -> Snapshot {
        let now = Utc::now();
        Snapshot {
            mode: SnapshotMode::Timer,
            activity_type: "Work".to_string(),
            start_time: Some(now),
            elapsed_time_seconds: 12.5,
            target_duration_minutes: Some(25.0),
            paused: false,
            session_id: Some(1),
            saved_at: now,
        }
    }

    #[test]
    fn valid_snapshot_passes() {
        assert!(running_timer().validate().is_ok());
        assert_eq!(running_timer().target_duration(), Some(Duration::from_secs(1500)));
        assert_eq!(running_timer().elapsed(), Duration::from_millis(12_500));
    }

    #[test]
    fn negative_elapsed_is_corrupt() {
        let mut snapshot = running_timer();
        snapshot.elapsed_time_seconds = -1.0;
        assert!(snapshot.validate().is_err());
        snapshot.elapsed_time_seconds = f64::NAN;
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn mode_and_target_must_agree() {
        let mut snapshot = running_timer();
        snapshot.target_duration_minutes = None;
        assert!(snapshot.validate().is_err());

        snapshot.mode = SnapshotMode::Stopwatch;
        assert!(snapshot.validate().is_ok());

        snapshot.target_duration_minutes = Some(5.0);
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn running_snapshot_needs_start_time() {
        let mut snapshot = running_timer();
        snapshot.start_time = None;
        assert!(snapshot.validate().is_err());
        snapshot.paused = true;
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn serializes_with_lowercase_mode() {
        let json = serde_json::to_value(running_timer()).unwrap();
        assert_eq!(json["mode"], "timer");
        assert_eq!("stopwatch".parse::<SnapshotMode>(), Ok(SnapshotMode::Stopwatch));
        assert!("pomodoro".parse::<SnapshotMode>().is_err());
    }
}
