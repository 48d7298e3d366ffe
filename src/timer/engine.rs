//! Timer state machine
//!
//! ```text
//! Idle -> Running <-> Paused -> Stopped -> Running (fresh timer)
//! ```
//!
//! The engine never sleeps or spawns anything. Elapsed and remaining time are
//! computed on demand from the injected clock; countdown completion is
//! detected by [`super::watcher::CompletionWatcher`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    clock::{add_duration, duration_between, SharedClock},
    error::TimerError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Idle,
    Running,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// Completes automatically once `target` of running time has accrued
    Countdown { target: Duration },
    /// Open-ended
    Stopwatch,
}

impl TimerMode {
    pub fn target(&self) -> Option<Duration> {
        match self {
            TimerMode::Countdown { target } => Some(*target),
            TimerMode::Stopwatch => None,
        }
    }

    pub fn is_countdown(&self) -> bool {
        matches!(self, TimerMode::Countdown { .. })
    }
}

/// A single pausable timer
#[derive(Debug, Clone)]
pub struct TimerEngine {
    clock: SharedClock,
    status: TimerStatus,
    mode: TimerMode,
    /// Running time folded in from closed segments
    accumulated: Duration,
    /// Start of the open segment, only set while running
    segment_start: Option<DateTime<Utc>>,
    /// Countdown deadline, only set in countdown mode
    target_instant: Option<DateTime<Utc>>,
    /// Bumped each time a running segment opens
    generation: u64,
}

impl TimerEngine {
    /// Create an idle engine
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            status: TimerStatus::Idle,
            mode: TimerMode::Stopwatch,
            accumulated: Duration::ZERO,
            segment_start: None,
            target_instant: None,
            generation: 0,
        }
    }

    /// Rebuild an engine from persisted parts. Used by the reconciler.
    pub(crate) fn restored(
        clock: SharedClock,
        mode: TimerMode,
        accumulated: Duration,
        running: bool,
    ) -> Self {
        let now = clock.now();
        let remaining = mode
            .target()
            .map(|target| target.saturating_sub(accumulated));
        Self {
            status: if running {
                TimerStatus::Running
            } else {
                TimerStatus::Paused
            },
            mode,
            accumulated,
            segment_start: running.then_some(now),
            target_instant: remaining.map(|left| add_duration(now, left)),
            generation: 1,
            clock,
        }
    }

    pub fn status(&self) -> TimerStatus {
        self.status
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn target_instant(&self) -> Option<DateTime<Utc>> {
        self.target_instant
    }

    pub fn segment_start(&self) -> Option<DateTime<Utc>> {
        self.segment_start
    }

    /// Elapsed time from closed segments only
    pub fn accumulated(&self) -> Duration {
        self.accumulated
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Running or paused
    pub fn is_active(&self) -> bool {
        matches!(self.status, TimerStatus::Running | TimerStatus::Paused)
    }

    /// Begin a fresh timer. `Some(target)` makes it a countdown.
    pub fn start(&mut self, target: Option<Duration>) -> Result<(), TimerError> {
        if self.is_active() {
            return Err(TimerError::AlreadyRunning);
        }

        let now = self.clock.now();
        self.status = TimerStatus::Running;
        self.accumulated = Duration::ZERO;
        self.segment_start = Some(now);
        self.generation += 1;
        match target {
            Some(target) => {
                self.mode = TimerMode::Countdown { target };
                self.target_instant = Some(add_duration(now, target));
            }
            None => {
                self.mode = TimerMode::Stopwatch;
                self.target_instant = None;
            }
        }
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), TimerError> {
        if self.status != TimerStatus::Running {
            return Err(TimerError::NotRunning);
        }
        self.fold_segment();
        self.status = TimerStatus::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), TimerError> {
        if self.status != TimerStatus::Paused {
            return Err(TimerError::NotPaused);
        }

        let now = self.clock.now();
        self.segment_start = Some(now);
        self.status = TimerStatus::Running;
        self.generation += 1;
        if let Some(target) = self.mode.target() {
            self.target_instant = Some(add_duration(now, target.saturating_sub(self.accumulated)));
        }
        Ok(())
    }

    /// Stop the timer and return the final elapsed time.
    ///
    /// Never fails: an idle engine reports zero and a stopped engine reports
    /// its frozen elapsed time without changing it.
    pub fn stop(&mut self) -> Duration {
        match self.status {
            TimerStatus::Running => {
                self.fold_segment();
                self.status = TimerStatus::Stopped;
            }
            TimerStatus::Paused => self.status = TimerStatus::Stopped,
            TimerStatus::Idle | TimerStatus::Stopped => {}
        }
        self.accumulated
    }

    pub fn elapsed(&self) -> Duration {
        match (self.status, self.segment_start) {
            (TimerStatus::Running, Some(start)) => {
                self.accumulated + duration_between(start, self.clock.now())
            }
            _ => self.accumulated,
        }
    }

    /// Time left on a countdown; zero for stopwatches and inactive timers
    pub fn remaining(&self) -> Duration {
        let Some(target) = self.mode.target() else {
            return Duration::ZERO;
        };
        match self.status {
            TimerStatus::Running => self
                .target_instant
                .map(|deadline| duration_between(self.clock.now(), deadline))
                .unwrap_or(Duration::ZERO),
            TimerStatus::Paused => target.saturating_sub(self.accumulated),
            TimerStatus::Idle | TimerStatus::Stopped => Duration::ZERO,
        }
    }

    /// Whether a running countdown has reached its deadline
    pub fn deadline_reached(&self) -> bool {
        self.status == TimerStatus::Running
            && self
                .target_instant
                .is_some_and(|deadline| self.clock.now() >= deadline)
    }

    /// Fraction of the countdown consumed, `0.0..=1.0`
    pub fn progress(&self) -> Option<f64> {
        let target = self.mode.target()?;
        if target.is_zero() {
            return Some(1.0);
        }
        let consumed = match self.status {
            TimerStatus::Running | TimerStatus::Paused => target.saturating_sub(self.remaining()),
            TimerStatus::Idle => Duration::ZERO,
            TimerStatus::Stopped => self.accumulated.min(target),
        };
        Some((consumed.as_secs_f64() / target.as_secs_f64()).clamp(0.0, 1.0))
    }

    /// The value a display shows: remaining time for an active countdown,
    /// elapsed time otherwise
    pub fn display_time(&self) -> String {
        if self.mode.is_countdown() && self.is_active() {
            format_hms(self.remaining())
        } else {
            format_hms(self.elapsed())
        }
    }

    fn fold_segment(&mut self) {
        if let Some(start) = self.segment_start.take() {
            self.accumulated += duration_between(start, self.clock.now());
        }
    }
}

/// Format as `HH:MM:SS`, dropping fractional seconds
pub fn format_hms(duration: Duration) -> String {
    let total = duration.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}
