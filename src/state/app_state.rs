//! Main application state management
//!
//! `AppState` owns the single live timer. Every transition goes through it so
//! the snapshot in the state store, the open session and the completion
//! watcher stay in step with the engine.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, time::timeout};
use tracing::{debug, error, info, warn};

use super::TimerView;
use crate::{
    clock::SharedClock,
    error::{FocusError, StoreError, TimerError},
    services::{Notification, NotificationSink, DEFAULT_NOTIFY_TIMEOUT},
    store::{SessionStore, StateStore},
    timer::{
        reconciler::{from_snapshot, to_snapshot, Restored},
        watcher::{DEFAULT_CANCEL_TIMEOUT, DEFAULT_POLL_INTERVAL},
        Completion, CompletionWatcher, Snapshot, TimerEngine, TimerStatus,
    },
};

/// The external collaborators the timer core reports to
#[derive(Clone)]
pub struct Collaborators {
    pub state_store: Arc<dyn StateStore>,
    pub session_store: Arc<dyn SessionStore>,
    pub notifier: Arc<dyn NotificationSink>,
}

/// Tunables for the controller and server metadata
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub poll_interval: Duration,
    pub cancel_timeout: Duration,
    pub notify_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 20554,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel_timeout: DEFAULT_CANCEL_TIMEOUT,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }
}

/// Metadata persisted alongside the engine
#[derive(Debug, Clone)]
struct ActiveSession {
    session_id: Option<i64>,
    activity_type: String,
}

/// Result of rebuilding the timer at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreOutcome {
    /// Nothing was persisted
    Idle,
    /// The persisted snapshot was unreadable and has been dropped
    Discarded,
    Running,
    Paused,
    /// The countdown ran out while the process was down and was completed
    Completed,
}

/// Main application state that owns the timer and its collaborators
pub struct AppState {
    clock: SharedClock,
    engine: Arc<Mutex<TimerEngine>>,
    /// Only locked after `engine`, never before
    active: Mutex<Option<ActiveSession>>,
    /// Held for the whole of every operation, so transitions, snapshot
    /// saves and watcher cancel/spawn apply one operation at a time
    watcher: tokio::sync::Mutex<Option<CompletionWatcher>>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    collaborators: Collaborators,
    settings: Settings,
    /// Server metadata
    pub start_time: Instant,
    /// Last action tracking
    last_action: Mutex<Option<String>>,
    last_action_time: Mutex<Option<DateTime<Utc>>>,
    /// Non-fatal failures surfaced through the status endpoint
    errors: Arc<Mutex<Vec<String>>>,
}

impl AppState {
    /// Create the state with an idle timer. Completion events arrive on the
    /// returned receiver and must be fed back through
    /// [`AppState::handle_completion`] (see [`crate::tasks::completion_task`]).
    pub fn new(
        clock: SharedClock,
        collaborators: Collaborators,
        settings: Settings,
    ) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let state = Self {
            engine: Arc::new(Mutex::new(TimerEngine::new(clock.clone()))),
            clock,
            active: Mutex::new(None),
            watcher: tokio::sync::Mutex::new(None),
            completion_tx,
            collaborators,
            settings,
            start_time: Instant::now(),
            last_action: Mutex::new(None),
            last_action_time: Mutex::new(None),
            errors: Arc::new(Mutex::new(Vec::new())),
        };
        (state, completion_rx)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Start a new timer. `Some(duration)` starts a countdown.
    pub async fn start(
        &self,
        activity_type: &str,
        duration: Option<Duration>,
    ) -> Result<TimerView, FocusError> {
        let mut watcher = self.watcher.lock().await;
        if self.lock_engine()?.is_active() {
            return Err(TimerError::AlreadyRunning.into());
        }

        match self.collaborators.state_store.get() {
            Ok(Some(existing)) => {
                warn!(
                    "Refusing to start: a {} timer for {:?} is still persisted",
                    existing.mode, existing.activity_type
                );
                return Err(FocusError::ActiveTimerExists);
            }
            Ok(None) => {}
            Err(StoreError::Corrupt(msg)) => {
                warn!("Discarding corrupt timer snapshot before start: {}", msg);
                self.clear_snapshot();
            }
            Err(e) => return Err(e.into()),
        }

        let session_id = self.collaborators.session_store.start_session(activity_type)?;
        let snapshot = match self.begin(session_id, activity_type, duration) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Abandoning session {}: {}", session_id, e);
                if let Err(end) = self.collaborators.session_store.end_session(session_id, false) {
                    error!("Failed to end session {}: {}", session_id, end);
                }
                return Err(e);
            }
        };

        self.clear_errors();
        self.persist(snapshot);
        self.respawn_watcher(&mut watcher).await;
        self.record_action("start");
        self.view()
    }

    pub async fn pause(&self) -> Result<TimerView, FocusError> {
        let mut watcher = self.watcher.lock().await;
        let snapshot = {
            let mut engine = self.lock_engine()?;
            engine.pause()?;
            info!("Timer paused at {}", engine.display_time());
            self.snapshot_of(&engine)?
        };

        self.cancel_watcher(&mut watcher).await;
        self.persist(snapshot);
        self.record_action("pause");
        self.view()
    }

    pub async fn resume(&self) -> Result<TimerView, FocusError> {
        let mut watcher = self.watcher.lock().await;
        let snapshot = {
            let mut engine = self.lock_engine()?;
            engine.resume()?;
            info!("Timer resumed at {}", engine.display_time());
            self.snapshot_of(&engine)?
        };

        self.persist(snapshot);
        self.respawn_watcher(&mut watcher).await;
        self.record_action("resume");
        self.view()
    }

    /// Stop the timer and return its final elapsed time.
    ///
    /// The session is closed and the snapshot cleared only by the call that
    /// actually moves the timer out of running/paused; repeated stops, or a
    /// stop racing a completion, just report the frozen elapsed time.
    pub async fn stop(&self) -> Result<Duration, FocusError> {
        let mut watcher = self.watcher.lock().await;
        self.cancel_watcher(&mut watcher).await;

        let (elapsed, closed) = {
            let mut engine = self.lock_engine()?;
            let was_active = engine.is_active();
            let countdown = engine.mode().is_countdown();
            let elapsed = engine.stop();
            let closed = if was_active {
                self.lock_active()?.take().map(|active| (active, countdown))
            } else {
                None
            };
            (elapsed, closed)
        };

        if let Some((active, countdown)) = closed {
            info!(
                "Timer stopped after {:?} ({:?})",
                elapsed, active.activity_type
            );
            // A countdown stopped by hand did not reach its target
            self.finish_session(&active, !countdown);
            self.record_action("stop");
        } else {
            debug!("Stop requested with no active timer");
        }

        Ok(elapsed)
    }

    /// Close out a countdown the watcher has just completed: end the
    /// session, clear the snapshot, then notify in the background.
    pub async fn handle_completion(&self, completion: Completion) {
        let mut watcher = self.watcher.lock().await;
        if watcher
            .as_ref()
            .is_some_and(|w| w.generation() == completion.generation)
        {
            // That task sent this event and has exited
            *watcher = None;
        }

        if let Some(notification) = self.close_completed(&completion) {
            self.dispatch_notification(notification);
        }
    }

    /// Rebuild the live timer from the state store. Call once at startup.
    pub async fn restore(&self) -> Result<RestoreOutcome, FocusError> {
        let mut watcher = self.watcher.lock().await;
        let snapshot = match self.collaborators.state_store.get() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                info!("No persisted timer to restore");
                return Ok(RestoreOutcome::Idle);
            }
            Err(StoreError::Corrupt(msg)) => {
                warn!("Persisted timer is corrupt, starting idle: {}", msg);
                self.clear_snapshot();
                return Ok(RestoreOutcome::Discarded);
            }
            Err(e) => return Err(e.into()),
        };

        let Restored {
            engine: restored,
            activity_type,
            session_id,
            expired,
        } = match from_snapshot(&snapshot, self.clock.clone()) {
            Ok(restored) => restored,
            Err(e) => {
                warn!("Persisted timer is unusable, starting idle: {}", e);
                self.clear_snapshot();
                return Ok(RestoreOutcome::Discarded);
            }
        };

        self.cancel_watcher(&mut watcher).await;
        let (outcome, completion, snapshot) = {
            let mut engine = self.lock_engine()?;
            if engine.is_active() {
                return Err(TimerError::AlreadyRunning.into());
            }
            *engine = restored;
            *self.lock_active()? = Some(ActiveSession {
                session_id,
                activity_type: activity_type.clone(),
            });

            if expired {
                let elapsed = engine.stop();
                let completion = Completion {
                    generation: engine.generation(),
                    elapsed,
                    completed_at: self.clock.now(),
                };
                (RestoreOutcome::Completed, Some(completion), None)
            } else {
                let outcome = match engine.status() {
                    TimerStatus::Paused => RestoreOutcome::Paused,
                    _ => RestoreOutcome::Running,
                };
                let snapshot = to_snapshot(&engine, session_id, &activity_type, self.clock.now());
                (outcome, None, snapshot)
            }
        };

        if let Some(completion) = completion {
            info!("Persisted countdown for {:?} expired while offline", activity_type);
            if let Some(notification) = self.close_completed(&completion) {
                self.dispatch_notification(notification);
            }
        } else {
            info!("Restored {:?} timer for {:?}", outcome, activity_type);
            self.persist(snapshot);
            self.respawn_watcher(&mut watcher).await;
        }
        self.record_action("restore");

        Ok(outcome)
    }

    /// Current timer view
    pub fn view(&self) -> Result<TimerView, FocusError> {
        let engine = self.lock_engine()?;
        let active = self.lock_active()?.clone();
        Ok(TimerView::new(
            &engine,
            active.as_ref().map(|a| a.activity_type.clone()),
            active.and_then(|a| a.session_id),
        ))
    }

    /// Whether a completion watcher task is currently alive
    pub async fn watcher_running(&self) -> bool {
        self.watcher
            .lock()
            .await
            .as_ref()
            .is_some_and(|watcher| !watcher.is_finished())
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        let duration = self.start_time.elapsed();
        let hours = duration.as_secs() / 3600;
        let minutes = (duration.as_secs() % 3600) / 60;
        let seconds = duration.as_secs() % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Get last action information
    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        let last_action = self.last_action.lock().ok().and_then(|a| a.clone());
        let last_action_time = self.last_action_time.lock().ok().and_then(|t| *t);
        (last_action, last_action_time)
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn add_error(&self, error: String) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(error);
        }
    }

    fn clear_errors(&self) {
        if let Ok(mut errors) = self.errors.lock() {
            if !errors.is_empty() {
                debug!("Cleared {} errors", errors.len());
                errors.clear();
            }
        }
    }

    fn record_action(&self, action: &str) {
        if let Ok(mut last_action) = self.last_action.lock() {
            *last_action = Some(action.to_string());
        }
        if let Ok(mut last_time) = self.last_action_time.lock() {
            *last_time = Some(self.clock.now());
        }
    }

    fn lock_engine(&self) -> Result<MutexGuard<'_, TimerEngine>, FocusError> {
        self.engine.lock().map_err(|e| {
            error!("Failed to lock timer engine: {}", e);
            FocusError::Poisoned("timer engine")
        })
    }

    fn lock_active(&self) -> Result<MutexGuard<'_, Option<ActiveSession>>, FocusError> {
        self.active.lock().map_err(|e| {
            error!("Failed to lock active session: {}", e);
            FocusError::Poisoned("active session")
        })
    }

    fn snapshot_of(&self, engine: &TimerEngine) -> Result<Option<Snapshot>, FocusError> {
        let active = self.lock_active()?;
        let (session_id, activity_type) = match active.as_ref() {
            Some(active) => (active.session_id, active.activity_type.as_str()),
            None => (None, ""),
        };
        Ok(to_snapshot(engine, session_id, activity_type, self.clock.now()))
    }

    fn persist(&self, snapshot: Option<Snapshot>) {
        let Some(snapshot) = snapshot else {
            return;
        };
        if let Err(e) = self.collaborators.state_store.save(&snapshot) {
            error!("Failed to save timer snapshot: {}", e);
            self.add_error(format!("Failed to save timer snapshot: {}", e));
        }
    }

    fn clear_snapshot(&self) {
        if let Err(e) = self.collaborators.state_store.clear() {
            error!("Failed to clear timer snapshot: {}", e);
            self.add_error(format!("Failed to clear timer snapshot: {}", e));
        }
    }

    fn finish_session(&self, active: &ActiveSession, completed: bool) {
        if let Some(session_id) = active.session_id {
            if let Err(e) = self
                .collaborators
                .session_store
                .end_session(session_id, completed)
            {
                error!("Failed to end session {}: {}", session_id, e);
                self.add_error(format!("Failed to end session {}: {}", session_id, e));
            }
        }
        self.clear_snapshot();
    }

    /// Start the engine for a freshly opened session
    fn begin(
        &self,
        session_id: i64,
        activity_type: &str,
        duration: Option<Duration>,
    ) -> Result<Option<Snapshot>, FocusError> {
        let mut engine = self.lock_engine()?;
        engine.start(duration)?;
        *self.lock_active()? = Some(ActiveSession {
            session_id: Some(session_id),
            activity_type: activity_type.to_string(),
        });
        info!(
            "Started {} for {:?} (session {})",
            match duration {
                Some(d) => format!("{}s countdown", d.as_secs()),
                None => "stopwatch".to_string(),
            },
            activity_type,
            session_id
        );
        Ok(to_snapshot(&engine, Some(session_id), activity_type, self.clock.now()))
    }

    /// End the session of a completed countdown and clear its snapshot.
    /// Returns the notification to send, or `None` if the completion is
    /// stale or was already handled.
    fn close_completed(&self, completion: &Completion) -> Option<Notification> {
        let active = {
            let engine = self.lock_engine().ok()?;
            if engine.generation() != completion.generation
                || engine.status() != TimerStatus::Stopped
            {
                debug!(
                    "Ignoring completion for segment {}: timer has moved on",
                    completion.generation
                );
                return None;
            }
            self.lock_active().ok()?.take()
        };

        let Some(active) = active else {
            debug!("Completion for segment {} already handled", completion.generation);
            return None;
        };

        info!(
            "Countdown for {:?} complete after {:?}",
            active.activity_type, completion.elapsed
        );
        self.finish_session(&active, true);
        self.record_action("complete");

        Some(Notification::new(
            &active.activity_type,
            active.session_id,
            completion.elapsed,
            completion.completed_at,
        ))
    }

    /// Send the notification from a detached task bounded by the notify timeout
    fn dispatch_notification(&self, notification: Notification) {
        let notifier = Arc::clone(&self.collaborators.notifier);
        let errors = Arc::clone(&self.errors);
        let limit = self.settings.notify_timeout;

        tokio::spawn(async move {
            let failure = match timeout(limit, notifier.notify(&notification)).await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => format!("Notification failed: {}", e),
                Err(_) => format!("Notification timed out after {:?}", limit),
            };
            warn!("{}", failure);
            if let Ok(mut list) = errors.lock() {
                list.push(failure);
            }
        });
    }

    async fn cancel_watcher(&self, slot: &mut Option<CompletionWatcher>) {
        if let Some(watcher) = slot.take() {
            watcher.cancel(self.settings.cancel_timeout).await;
        }
    }

    /// Replace any existing watcher with one bound to the current segment
    async fn respawn_watcher(&self, slot: &mut Option<CompletionWatcher>) {
        self.cancel_watcher(slot).await;

        let generation = match self.lock_engine() {
            Ok(engine)
                if engine.status() == TimerStatus::Running && engine.mode().is_countdown() =>
            {
                engine.generation()
            }
            _ => return,
        };

        *slot = Some(CompletionWatcher::spawn(
            Arc::clone(&self.engine),
            generation,
            self.settings.poll_interval,
            self.completion_tx.clone(),
        ));
    }
}
