//! Countdown completion watcher
//!
//! One watcher is bound to one running segment (identified by the engine's
//! generation). It polls the shared engine, and when the deadline passes it
//! stops the engine under the same lock it checked the deadline with, so a
//! concurrent pause or stop either lands before the check (and the watcher
//! exits quietly) or after it (and finds the timer already stopped).

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{interval, timeout, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use super::engine::{TimerEngine, TimerStatus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_CANCEL_TIMEOUT: Duration = Duration::from_secs(1);

/// Emitted once when a countdown segment reaches its deadline
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub generation: u64,
    pub elapsed: Duration,
    pub completed_at: DateTime<Utc>,
}

/// How a watcher task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    Fired,
    Cancelled,
    /// The engine was paused, stopped or restarted under it
    Superseded,
}

/// Handle to a running watcher task. Dropping it cancels the task.
#[derive(Debug)]
pub struct CompletionWatcher {
    generation: u64,
    cancel_tx: watch::Sender<bool>,
    handle: JoinHandle<WatchOutcome>,
}

impl CompletionWatcher {
    /// Spawn a watcher for the engine's current segment
    pub fn spawn(
        engine: Arc<Mutex<TimerEngine>>,
        generation: u64,
        poll_interval: Duration,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(watch_loop(
            engine,
            generation,
            poll_interval,
            cancel_rx,
            completions,
        ));
        debug!("Spawned completion watcher for segment {}", generation);

        Self {
            generation,
            cancel_tx,
            handle,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal cancellation and wait up to `limit` for the task to exit.
    ///
    /// Returns `None` if the task did not finish in time; it is left to
    /// observe the signal on its own.
    pub async fn cancel(self, limit: Duration) -> Option<WatchOutcome> {
        // Err only means the task already exited
        let _ = self.cancel_tx.send(true);

        match timeout(limit, self.handle).await {
            Ok(Ok(outcome)) => {
                debug!("Watcher for segment {} ended: {:?}", self.generation, outcome);
                Some(outcome)
            }
            Ok(Err(e)) => {
                error!("Watcher for segment {} failed: {}", self.generation, e);
                None
            }
            Err(_) => {
                warn!(
                    "Watcher for segment {} did not stop within {:?}",
                    self.generation, limit
                );
                None
            }
        }
    }
}

enum Poll {
    Waiting,
    Done(Completion),
    Stale,
}

async fn watch_loop(
    engine: Arc<Mutex<TimerEngine>>,
    generation: u64,
    poll_interval: Duration,
    mut cancel_rx: watch::Receiver<bool>,
    completions: mpsc::UnboundedSender<Completion>,
) -> WatchOutcome {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            // A closed channel means the handle was dropped
            changed = cancel_rx.changed() => {
                if changed.is_err() || *cancel_rx.borrow() {
                    return WatchOutcome::Cancelled;
                }
            }

            _ = ticker.tick() => {
                match poll(&engine, generation) {
                    Poll::Waiting => {}
                    Poll::Stale => return WatchOutcome::Superseded,
                    Poll::Done(completion) => {
                        info!(
                            "Countdown segment {} completed after {:?}",
                            generation, completion.elapsed
                        );
                        if let Err(e) = completions.send(completion) {
                            warn!("Completion for segment {} had no receiver: {}", generation, e);
                        }
                        return WatchOutcome::Fired;
                    }
                }
            }
        }
    }
}

fn poll(engine: &Mutex<TimerEngine>, generation: u64) -> Poll {
    let mut engine = match engine.lock() {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to lock timer engine: {}", e);
            return Poll::Stale;
        }
    };

    if engine.generation() != generation || engine.status() != TimerStatus::Running {
        return Poll::Stale;
    }
    if !engine.deadline_reached() {
        return Poll::Waiting;
    }

    let elapsed = engine.stop();
    Poll::Done(Completion {
        generation,
        elapsed,
        completed_at: engine.clock().now(),
    })
}
