use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::TimeDelta;
use futures::future::BoxFuture;
use tokio::{sync::mpsc, time::timeout};

use focus_timer::{
    clock::{Clock, ManualClock},
    error::{FocusError, NotifyError, StoreError, TimerError},
    services::{Notification, NotificationSink},
    state::{AppState, Collaborators, RestoreOutcome, Settings},
    store::{MemoryStore, SessionStore, StateStore},
    timer::{Completion, Snapshot, SnapshotMode, TimerStatus},
};

const POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Sink {
    #[default]
    Ok,
    Fail,
    /// Never resolves
    Hang,
}

#[derive(Default)]
struct CountingNotifier {
    calls: AtomicUsize,
    sink: Sink,
}

impl NotificationSink for CountingNotifier {
    fn notify<'a>(&'a self, _: &'a Notification) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.sink {
                Sink::Ok => Ok(()),
                Sink::Fail => Err(NotifyError::Failed("speaker unplugged".to_string())),
                Sink::Hang => futures::future::pending().await,
            }
        })
    }
}

/// Delegates to a `MemoryStore` but takes its time writing paused snapshots
struct SlowPauseStore {
    inner: Arc<MemoryStore>,
    delay: Duration,
}

impl StateStore for SlowPauseStore {
    fn get(&self) -> Result<Option<Snapshot>, StoreError> {
        self.inner.get()
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if snapshot.paused {
            std::thread::sleep(self.delay);
        }
        self.inner.save(snapshot)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.inner.clear()
    }
}

fn settings() -> Settings {
    Settings {
        poll_interval: POLL,
        notify_timeout: Duration::from_millis(200),
        ..Settings::default()
    }
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
    notifier: Arc<CountingNotifier>,
    state: AppState,
    completions: mpsc::UnboundedReceiver<Completion>,
}

fn harness_with(store: Arc<MemoryStore>, clock: Arc<ManualClock>, sink: Sink) -> Harness {
    let notifier = Arc::new(CountingNotifier {
        calls: AtomicUsize::new(0),
        sink,
    });
    let collaborators = Collaborators {
        state_store: store.clone(),
        session_store: store.clone(),
        notifier: notifier.clone(),
    };
    let (state, completions) = AppState::new(clock.clone(), collaborators, settings());
    Harness {
        clock,
        store,
        notifier,
        state,
        completions,
    }
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemoryStore::new(clock.clone()));
    harness_with(store, clock, Sink::Ok)
}

impl Harness {
    async fn next_completion(&mut self) -> Completion {
        timeout(Duration::from_secs(2), self.completions.recv())
            .await
            .expect("countdown should complete")
            .expect("completion channel open")
    }

    fn notifications(&self) -> usize {
        self.notifier.calls.load(Ordering::SeqCst)
    }

    async fn wait_for_notifications(&self, n: usize) {
        eventually("notifications", || self.notifications() >= n).await;
    }
}

const fn mins(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

#[tokio::test]
async fn countdown_completes_and_closes_session() {
    let mut h = harness();
    let view = h.state.start("Work", Some(mins(25))).await.unwrap();
    let session_id = view.session_id.unwrap();
    assert!(h.state.watcher_running().await);
    assert!(h.store.get().unwrap().is_some());

    h.clock.advance(mins(25));
    let completion = h.next_completion().await;
    h.state.handle_completion(completion.clone()).await;

    let session = h.store.session(session_id).unwrap().unwrap();
    assert!(session.completed);
    assert_eq!(session.duration_minutes, Some(25.0));
    assert_eq!(h.store.get().unwrap(), None);
    h.wait_for_notifications(1).await;
    assert_eq!(h.state.view().unwrap().status, TimerStatus::Stopped);
    assert!(!h.state.watcher_running().await);

    // A duplicate delivery changes nothing
    h.state.handle_completion(completion).await;
    tokio::time::sleep(POLL * 4).await;
    assert_eq!(h.notifications(), 1);
}

#[tokio::test]
async fn second_start_is_rejected() {
    let h = harness();
    h.state.start("Work", None).await.unwrap();
    assert!(matches!(
        h.state.start("Work", None).await,
        Err(FocusError::Timer(TimerError::AlreadyRunning))
    ));
}

#[tokio::test]
async fn persisted_snapshot_blocks_start() {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemoryStore::new(clock.clone()));
    store
        .save(&Snapshot {
            mode: SnapshotMode::Stopwatch,
            activity_type: "Reading".to_string(),
            start_time: Some(clock.now()),
            elapsed_time_seconds: 0.0,
            target_duration_minutes: None,
            paused: false,
            session_id: None,
            saved_at: clock.now(),
        })
        .unwrap();

    let h = harness_with(store, clock, Sink::Ok);
    assert!(matches!(
        h.state.start("Work", Some(mins(5))).await,
        Err(FocusError::ActiveTimerExists)
    ));
    assert!(h.store.sessions().unwrap().is_empty());
}

#[tokio::test]
async fn pause_resume_preserves_elapsed_and_persists() {
    let h = harness();
    h.state.start("Study", Some(mins(10))).await.unwrap();
    h.clock.advance(mins(3));

    let paused = h.state.pause().await.unwrap();
    assert_eq!(paused.status, TimerStatus::Paused);
    assert!(!h.state.watcher_running().await);
    let snapshot = h.store.get().unwrap().unwrap();
    assert!(snapshot.paused);
    assert_eq!(snapshot.start_time, None);
    assert_eq!(snapshot.elapsed_time_seconds, 180.0);

    h.clock.advance(mins(60));
    let resumed = h.state.resume().await.unwrap();
    assert_eq!(resumed.remaining_seconds, Some(420.0));
    assert!(h.state.watcher_running().await);

    h.clock.advance(mins(2));
    let elapsed = h.state.stop().await.unwrap();
    assert_eq!(elapsed, mins(5));
    assert!(!h.state.watcher_running().await);
}

#[tokio::test]
async fn transitions_from_wrong_state_are_errors() {
    let h = harness();
    assert!(matches!(
        h.state.pause().await,
        Err(FocusError::Timer(TimerError::NotRunning))
    ));
    assert!(matches!(
        h.state.resume().await,
        Err(FocusError::Timer(TimerError::NotPaused))
    ));
    h.state.start("Work", None).await.unwrap();
    assert!(matches!(
        h.state.resume().await,
        Err(FocusError::Timer(TimerError::NotPaused))
    ));
}

#[tokio::test]
async fn stop_is_idempotent_and_closes_once() {
    let h = harness();
    let session_id = h.state.start("Work", None).await.unwrap().session_id.unwrap();
    h.clock.advance(Duration::from_secs(90));

    let first = h.state.stop().await.unwrap();
    let closed = h.store.session(session_id).unwrap().unwrap();
    h.clock.advance(Duration::from_secs(90));
    let second = h.state.stop().await.unwrap();

    assert_eq!(first, Duration::from_secs(90));
    assert_eq!(first, second);
    assert_eq!(h.store.session(session_id).unwrap().unwrap(), closed);
    assert!(closed.completed, "stopwatch sessions count as completed");
    assert_eq!(h.store.get().unwrap(), None);
}

#[tokio::test]
async fn early_countdown_stop_is_not_completed() {
    let h = harness();
    let session_id = h
        .state
        .start("Work", Some(mins(25)))
        .await
        .unwrap()
        .session_id
        .unwrap();
    h.clock.advance(mins(10));
    assert_eq!(h.state.stop().await.unwrap(), mins(10));

    let session = h.store.session(session_id).unwrap().unwrap();
    assert!(!session.completed);
    assert!(!session.is_open());
    assert_eq!(h.notifications(), 0);
}

#[tokio::test]
async fn stop_after_completion_does_not_double_close() {
    let mut h = harness();
    let session_id = h
        .state
        .start("Work", Some(mins(1)))
        .await
        .unwrap()
        .session_id
        .unwrap();
    h.clock.advance(mins(1));
    let completion = h.next_completion().await;

    // The user hits stop before the completion is processed
    assert_eq!(h.state.stop().await.unwrap(), mins(1));
    assert!(h.store.session(session_id).unwrap().unwrap().is_open());

    h.state.handle_completion(completion).await;
    let session = h.store.session(session_id).unwrap().unwrap();
    assert!(session.completed);
    h.wait_for_notifications(1).await;
}

#[tokio::test]
async fn notification_failure_is_swallowed() {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let mut h = harness_with(store, clock, Sink::Fail);

    let session_id = h
        .state
        .start("Work", Some(mins(1)))
        .await
        .unwrap()
        .session_id
        .unwrap();
    h.clock.advance(mins(2));
    let completion = h.next_completion().await;
    h.state.handle_completion(completion).await;

    assert!(h.store.session(session_id).unwrap().unwrap().completed);
    assert_eq!(h.store.get().unwrap(), None);
    eventually("notification error", || h.state.errors().len() == 1).await;
    assert_eq!(h.notifications(), 1);

    // Next timer starts with a clean slate
    h.state.start("Work", None).await.unwrap();
    assert!(h.state.errors().is_empty());
}

fn running_snapshot(
    clock: &ManualClock,
    store: &MemoryStore,
    elapsed: f64,
    gap_secs: i64,
) -> i64 {
    let session_id = store.start_session("Work").unwrap();
    let start = clock.now() - TimeDelta::seconds(gap_secs);
    store
        .save(&Snapshot {
            mode: SnapshotMode::Timer,
            activity_type: "Work".to_string(),
            start_time: Some(start),
            elapsed_time_seconds: elapsed,
            target_duration_minutes: Some(5.0),
            paused: false,
            session_id: Some(session_id),
            saved_at: start,
        })
        .unwrap();
    session_id
}

#[tokio::test]
async fn restore_folds_gap_and_keeps_watching() {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let session_id = running_snapshot(&clock, &store, 30.0, 20);
    let mut h = harness_with(store, clock, Sink::Ok);

    assert_eq!(h.state.restore().await.unwrap(), RestoreOutcome::Running);
    let view = h.state.view().unwrap();
    assert_eq!(view.remaining_seconds, Some(250.0));
    assert_eq!(view.session_id, Some(session_id));
    assert!(h.state.watcher_running().await);

    let resaved = h.store.get().unwrap().unwrap();
    assert_eq!(resaved.elapsed_time_seconds, 50.0);
    assert_eq!(resaved.start_time, Some(h.clock.now()));

    h.clock.advance(Duration::from_secs(250));
    let completion = h.next_completion().await;
    h.state.handle_completion(completion).await;
    assert!(h.store.session(session_id).unwrap().unwrap().completed);
}

#[tokio::test]
async fn restore_past_deadline_completes_immediately() {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let session_id = running_snapshot(&clock, &store, 290.0, 20);
    let h = harness_with(store, clock, Sink::Ok);

    assert_eq!(h.state.restore().await.unwrap(), RestoreOutcome::Completed);
    let session = h.store.session(session_id).unwrap().unwrap();
    assert!(session.completed);
    assert_eq!(h.store.get().unwrap(), None);
    h.wait_for_notifications(1).await;
    assert!(!h.state.watcher_running().await);

    // Nothing blocks the next timer
    h.state.start("Work", None).await.unwrap();
}

#[tokio::test]
async fn restore_paused_timer() {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemoryStore::new(clock.clone()));
    store
        .save(&Snapshot {
            mode: SnapshotMode::Timer,
            activity_type: "Writing".to_string(),
            start_time: None,
            elapsed_time_seconds: 120.0,
            target_duration_minutes: Some(5.0),
            paused: true,
            session_id: None,
            saved_at: clock.now() - TimeDelta::hours(8),
        })
        .unwrap();
    let h = harness_with(store, clock, Sink::Ok);

    assert_eq!(h.state.restore().await.unwrap(), RestoreOutcome::Paused);
    let view = h.state.view().unwrap();
    assert_eq!(view.status, TimerStatus::Paused);
    assert_eq!(view.remaining_seconds, Some(180.0));
    assert_eq!(view.display, "00:03:00");
    assert!(!h.state.watcher_running().await);
}

#[tokio::test]
async fn corrupt_snapshot_restores_idle() {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemoryStore::new(clock.clone()));
    store
        .save(&Snapshot {
            mode: SnapshotMode::Timer,
            activity_type: "Work".to_string(),
            start_time: None,
            elapsed_time_seconds: -3.0,
            target_duration_minutes: None,
            paused: false,
            session_id: None,
            saved_at: clock.now(),
        })
        .unwrap();
    let h = harness_with(store, clock, Sink::Ok);

    assert_eq!(h.state.restore().await.unwrap(), RestoreOutcome::Discarded);
    assert_eq!(h.store.get().unwrap(), None);
    assert_eq!(h.state.view().unwrap().status, TimerStatus::Idle);
    h.state.start("Work", None).await.unwrap();
}

#[tokio::test]
async fn restore_with_nothing_persisted() {
    let h = harness();
    assert_eq!(h.state.restore().await.unwrap(), RestoreOutcome::Idle);
    assert_eq!(h.state.view().unwrap().status, TimerStatus::Idle);
}

#[tokio::test]
async fn hung_notifier_does_not_block_later_completions() {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let mut h = harness_with(store, clock, Sink::Hang);

    let mut sessions = Vec::new();
    for activity in ["Work", "Study"] {
        let view = h.state.start(activity, Some(mins(1))).await.unwrap();
        sessions.push(view.session_id.unwrap());
        h.clock.advance(mins(1));
        let completion = h.next_completion().await;
        timeout(Duration::from_secs(1), h.state.handle_completion(completion))
            .await
            .expect("completion handling must not wait on the notifier");
    }

    for session_id in sessions {
        assert!(h.store.session(session_id).unwrap().unwrap().completed);
    }
    h.state.start("Reading", None).await.unwrap();

    // A stuck notification is abandoned and reported
    eventually("notification timeout", || !h.state.errors().is_empty()).await;
    assert!(h.state.errors()[0].contains("timed out"));
}

#[tokio::test]
async fn hung_notifier_does_not_block_expired_restore() {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let session_id = running_snapshot(&clock, &store, 290.0, 20);
    let h = harness_with(store, clock, Sink::Hang);

    let outcome = timeout(Duration::from_secs(1), h.state.restore())
        .await
        .expect("restore must not wait on the notifier")
        .unwrap();
    assert_eq!(outcome, RestoreOutcome::Completed);
    assert!(h.store.session(session_id).unwrap().unwrap().completed);
    h.state.start("Work", None).await.unwrap();
}

struct Shared {
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
    state: Arc<AppState>,
    completions: mpsc::UnboundedReceiver<Completion>,
}

fn shared(pause_delay: Duration) -> Shared {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let collaborators = Collaborators {
        state_store: Arc::new(SlowPauseStore {
            inner: store.clone(),
            delay: pause_delay,
        }),
        session_store: store.clone(),
        notifier: Arc::new(CountingNotifier::default()),
    };
    let (state, completions) = AppState::new(clock.clone(), collaborators, settings());
    Shared {
        clock,
        store,
        state: Arc::new(state),
        completions,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_pause_and_resume_keep_watcher_and_snapshot_in_step() {
    let mut s = shared(Duration::from_millis(300));
    let session_id = s
        .state
        .start("Work", Some(mins(1)))
        .await
        .unwrap()
        .session_id
        .unwrap();

    let pausing = tokio::spawn({
        let state = Arc::clone(&s.state);
        async move { state.pause().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    let resumed = s.state.resume().await;
    pausing.await.unwrap().unwrap();

    let status = s.state.view().unwrap().status;
    let persisted = s.store.get().unwrap().expect("timer is still active");
    assert_eq!(persisted.paused, status == TimerStatus::Paused);
    assert_eq!(s.state.watcher_running().await, status == TimerStatus::Running);
    if resumed.is_err() {
        // The resume got in before the pause
        assert_eq!(status, TimerStatus::Paused);
        s.state.resume().await.unwrap();
    }
    assert!(s.state.watcher_running().await);
    assert!(!s.store.get().unwrap().unwrap().paused);

    s.clock.advance(mins(2));
    let completion = timeout(Duration::from_secs(2), s.completions.recv())
        .await
        .expect("resumed countdown should complete")
        .unwrap();
    s.state.handle_completion(completion).await;
    assert!(s.store.session(session_id).unwrap().unwrap().completed);
    assert_eq!(s.store.get().unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stop_and_resume_leave_timer_stopped() {
    let mut s = shared(Duration::ZERO);
    let session_id = s
        .state
        .start("Work", Some(mins(1)))
        .await
        .unwrap()
        .session_id
        .unwrap();
    s.clock.advance(Duration::from_secs(10));
    s.state.pause().await.unwrap();

    let stopping = tokio::spawn({
        let state = Arc::clone(&s.state);
        async move { state.stop().await }
    });
    let resuming = tokio::spawn({
        let state = Arc::clone(&s.state);
        async move { state.resume().await }
    });
    assert_eq!(stopping.await.unwrap().unwrap(), Duration::from_secs(10));
    let _ = resuming.await.unwrap();

    assert_eq!(s.state.view().unwrap().status, TimerStatus::Stopped);
    assert!(!s.state.watcher_running().await);
    assert_eq!(s.store.get().unwrap(), None);
    let session = s.store.session(session_id).unwrap().unwrap();
    assert!(!session.is_open());
    assert!(!session.completed);

    s.clock.advance(mins(5));
    assert!(timeout(Duration::from_millis(200), s.completions.recv())
        .await
        .is_err());
}
