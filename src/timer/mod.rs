//! Timer core
//!
//! The state machine, the completion watcher and the snapshot reconciler.

pub mod engine;
pub mod reconciler;
pub mod snapshot;
pub mod watcher;

// Re-export main types
pub use engine::{format_hms, TimerEngine, TimerMode, TimerStatus};
pub use reconciler::{from_snapshot, to_snapshot, Restored};
pub use snapshot::{Snapshot, SnapshotMode};
pub use watcher::{Completion, CompletionWatcher, WatchOutcome};
