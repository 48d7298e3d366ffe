//! Focus Timer - a focus-tracking timer with restart-safe sessions
//!
//! This library provides a pausable countdown/stopwatch timer, a watcher that
//! signals countdown completion exactly once, and the reconciliation needed to
//! pick an active timer back up after the process restarts.

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod services;
pub mod state;
pub mod store;
pub mod tasks;
pub mod timer;
pub mod utils;

// Re-export commonly used types
pub use api::create_router;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{FocusError, TimerError};
pub use state::AppState;
pub use timer::{TimerEngine, TimerMode, TimerStatus};
pub use utils::signals::shutdown_signal;
