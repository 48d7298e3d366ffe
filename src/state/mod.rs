//! State management module
//!
//! This module contains the timer controller and its client-facing view.

pub mod app_state;
pub mod timer_state;

// Re-export main types
pub use app_state::{AppState, Collaborators, RestoreOutcome, Settings};
pub use timer_state::TimerView;
