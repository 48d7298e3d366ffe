//! External service integration module
//!
//! This module contains the notification sinks invoked when a countdown
//! completes.

pub mod notify;

// Re-export main types
pub use notify::*;
