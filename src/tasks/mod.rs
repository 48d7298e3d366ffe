//! Background tasks module
//!
//! This module contains background tasks that run alongside the HTTP server.

pub mod completion;

// Re-export main functions
pub use completion::completion_task;
