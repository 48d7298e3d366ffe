//! API request and response structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::TimerView;

/// Body of `POST /timer/start`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    pub activity_type: String,
    /// Omit for a stopwatch
    #[serde(default)]
    pub duration_minutes: Option<f64>,
}

/// API response structure for timer control endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub timer: Option<TimerView>,
}

impl ApiResponse {
    /// Create a new API response
    pub fn new(status: String, message: String, timer: Option<TimerView>) -> Self {
        Self {
            status,
            message,
            timestamp: Utc::now(),
            timer,
        }
    }

    /// Create a success response
    pub fn ok(message: String, timer: TimerView) -> Self {
        Self::new("ok".to_string(), message, Some(timer))
    }

    /// Create an error response
    pub fn error(message: String) -> Self {
        Self::new("error".to_string(), message, None)
    }
}

/// Status response with timer and server information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub timer: TimerView,
    pub uptime: String,
    pub port: u16,
    pub host: String,
    pub last_action: Option<String>,
    pub last_action_time: Option<DateTime<Utc>>,
    pub errors: Vec<String>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    /// Create a new health response
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
