//! Completion notifications

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::NotifyError;

pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// What the sink is told when a countdown finishes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub activity_type: String,
    pub session_id: Option<i64>,
    pub elapsed_seconds: f64,
    pub completed_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        activity_type: &str,
        session_id: Option<i64>,
        elapsed: Duration,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            activity_type: activity_type.to_string(),
            session_id,
            elapsed_seconds: elapsed.as_secs_f64(),
            completed_at,
        }
    }
}

/// Best-effort completion alert. Failures are reported, never retried.
pub trait NotificationSink: Send + Sync {
    fn notify<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<(), NotifyError>>;
}

/// Writes the completion to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            info!(
                "Focus session complete: {} ({})",
                notification.activity_type,
                crate::timer::format_hms(
                    Duration::try_from_secs_f64(notification.elapsed_seconds).unwrap_or_default()
                )
            );
            Ok(())
        })
    }
}

/// Runs an external command on completion (a sound player, `notify-send`, ...).
///
/// The notification is passed as JSON in the `FOCUS_NOTIFICATION` environment
/// variable.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
    args: Vec<String>,
}

impl CommandNotifier {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a whitespace-separated command line into program and arguments
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl NotificationSink for CommandNotifier {
    fn notify<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            debug!("Running notification command {}", self.program);
            let payload = serde_json::to_string(notification)
                .map_err(|e| NotifyError::Failed(format!("Failed to encode notification: {}", e)))?;

            let output = Command::new(&self.program)
                .args(&self.args)
                .env("FOCUS_NOTIFICATION", payload)
                .kill_on_drop(true)
                .output()
                .await?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(NotifyError::Failed(format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    stderr.trim()
                )));
            }

            info!("Notification command {} completed", self.program);
            Ok(())
        })
    }
}

/// Check that the notification program can be launched at all
pub async fn check_command_available(program: &str) -> Result<(), String> {
    Command::new("sh")
        .args(["-c", &format!("command -v {}", program)])
        .output()
        .await
        .map_err(|e| format!("Failed to probe for {}: {}", program, e))
        .and_then(|output| {
            if output.status.success() {
                Ok(())
            } else {
                Err(format!("{} is not available on PATH", program))
            }
        })
}
