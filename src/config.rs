//! Configuration and CLI argument handling

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::state::Settings;

/// CLI argument parsing structure
#[derive(Parser, Debug)]
#[command(name = "focus-timer")]
#[command(about = "A focus-tracking timer server with restart-safe countdown and stopwatch sessions")]
#[command(version)]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// SQLite database holding sessions and the active timer
    #[arg(short, long, default_value = "data/focus.db")]
    pub database: PathBuf,

    /// Keep sessions and timer state in memory only
    #[arg(long)]
    pub in_memory: bool,

    /// Command to run when a countdown completes, e.g. "paplay /usr/share/sounds/bell.oga"
    #[arg(short, long)]
    pub notify_command: Option<String>,

    /// How often the completion watcher checks the countdown, in milliseconds
    #[arg(long, default_value = "100", value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_ms: u64,

    /// How long pause/stop wait for the watcher to exit, in milliseconds
    #[arg(long, default_value = "1000")]
    pub cancel_timeout_ms: u64,

    /// How long a completion notification may run before it is abandoned, in milliseconds
    #[arg(long, default_value = "30000")]
    pub notify_timeout_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    pub fn settings(&self) -> Settings {
        Settings {
            host: self.host.clone(),
            port: self.port,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            cancel_timeout: Duration::from_millis(self.cancel_timeout_ms),
            notify_timeout: Duration::from_millis(self.notify_timeout_ms),
        }
    }
}
