//! Focus Timer - a focus-tracking timer server
//!
//! This is the main entry point for the focus-timer application.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use focus_timer::{
    api::create_router,
    clock::{SharedClock, SystemClock},
    config::Config,
    services::{check_command_available, CommandNotifier, LogNotifier, NotificationSink},
    state::{AppState, Collaborators},
    store::{MemoryStore, SqliteStore},
    tasks::completion_task,
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("focus_timer={},tower_http=info", config.log_level()))
        .init();

    info!("Starting focus-timer server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration: host={}, port={}, database={}, poll={}ms",
        config.host,
        config.port,
        if config.in_memory {
            "<memory>".to_string()
        } else {
            config.database.display().to_string()
        },
        config.poll_interval_ms
    );

    let clock: SharedClock = Arc::new(SystemClock);

    let notifier: Arc<dyn NotificationSink> = match config
        .notify_command
        .as_deref()
        .and_then(CommandNotifier::from_command_line)
    {
        Some(notifier) => {
            // A missing program only costs the alert, not the timer
            if let Err(e) = check_command_available(notifier.program()).await {
                warn!("{}", e);
            }
            Arc::new(notifier)
        }
        None => Arc::new(LogNotifier),
    };

    let collaborators = if config.in_memory {
        let store = Arc::new(MemoryStore::new(clock.clone()));
        Collaborators {
            state_store: store.clone(),
            session_store: store,
            notifier,
        }
    } else {
        let store = Arc::new(
            SqliteStore::open(&config.database, clock.clone())
                .with_context(|| format!("opening {}", config.database.display()))?,
        );
        Collaborators {
            state_store: store.clone(),
            session_store: store,
            notifier,
        }
    };

    // Create application state
    let (state, completions) = AppState::new(clock, collaborators, config.settings());
    let state = Arc::new(state);

    // The completion task must be consuming before restore can spawn a watcher
    let completion_state = Arc::clone(&state);
    tokio::spawn(async move {
        completion_task(completion_state, completions).await;
    });

    let outcome = state.restore().await.context("restoring persisted timer")?;
    info!("Timer restore: {:?}", outcome);

    // Create HTTP router with all endpoints
    let app = create_router(Arc::clone(&state));

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  POST /timer/start   - Start a countdown or stopwatch");
    info!("  POST /timer/pause   - Pause the running timer");
    info!("  POST /timer/resume  - Resume the paused timer");
    info!("  POST /timer/stop    - Stop the timer and close its session");
    info!("  GET  /status        - Check current timer status");
    info!("  GET  /health        - Health check");

    // Setup graceful shutdown
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
