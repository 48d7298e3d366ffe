//! Countdown completion background task

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{state::AppState, timer::Completion};

/// Background task that closes out countdowns as their watchers fire
pub async fn completion_task(state: Arc<AppState>, mut completions: mpsc::UnboundedReceiver<Completion>) {
    info!("Starting completion task");

    while let Some(completion) = completions.recv().await {
        debug!(
            "Completion received for segment {} at {}",
            completion.generation, completion.completed_at
        );
        state.handle_completion(completion).await;
    }

    info!("Completion channel closed, stopping completion task");
}
