//! Signal handling for graceful shutdown

use futures::stream::StreamExt;
use signal_hook_tokio::Signals;
use tracing::{error, info};

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// The persisted timer snapshot is left in place so the next start can pick
/// the timer back up.
pub async fn shutdown_signal() {
    let mut signals = match Signals::new([
        signal_hook::consts::SIGTERM,
        signal_hook::consts::SIGINT,
    ]) {
        Ok(signals) => signals,
        Err(e) => {
            error!("Failed to install signal handler: {}", e);
            std::future::pending::<()>().await;
            return;
        }
    };

    if let Some(signal) = signals.next().await {
        info!("Received signal: {}", signal);
    }
}
