//! Signal handling for cancelling batch loads
//!
//! A termination signal cancels the run token: modules already executing
//! finish, modules not yet started are skipped.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Wait for a termination signal (SIGTERM, SIGINT, or Ctrl+C)
pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                signal::ctrl_c().await.ok();
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, cancelling module load...");
            }
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, cancelling module load...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, cancelling module load..."),
            Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
        }
    }
}

/// Cancel `token` when a termination signal arrives
///
/// The returned handle can be aborted once the guarded work is done.
pub fn cancel_on_shutdown_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_shutdown_signal() => token.cancel(),
            _ = token.cancelled() => {}
        }
    })
}
