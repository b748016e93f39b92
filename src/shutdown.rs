//! Termination signal handling.

use tracing::{error, info};

use crate::supervisor::Supervisor;

/// Resolve on the first SIGINT or SIGTERM.
pub async fn signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                error!("Failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
                info!("Received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received SIGINT");
    }
}

/// Cancel every runner and persist final state.
///
/// Runners are only asked to stop; their tasks are not awaited; the process
/// exits right after and takes any in-flight child with it.
pub async fn finish(supervisor: &Supervisor) {
    info!("Stopping programs and saving state...");
    match supervisor.shutdown().await {
        Ok(handles) => drop(handles),
        Err(e) => error!("Failed to save state on shutdown: {e}"),
    }
}
