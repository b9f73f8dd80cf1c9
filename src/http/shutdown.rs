//! Signal-driven shutdown for the serving handle.
//!
//! The serving core exposes no internal cancellation: a running accept
//! loop stops when its [`Handle`] is shut down from outside. This module is
//! the opt-in glue between process signals and that handle for hosts that
//! want it; embedders with their own lifecycle management drive the handle
//! directly.

use std::time::Duration;

use axum_server::Handle;

/// How long draining connections are given before shutdown completes.
const GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Spawns a task that triggers graceful shutdown on Ctrl+C or SIGTERM.
///
/// When either signal arrives the server stops accepting new connections,
/// waits up to the grace period for in-flight connections to finish, then
/// stops.
pub fn on_termination_signals(handle: Handle) {
    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
        }

        handle.graceful_shutdown(Some(GRACE_PERIOD));
        tracing::info!(
            grace_secs = GRACE_PERIOD.as_secs(),
            "Graceful shutdown initiated, waiting for connections to close"
        );
    });
}
