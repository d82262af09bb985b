//! Graceful shutdown signal, grounded on the reference crate's
//! `server_utils::shutdown_signal` ctrl_c/SIGTERM select.

use tokio::signal;

#[allow(clippy::expect_used, reason = "signal handlers are critical infrastructure")]
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install ctrl+c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received ctrl+c, starting graceful shutdown"),
        () = terminate => tracing::info!("received sigterm, starting graceful shutdown"),
    }
}
