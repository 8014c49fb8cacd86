//! OS signal handling.

use std::sync::Arc;

use crate::core::Tasker;

/// Spawn a listener that asks every in-flight increment to stop on Ctrl-C
/// (and SIGTERM on unix).
///
/// Installing the listener replaces the default Ctrl-C behavior: the process
/// no longer exits on its own, and the host decides when to shut down after
/// the increments have wound down.
pub fn spawn_stop_on_signal(tasker: Arc<Tasker>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = wait_for_signal().await {
                tracing::error!("failed to listen for signals: {}", e);
                break;
            }
            let stopped = tasker.request_stop_all();
            tracing::warn!(stopped, "stop signal received, suspending in-flight increments");
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
