//! Shutdown signal handling and orderly teardown of the background loops.

use std::process::ExitCode;
use std::time::Duration;

use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::utils::fmt_duration;

/// Resolve on Ctrl-C, or SIGTERM on Unix.
///
/// If a handler cannot be installed, that signal is never observed; the other
/// one still works.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

/// Cancel `cancel`, then give the named tasks `timeout` to wind down.
///
/// Tasks still running after the timeout are aborted and the exit code
/// reports failure.
pub async fn shutdown_tasks(
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    cancel: &CancellationToken,
    timeout: Duration,
) -> ExitCode {
    if stop_tasks(tasks, cancel, timeout).await {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Returns whether every task stopped on its own.
async fn stop_tasks(
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    cancel: &CancellationToken,
    timeout: Duration,
) -> bool {
    cancel.cancel();

    let deadline = tokio::time::Instant::now() + timeout;
    let mut clean = true;

    for (name, mut handle) in tasks {
        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(())) => info!(task = name, "Task stopped"),
            Ok(Err(e)) => {
                error!(task = name, error = %e, "Task panicked");
                clean = false;
            }
            Err(_) => {
                warn!(
                    task = name,
                    timeout = fmt_duration(timeout),
                    "Task did not stop in time, aborting"
                );
                handle.abort();
                clean = false;
            }
        }
    }

    clean
}
