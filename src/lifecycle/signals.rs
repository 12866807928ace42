//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT)
//! - Translate the first signal into a shutdown with its name as the cause
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Installed once, after every listener has been started

use crate::lifecycle::Shutdown;

/// Installs whatever turns external signals into a shutdown.
pub trait SignalTrap: Send + Sync {
    fn install(&self, shutdown: Shutdown);
}

/// Traps SIGINT and SIGTERM on the current Tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSignalTrap;

impl SignalTrap for TokioSignalTrap {
    fn install(&self, shutdown: Shutdown) {
        tokio::spawn(async move {
            let signal = wait_for_signal().await;
            tracing::info!(signal, "Shutdown signal received");
            shutdown.interrupt(signal);
        });
    }
}

/// Leaves signal handling to someone else; used when embedding the launcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSignalTrap;

impl SignalTrap for NoSignalTrap {
    fn install(&self, _shutdown: Shutdown) {}
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "Unable to install SIGTERM handler");
            return wait_for_ctrl_c().await;
        }
    };

    tokio::select! {
        signal = wait_for_ctrl_c() => signal,
        _ = terminate.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Unable to install SIGINT handler");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
