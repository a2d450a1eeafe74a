use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::error::{OrchestratorError, Result};

/// Shared stop flag observed by the driver at the top of every tick
///
/// Starts cleared and, once set, stays set for the rest of the process.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop; returns true only for the first request
    pub fn request(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Install SIGINT and SIGTERM handlers that set `stop`
///
/// The handlers never touch an in-flight iteration; they only keep the next
/// tick from starting. Must be called from within a tokio runtime.
pub fn install(stop: StopSignal) -> Result<JoinHandle<()>> {
    // Registered eagerly so a signal arriving before the task first runs is
    // still caught instead of killing the process
    #[cfg(unix)]
    let (mut interrupt, mut terminate) = {
        use tokio::signal::unix::{signal, SignalKind};
        (
            signal(SignalKind::interrupt()).map_err(OrchestratorError::SignalInstallError)?,
            signal(SignalKind::terminate()).map_err(OrchestratorError::SignalInstallError)?,
        )
    };

    let handle = tokio::spawn(async move {
        #[cfg(unix)]
        let name = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        };

        #[cfg(not(unix))]
        let name = {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl+C: {}", e);
                return;
            }
            "SIGINT"
        };

        info!("Signal {} received, shutting down...", name);
        stop.request();
    });

    Ok(handle)
}
