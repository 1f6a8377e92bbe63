//! SIGINT/SIGTERM handling.
//!
//! The listeners are installed before the first backup is touched. When a
//! signal arrives, `main` drops the in-flight conversion and calls
//! [`InterruptHandler::abort`], which releases whatever the registry holds.
//! A second signal during that release exits immediately.

use crate::session::{ActiveBackupRegistry, LifecycleState};
use crate::utils::errors::EXIT_INTERRUPTED;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{error, info, warn};

pub struct InterruptHandler {
    registry: ActiveBackupRegistry,
    interrupt: Signal,
    terminate: Signal,
}

impl InterruptHandler {
    /// Start listening for SIGINT and SIGTERM.
    pub fn install(registry: ActiveBackupRegistry) -> std::io::Result<Self> {
        Ok(Self {
            registry,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the next signal and return its name.
    pub async fn wait_for_signal(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }

    /// Release the active backup and return the exit status.
    pub async fn abort(&mut self) -> i32 {
        let registry = self.registry.clone();
        tokio::select! {
            code = abort(&registry) => code,
            signal = self.wait_for_signal() => {
                warn!("Received {} during cleanup, exiting without finishing it", signal);
                EXIT_INTERRUPTED
            }
        }
    }
}

/// Release whatever `registry` holds. Release problems are logged, never
/// returned.
pub async fn abort(registry: &ActiveBackupRegistry) -> i32 {
    match registry.release_active().await {
        Some(released) => {
            info!(
                "Backup {} {:?} -> {:?}",
                released.name,
                released.state,
                LifecycleState::Aborted
            );
            if !released.report.is_clean() {
                warn!(
                    "Cleanup of {} incomplete, left behind: {:?}",
                    released.name, released.report.kept
                );
            }
        }
        None => info!("No backup was active"),
    }

    error!("Aborted.");
    EXIT_INTERRUPTED
}
