//! Process-wide shutdown coordination
//!
//! One root token is cancelled on Ctrl+C, SIGTERM or an explicit request.
//! The HTTP listener and the heartbeat worker take child tokens. The first
//! trigger is kept as the shutdown reason so the exit log says what stopped
//! the process.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What started the shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// An OS signal, by name
    Signal(&'static str),
    /// The HTTP listener stopped without being asked to
    ListenerExited,
    /// Requested from code
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "signal {}", name),
            ShutdownReason::ListenerExited => f.write_str("listener exited"),
            ShutdownReason::Requested => f.write_str("requested"),
        }
    }
}

/// Coordinates graceful shutdown across components.
///
/// # Example
///
/// ```ignore
/// let shutdown = ShutdownController::with_signals();
///
/// let heartbeat = manager.spawn_heartbeat(&instance, &bindings, shutdown.child_token());
/// server.run(shutdown.child_token()).await?;
/// ```
#[derive(Clone, Default)]
pub struct ShutdownController {
    token: CancellationToken,
    reason: Arc<Mutex<Option<ShutdownReason>>>,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a controller cancelled by Ctrl+C or, on Unix, SIGTERM
    pub fn with_signals() -> Self {
        let controller = Self::new();
        let on_signal = controller.clone();

        tokio::spawn(async move {
            tokio::select! {
                signal = wait_for_signal() => on_signal.shutdown(ShutdownReason::Signal(signal)),
                _ = on_signal.token.cancelled() => {}
            }
        });

        controller
    }

    /// A token cancelled with this controller
    ///
    /// Cancelling the child alone leaves the controller and its siblings
    /// running.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Cancel every child token; only the first reason is kept
    pub fn shutdown(&self, reason: ShutdownReason) {
        {
            let mut recorded = self.reason.lock();
            if recorded.is_some() {
                return;
            }
            *recorded = Some(reason);
        }
        info!(%reason, "Initiating graceful shutdown");
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Why shutdown started, if it has
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.reason.lock()
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => tokio::select! {
            _ = ctrl_c() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        },
        Err(e) => {
            warn!(error = %e, "Failed to listen for SIGTERM");
            ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c().await;
    "Ctrl+C"
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
