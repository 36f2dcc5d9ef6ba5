//! Run-wide cancellation
//!
//! One [`CancellationCoordinator`] exists per run. It owns the root
//! [`CancellationToken`] every worker and runner observes, turns OS signals
//! into a single cancellation, and carries the grace period in-flight work is
//! given to wind down.

use crate::config::ShutdownConfig;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What caused the run to be cancelled
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// An OS signal (`SIGINT`, `SIGTERM`, `Ctrl+C`)
    Signal(&'static str),
    /// Requested programmatically
    Requested(String),
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Signal(name) => write!(f, "received {name}"),
            CancelReason::Requested(why) => f.write_str(why),
        }
    }
}

struct Inner {
    token: CancellationToken,
    grace_period: Duration,
    reason: OnceLock<CancelReason>,
}

/// Owner of the run's cancellation token
///
/// Cheap to clone; clones share the same token.
///
/// # Example
///
/// ```
/// use sopti::cancellation::{CancelReason, CancellationCoordinator};
/// use std::time::Duration;
///
/// let coordinator = CancellationCoordinator::new(Duration::from_secs(10));
/// let token = coordinator.token();
///
/// assert!(coordinator.trigger(CancelReason::Requested("test".into())));
/// assert!(!coordinator.trigger(CancelReason::Requested("again".into())));
/// assert!(token.is_cancelled());
/// ```
#[derive(Clone)]
pub struct CancellationCoordinator {
    inner: Arc<Inner>,
}

impl CancellationCoordinator {
    /// Create a coordinator with the given grace period
    pub fn new(grace_period: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                grace_period,
                reason: OnceLock::new(),
            }),
        }
    }

    /// Create a coordinator from shutdown settings
    pub fn from_config(config: &ShutdownConfig) -> Self {
        Self::new(config.grace_period)
    }

    /// Cancel the run
    ///
    /// Idempotent: only the first call cancels and logs. Returns `true` if this
    /// call was the one that cancelled.
    pub fn trigger(&self, reason: CancelReason) -> bool {
        if self.inner.reason.set(reason.clone()).is_err() {
            tracing::debug!(reason = %reason, "cancellation already in progress");
            return false;
        }

        tracing::warn!(
            reason = %reason,
            grace_period_secs = self.inner.grace_period.as_secs_f64(),
            "cancelling run"
        );
        self.inner.token.cancel();
        true
    }

    /// Whether the run has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// What cancelled the run, if it has been cancelled
    pub fn reason(&self) -> Option<&CancelReason> {
        self.inner.reason.get()
    }

    /// A handle to the run's token
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    /// A child token, cancelled with the run but independently cancellable
    pub fn child_token(&self) -> CancellationToken {
        self.inner.token.child_token()
    }

    /// Resolves once the run is cancelled
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await;
    }

    /// How long in-flight work gets after cancellation
    pub fn grace_period(&self) -> Duration {
        self.inner.grace_period
    }

    /// Translate OS signals into cancellation
    ///
    /// Spawns a task that triggers on the first SIGINT/SIGTERM (Ctrl+C on
    /// non-Unix). Later signals are logged and ignored; the run is already
    /// winding down within its grace period. Abort the returned handle when
    /// the run ends.
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            loop {
                let Some(signal) = wait_for_signal().await else {
                    return;
                };
                if !coordinator.trigger(CancelReason::Signal(signal)) {
                    tracing::warn!(signal, "already shutting down, ignoring signal");
                }
            }
        })
    }
}

impl fmt::Debug for CancellationCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationCoordinator")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .field("grace_period", &self.inner.grace_period)
            .finish()
    }
}

/// Wait for a termination signal
///
/// Returns the signal's name, or `None` if no handler could be installed.
#[cfg(unix)]
async fn wait_for_signal() -> Option<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                    Some("SIGTERM")
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                    Some("SIGINT")
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
                Some("SIGINT")
            } else {
                ctrl_c_fallback().await
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
                Some("SIGTERM")
            } else {
                ctrl_c_fallback().await
            }
        }
    }
}

#[cfg(unix)]
async fn ctrl_c_fallback() -> Option<&'static str> {
    tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
    tokio::signal::ctrl_c().await.ok().map(|()| "Ctrl+C")
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Option<&'static str> {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
            Some("Ctrl+C")
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            None
        }
    }
}
