//! Signal handling for graceful shutdown.
//!
//! SIGINT and SIGTERM (Ctrl-C on Windows) cancel a shared [`ShutdownToken`].
//! The command server and the reconciliation loop select on
//! [`ShutdownToken::cancelled`] and return; hosts and firewall rules are left
//! in place so the block survives a daemon restart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

/// A guard that manages signal handlers for graceful shutdown.
/// When created, it spawns a task that listens for SIGINT and SIGTERM.
pub struct ShutdownGuard {
    _marker: (),
}

impl ShutdownGuard {
    /// Start listening for signals; the first one received cancels `token`.
    ///
    /// Handlers are installed before this returns. If they cannot be
    /// registered (e.g., in restricted environments), the guard is still
    /// created but signal handling will be disabled.
    pub fn new(token: ShutdownToken) -> Self {
        let signals = Signals::register();
        tokio::spawn(async move {
            if let Some(signal_name) = signals.recv().await {
                info!("Received {}, shutting down", signal_name);
                token.cancel();
            }
        });

        Self { _marker: () }
    }
}

#[cfg(unix)]
struct Signals {
    sigint: Option<tokio::signal::unix::Signal>,
    sigterm: Option<tokio::signal::unix::Signal>,
}

#[cfg(unix)]
impl Signals {
    fn register() -> Self {
        use tokio::signal::unix::{signal, SignalKind};

        // May fail in containers or restricted envs
        let sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!("Failed to register SIGINT handler: {}", e);
                None
            }
        };

        let sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!("Failed to register SIGTERM handler: {}", e);
                None
            }
        };

        Self { sigint, sigterm }
    }

    async fn recv(self) -> Option<&'static str> {
        match (self.sigint, self.sigterm) {
            (Some(mut int), Some(mut term)) => {
                tokio::select! {
                    _ = int.recv() => Some("SIGINT"),
                    _ = term.recv() => Some("SIGTERM"),
                }
            }
            (Some(mut int), None) => {
                int.recv().await;
                Some("SIGINT")
            }
            (None, Some(mut term)) => {
                term.recv().await;
                Some("SIGTERM")
            }
            (None, None) => {
                tracing::warn!("No signal handlers registered - graceful shutdown disabled");
                None
            }
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn register() -> Self {
        Self
    }

    async fn recv(self) -> Option<&'static str> {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some("Ctrl-C"),
            Err(e) => {
                tracing::warn!("Failed to register Ctrl-C handler: {} - graceful shutdown disabled", e);
                None
            }
        }
    }
}

struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A token that can be shared across tasks to check for shutdown.
#[derive(Clone)]
pub struct ShutdownToken {
    inner: Arc<TokenState>,
}

impl ShutdownToken {
    /// Create a new shutdown token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Check if shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Request cancellation on this token and wake every waiter.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            // Registered before the flag check so a concurrent cancel is not missed
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}
