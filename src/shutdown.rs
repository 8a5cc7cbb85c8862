//! Cancellation coordination utilities.
//!
//! Provides a lightweight [`ShutdownCoordinator`] shared by the Ctrl+C
//! handler and by runs that stop themselves (rate-limit boundary, fatal sink
//! error). Once requested, no new tasks are dispatched; requests already in
//! flight are allowed to finish and accumulated results are flushed.

use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared handle to a shutdown coordinator.
pub type SharedShutdown = Arc<ShutdownCoordinator>;

static GLOBAL_SHUTDOWN: OnceCell<SharedShutdown> = OnceCell::new();

/// Register a global shutdown handle so subsystems can discover it lazily.
pub fn set_global_shutdown(handle: SharedShutdown) {
    let _ = GLOBAL_SHUTDOWN.set(handle);
}

/// Retrieve the registered global shutdown handle, if available.
pub fn get_global_shutdown() -> Option<SharedShutdown> {
    GLOBAL_SHUTDOWN.get().cloned()
}

/// Why a run was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// User interrupt (Ctrl+C)
    Interrupt,
    /// Rate-limit boundary observed (abort-on-429 runs)
    RateLimited,
    /// Sink failed and the run cannot continue
    SinkFailure,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupt => write!(f, "interrupted"),
            ShutdownReason::RateLimited => write!(f, "rate limit boundary reached"),
            ShutdownReason::SinkFailure => write!(f, "sink failure"),
        }
    }
}

/// Coordinates cooperative cancellation across async tasks.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    is_shutdown: AtomicBool,
    reason: OnceCell<ShutdownReason>,
    notify: Notify,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new shared coordinator wrapped in [`Arc`].
    pub fn shared() -> SharedShutdown {
        Arc::new(Self::new())
    }

    /// Request shutdown on user interrupt.
    pub fn request_shutdown(&self) {
        self.request(ShutdownReason::Interrupt);
    }

    /// Request shutdown. The first reason wins; waiters are notified exactly once.
    pub fn request(&self, reason: ShutdownReason) {
        let _ = self.reason.set(reason);
        if !self.is_shutdown.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    /// Reason given by the first request, if any.
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().copied()
    }

    /// Wait until shutdown is requested. Returns immediately if already set.
    pub async fn wait_for_shutdown(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // register before checking the flag so a concurrent request is not missed
        notified.as_mut().enable();
        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }
}
