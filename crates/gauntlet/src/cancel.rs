//! Cooperative cancellation shared between a batch owner and its workers

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A one-way cancellation flag
///
/// Cloning yields a handle to the same flag. Workers poll
/// [`is_cancelled`](Self::is_cancelled) before starting new work and can
/// await [`cancelled`](Self::cancelled) to race in-flight work against a stop.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<Inner>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every waiter
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once the flag has been raised
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent cancel() cannot be missed
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Await cancellation of an optional flag; never resolves for `None`
pub(crate) async fn cancelled(flag: Option<&CancelFlag>) {
    match flag {
        Some(flag) => flag.cancelled().await,
        None => std::future::pending().await,
    }
}
