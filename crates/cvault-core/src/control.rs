//! Run control: a shared cancellation token.
//!
//! The CLI wires Ctrl-C to [`RunControl::cancel`]. The producer stops
//! enqueueing questions, in-flight fetches finish (or time out) and the
//! ledger is flushed before the engine returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Cloneable handle; all clones share one flag.
#[derive(Clone, Default)]
pub struct RunControl {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            tracing::warn!("cancellation requested; finishing in-flight questions");
        }
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`RunControl::cancel`] has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn clones_share_the_flag() {
        let a = RunControl::new();
        let b = a.clone();
        assert!(!a.is_cancelled());
        b.cancel();
        assert!(a.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_wakes_waiters() {
        let ctl = RunControl::new();
        let waiter = {
            let ctl = ctl.clone();
            tokio::spawn(async move { ctl.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctl.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
        // Already cancelled: returns immediately.
        ctl.cancelled().await;
    }
}
