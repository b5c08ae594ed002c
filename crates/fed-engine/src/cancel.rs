// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cooperative shutdown signalling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A cloneable token that signals engine shutdown.
///
/// All clones share the same state; triggering one makes every clone
/// observe `is_triggered() == true`. Loops observe the signal at their
/// suspension points and drain cooperatively; no task is forcibly killed.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<SignalInner>,
}

#[derive(Default)]
struct SignalInner {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    /// Create a signal that has not been triggered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger shutdown. Idempotent.
    pub fn trigger(&self) {
        self.inner.triggered.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Returns `true` once [`trigger`](Self::trigger) has been called.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Completes when the signal is triggered; immediately if it already
    /// was.
    pub async fn triggered(&self) {
        if self.is_triggered() {
            return;
        }
        loop {
            self.inner.notify.notified().await;
            if self.is_triggered() {
                return;
            }
        }
    }
}

impl std::fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_untriggered_and_clones_share_state() {
        let a = ShutdownSignal::new();
        let b = a.clone();
        assert!(!b.is_triggered());
        a.trigger();
        assert!(b.is_triggered());
    }

    #[tokio::test]
    async fn triggered_future_resolves() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();
        let task = tokio::spawn(async move { waiter.triggered().await });
        signal.trigger();
        task.await.unwrap();
        // Already-triggered signals resolve immediately.
        signal.triggered().await;
    }
}
