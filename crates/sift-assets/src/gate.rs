//! Pause gate and in-flight tracking
//!
//! The gate is a two-state latch at the pipeline entry: readers suspend
//! while it is closed and are woken together when it opens. The in-flight
//! tracker counts events between gate and classification so the asset
//! manager can wait for the pipeline to drain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};

#[cfg(test)]
#[path = "gate_test.rs"]
mod tests;

/// Two-state latch coordinating asset swaps with pipeline entry
///
/// Starts closed; the startup sequence opens it once initial assets are in
/// place. One writer (the asset manager), many waiting readers.
pub struct PauseGate {
    open: watch::Sender<bool>,
}

impl PauseGate {
    /// A new gate, initially closed
    pub fn new() -> Self {
        let (open, _) = watch::channel(false);
        Self { open }
    }

    /// Whether the gate is currently open
    #[inline]
    pub fn is_open(&self) -> bool {
        *self.open.borrow()
    }

    /// Open the gate, waking every waiting reader
    pub fn open(&self) {
        self.open.send_replace(true);
    }

    /// Close the gate; subsequent `wait_open` calls suspend
    pub fn close(&self) {
        self.open.send_replace(false);
    }

    /// Suspend until the gate is open
    ///
    /// Returns immediately when already open.
    pub async fn wait_open(&self) {
        let mut rx = self.open.subscribe();
        // The sender lives in self, so the channel cannot close under us.
        let _ = rx.wait_for(|open| *open).await;
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter of events currently inside the pipeline
///
/// Workers hold a guard from gate passage to classification; the asset
/// manager waits for the count to reach zero before touching files.
#[derive(Default)]
pub struct InFlightTracker {
    count: AtomicU64,
    idle: Notify,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current in-flight count
    #[inline]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Enter the pipeline; the returned guard marks the exit
    pub fn enter(tracker: &Arc<Self>) -> InFlightGuard {
        tracker.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            tracker: Arc::clone(tracker),
        }
    }

    /// Wait until no events are in flight
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Wait for idle, bounded
    ///
    /// Returns `false` when the pipeline did not drain within the timeout.
    pub async fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_idle()).await.is_ok()
    }
}

/// Guard decrementing the in-flight count on drop
pub struct InFlightGuard {
    tracker: Arc<InFlightTracker>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.tracker.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}
