//! Runtime metrics
//!
//! Lock-free counters recorded on the hot path and a reporter task that
//! logs a unified snapshot on an interval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Counters across the whole runtime
#[derive(Debug, Default)]
pub struct RuntimeMetrics {
    /// Records pulled from the source
    pub records_received: AtomicU64,

    /// Raw events decoded out of records
    pub raw_events: AtomicU64,

    /// Events emitted to the good sink
    pub good: AtomicU64,

    /// PII twins emitted
    pub pii: AtomicU64,

    /// Bad rows emitted (record- and event-level)
    pub bad: AtomicU64,

    /// Events accepted despite validation failures (accept_invalid)
    pub invalid_accepted: AtomicU64,

    /// Schema resolution failures after retries
    pub resolution_errors: AtomicU64,

    /// Individual enrichment failures
    pub enrichment_failures: AtomicU64,

    /// Records checkpointed
    pub checkpoints: AtomicU64,
}

impl RuntimeMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_received: self.records_received.load(Ordering::Relaxed),
            raw_events: self.raw_events.load(Ordering::Relaxed),
            good: self.good.load(Ordering::Relaxed),
            pii: self.pii.load(Ordering::Relaxed),
            bad: self.bad.load(Ordering::Relaxed),
            invalid_accepted: self.invalid_accepted.load(Ordering::Relaxed),
            resolution_errors: self.resolution_errors.load(Ordering::Relaxed),
            enrichment_failures: self.enrichment_failures.load(Ordering::Relaxed),
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of runtime metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub records_received: u64,
    pub raw_events: u64,
    pub good: u64,
    pub pii: u64,
    pub bad: u64,
    pub invalid_accepted: u64,
    pub resolution_errors: u64,
    pub enrichment_failures: u64,
    pub checkpoints: u64,
}

/// Periodic metrics logger
pub struct MetricsReporter {
    metrics: Arc<RuntimeMetrics>,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<RuntimeMetrics>, interval: Duration) -> Self {
        Self { metrics, interval }
    }

    /// Log a snapshot per interval until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await; // immediate first tick carries no data

        let mut last = self.metrics.snapshot();
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = self.metrics.snapshot();
                    if now != last {
                        tracing::info!(
                            records = now.records_received,
                            raw_events = now.raw_events,
                            good = now.good,
                            pii = now.pii,
                            bad = now.bad,
                            checkpoints = now.checkpoints,
                            enrichment_failures = now.enrichment_failures,
                            resolution_errors = now.resolution_errors,
                            "pipeline metrics"
                        );
                        last = now;
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    }
}
