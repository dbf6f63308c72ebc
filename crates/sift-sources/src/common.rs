//! Shared source metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics shared by all source types
#[derive(Debug, Default)]
pub struct SourceMetrics {
    /// Total records pulled
    pub records_received: AtomicU64,

    /// Total payload bytes pulled
    pub bytes_received: AtomicU64,

    /// Total checkpoints committed
    pub checkpoints: AtomicU64,

    /// Read or checkpoint errors
    pub errors: AtomicU64,
}

impl SourceMetrics {
    pub const fn new() -> Self {
        Self {
            records_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            checkpoints: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_received(&self, bytes: u64) {
        self.records_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn checkpoint(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_received: self.records_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of source metrics
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub records_received: u64,
    pub bytes_received: u64,
    pub checkpoints: u64,
    pub errors: u64,
}
