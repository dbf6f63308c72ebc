//! Common sink types and metrics

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

/// Routing attributes attached to good/pii output records
pub type Attributes = HashMap<String, String>;

/// Common sink errors
#[derive(Debug, Error)]
pub enum SinkError {
    /// Sink initialization failed
    #[error("failed to initialize sink: {0}")]
    Init(String),

    /// Failed to write data
    #[error("write failed: {0}")]
    Write(String),

    /// Failed to flush data
    #[error("flush failed: {0}")]
    Flush(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Retries exhausted; the runtime must not checkpoint past this
    #[error("sink gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl SinkError {
    pub fn init(msg: impl Into<String>) -> Self {
        Self::Init(msg.into())
    }

    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }
}

/// Metrics shared by all sink types
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Total records successfully written
    pub records_written: AtomicU64,

    /// Total bytes written
    pub bytes_written: AtomicU64,

    /// Write errors encountered (including retried ones)
    pub write_errors: AtomicU64,

    /// Flush operations performed
    pub flush_count: AtomicU64,
}

impl SinkMetrics {
    pub const fn new() -> Self {
        Self {
            records_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            flush_count: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_written(&self, bytes: u64) {
        self.records_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn flush(&self) {
        self.flush_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_written: self.records_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            flush_count: self.flush_count.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of sink metrics
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub records_written: u64,
    pub bytes_written: u64,
    pub write_errors: u64,
    pub flush_count: u64,
}
