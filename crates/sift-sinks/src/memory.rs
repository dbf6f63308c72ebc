//! In-memory sink
//!
//! Test double capturing every write, with optional failure injection for
//! exercising the retry wrapper and the runtime's terminal-sink-error
//! path.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::common::{Attributes, SinkError};
use crate::AttributedSink;

/// Captures writes for assertions
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<(Bytes, Attributes)>>,
    fail_next: AtomicU32,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `n` writes fail
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Number of captured records
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// All captured records
    pub fn records(&self) -> Vec<(Bytes, Attributes)> {
        self.records.lock().clone()
    }

    /// Captured payloads as strings
    pub fn lines(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .map(|(b, _)| String::from_utf8_lossy(b).into_owned())
            .collect()
    }
}

#[async_trait]
impl AttributedSink for Arc<MemorySink> {
    async fn write(&self, bytes: Bytes, attributes: &Attributes) -> Result<(), SinkError> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(SinkError::write("injected failure"));
        }
        self.records.lock().push((bytes, attributes.clone()));
        Ok(())
    }
}
