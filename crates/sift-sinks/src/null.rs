//! Null sink
//!
//! Accepts and discards everything, counting as it goes. Useful for
//! benchmarking the pipeline without sink I/O and as the default pii sink
//! when no twin destination is configured.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::common::{Attributes, SinkError, SinkMetrics};
use crate::AttributedSink;

/// Counts and discards
pub struct NullSink {
    metrics: Arc<SinkMetrics>,
}

impl NullSink {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(SinkMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<SinkMetrics> {
        Arc::clone(&self.metrics)
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttributedSink for NullSink {
    async fn write(&self, bytes: Bytes, _attributes: &Attributes) -> Result<(), SinkError> {
        self.metrics.record_written(bytes.len() as u64);
        Ok(())
    }
}
