//! Stdout sink
//!
//! Writes one record per line. The default good/bad destination for local
//! runs; attributes are dropped, stdout has nowhere to put them.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use crate::common::{Attributes, SinkError, SinkMetrics};
use crate::AttributedSink;

/// Line-per-record stdout sink
pub struct StdoutSink {
    // tokio's stdout handle buffers internally; serialise writers so
    // concurrent records do not interleave mid-line
    out: tokio::sync::Mutex<tokio::io::Stdout>,
    metrics: Arc<SinkMetrics>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self {
            out: tokio::sync::Mutex::new(tokio::io::stdout()),
            metrics: Arc::new(SinkMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<SinkMetrics> {
        Arc::clone(&self.metrics)
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttributedSink for StdoutSink {
    async fn write(&self, bytes: Bytes, _attributes: &Attributes) -> Result<(), SinkError> {
        let mut out = self.out.lock().await;
        out.write_all(&bytes).await?;
        out.write_all(b"\n").await?;
        self.metrics.record_written(bytes.len() as u64);
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        self.out.lock().await.flush().await?;
        self.metrics.flush();
        Ok(())
    }
}
