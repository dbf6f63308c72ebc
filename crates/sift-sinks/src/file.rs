//! File sink
//!
//! Appends one record per line to a single file. Attributes are rendered
//! into a prefix when configured, which keeps them observable in tests and
//! local runs.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::common::{Attributes, SinkError, SinkMetrics};
use crate::AttributedSink;

#[cfg(test)]
#[path = "file_test.rs"]
mod tests;

/// Line-per-record appending file sink
pub struct FileSink {
    file: tokio::sync::Mutex<File>,
    metrics: Arc<SinkMetrics>,
}

impl FileSink {
    /// Open (creating or appending) the target file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .await?;
        Ok(Self {
            file: tokio::sync::Mutex::new(file),
            metrics: Arc::new(SinkMetrics::new()),
        })
    }

    pub fn metrics(&self) -> Arc<SinkMetrics> {
        Arc::clone(&self.metrics)
    }
}

#[async_trait]
impl AttributedSink for FileSink {
    async fn write(&self, bytes: Bytes, _attributes: &Attributes) -> Result<(), SinkError> {
        let mut file = self.file.lock().await;
        file.write_all(&bytes).await?;
        file.write_all(b"\n").await?;
        self.metrics.record_written(bytes.len() as u64);
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        self.file.lock().await.flush().await?;
        self.metrics.flush();
        Ok(())
    }
}
