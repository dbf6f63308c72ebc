//! Sift - Sinks
//!
//! The attributed-sink boundary: enriched output leaves the pipeline as
//! `(bytes, attributes)` pairs; bad rows leave as plain bytes with no
//! attributes. Cloud drivers (Kinesis, PubSub, Kafka) live behind the same
//! trait; this crate ships stdout, file, null and in-memory sinks plus the
//! retry wrapper every sink runs under.

mod common;
mod file;
mod memory;
mod null;
mod retry;
mod stdout;

pub use common::{Attributes, MetricsSnapshot, SinkError, SinkMetrics};
pub use file::FileSink;
pub use memory::MemorySink;
pub use null::NullSink;
pub use retry::{RetryPolicy, RetryingSink};
pub use stdout::StdoutSink;

use async_trait::async_trait;
use bytes::Bytes;

/// Destination for enriched output
///
/// Writes are independent and must be safe to issue concurrently; batching
/// is the sink's own concern. A returned error after the wrapper's retries
/// is terminal: the runtime stops rather than lose the record.
#[async_trait]
pub trait AttributedSink: Send + Sync {
    async fn write(&self, bytes: Bytes, attributes: &Attributes) -> Result<(), SinkError>;

    /// Flush buffered output; called once during shutdown
    async fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
