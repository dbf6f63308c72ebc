//! Sift - Sources
//!
//! The record-source boundary: pull-based sources produce opaque byte
//! records in partition order, and checkpointers durably acknowledge them
//! once all derived output is safe.
//!
//! Cloud drivers (Kinesis, PubSub, Kafka) live behind the same two traits;
//! this crate ships the file and in-memory implementations used for local
//! runs and tests.

mod common;
mod file;
mod memory;

pub use common::{MetricsSnapshot, SourceMetrics};
pub use file::{FileCheckpointer, FileSource};
pub use memory::{MemoryCheckpointer, MemorySource};


use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Ordered substream identifier assigned by the source driver
pub type PartitionId = u32;

/// One element pulled from a source
///
/// `offset` doubles as the acknowledgement handle: the runtime hands it
/// back to the checkpointer untouched once every derived event is durable.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Opaque payload bytes
    pub bytes: Bytes,

    /// Partition this record belongs to
    pub partition: PartitionId,

    /// Position within the partition; strictly increasing per partition
    pub offset: u64,
}

/// Source errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("source exhausted")]
    Exhausted,

    #[error("checkpoint failed: {0}")]
    Checkpoint(String),
}

/// Pull-based, cancellable record stream
///
/// Within a partition, records arrive in offset order. Across partitions
/// no ordering is promised. Returning `Ok(None)` means the source is
/// finished (file sources); streaming sources simply pend.
#[async_trait]
pub trait ByteRecordSource: Send {
    async fn next(&mut self) -> Result<Option<Record>, SourceError>;
}

/// Durable acknowledgement of processed records
///
/// Implementations must be idempotent: the runtime may re-checkpoint an
/// already-checkpointed offset after a restart.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn checkpoint(&self, partition: PartitionId, offset: u64) -> Result<(), SourceError>;
}

/// Checkpointer for sources with nothing to acknowledge against (stdout
/// demos, replays)
pub struct NoopCheckpointer;

#[async_trait]
impl Checkpointer for NoopCheckpointer {
    async fn checkpoint(&self, _partition: PartitionId, _offset: u64) -> Result<(), SourceError> {
        Ok(())
    }
}
