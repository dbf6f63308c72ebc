//! In-memory source and checkpointer
//!
//! Test doubles with real semantics: multi-partition record queues and a
//! checkpointer that records commit order so ordering invariants can be
//! asserted.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::{ByteRecordSource, Checkpointer, PartitionId, Record, SourceError};

/// Finite in-memory source
pub struct MemorySource {
    records: VecDeque<Record>,
}

impl MemorySource {
    /// Source over pre-built records
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: records.into(),
        }
    }

    /// Source over raw payloads, all on one partition, offsets 0..n
    pub fn single_partition(payloads: Vec<Vec<u8>>) -> Self {
        let records = payloads
            .into_iter()
            .enumerate()
            .map(|(i, bytes)| Record {
                bytes: Bytes::from(bytes),
                partition: 0,
                offset: i as u64,
            })
            .collect();
        Self::new(records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ByteRecordSource for MemorySource {
    async fn next(&mut self) -> Result<Option<Record>, SourceError> {
        Ok(self.records.pop_front())
    }
}

/// Checkpointer recording every commit in arrival order
#[derive(Default)]
pub struct MemoryCheckpointer {
    commits: Mutex<Vec<(PartitionId, u64)>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All commits in the order they happened
    pub fn commits(&self) -> Vec<(PartitionId, u64)> {
        self.commits.lock().clone()
    }

    /// Commits for one partition, in order
    pub fn commits_for(&self, partition: PartitionId) -> Vec<u64> {
        self.commits
            .lock()
            .iter()
            .filter(|(p, _)| *p == partition)
            .map(|(_, o)| *o)
            .collect()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn checkpoint(&self, partition: PartitionId, offset: u64) -> Result<(), SourceError> {
        self.commits.lock().push((partition, offset));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_source_drains_in_order() {
        let mut source = MemorySource::single_partition(vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(source.len(), 2);

        let first = source.next().await.unwrap().unwrap();
        assert_eq!(first.offset, 0);
        assert_eq!(&first.bytes[..], b"a");

        let second = source.next().await.unwrap().unwrap();
        assert_eq!(second.offset, 1);

        assert!(source.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_checkpointer_records_commit_order() {
        let cp = MemoryCheckpointer::new();
        cp.checkpoint(1, 0).await.unwrap();
        cp.checkpoint(0, 0).await.unwrap();
        cp.checkpoint(1, 1).await.unwrap();

        assert_eq!(cp.commits(), vec![(1, 0), (0, 0), (1, 1)]);
        assert_eq!(cp.commits_for(1), vec![0, 1]);
    }
}
