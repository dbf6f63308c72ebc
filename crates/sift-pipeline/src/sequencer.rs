//! Per-partition commit sequencer
//!
//! Records complete out of order (enrichment latency varies per event),
//! but a partition's checkpoints must be released in source order. The
//! sequencer enrolls every record at read time and releases completions
//! strictly front-to-back.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use sift_sources::{Checkpointer, PartitionId, SourceError};

use crate::metrics::RuntimeMetrics;

#[cfg(test)]
#[path = "sequencer_test.rs"]
mod tests;

#[derive(Default)]
struct PartitionState {
    /// Offsets enrolled but not yet released, in source order
    pending: VecDeque<u64>,

    /// Offsets whose sink writes completed, awaiting release
    completed: BTreeSet<u64>,
}

/// Orders checkpoint release per partition
pub struct CommitSequencer {
    checkpointer: Arc<dyn Checkpointer>,
    metrics: Arc<RuntimeMetrics>,
    // a tokio mutex: it is held across checkpoint awaits, which is what
    // guarantees release order across concurrently completing workers
    partitions: tokio::sync::Mutex<HashMap<PartitionId, PartitionState>>,
}

impl CommitSequencer {
    pub fn new(checkpointer: Arc<dyn Checkpointer>, metrics: Arc<RuntimeMetrics>) -> Self {
        Self {
            checkpointer,
            metrics,
            partitions: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Enroll a record at read time, before any work is queued for it
    pub async fn expect(&self, partition: PartitionId, offset: u64) {
        let mut partitions = self.partitions.lock().await;
        partitions
            .entry(partition)
            .or_default()
            .pending
            .push_back(offset);
    }

    /// Mark a record complete and release whatever became checkpointable
    ///
    /// A completed record behind an incomplete one waits; completing the
    /// head releases the whole contiguous run behind it.
    pub async fn complete(&self, partition: PartitionId, offset: u64) -> Result<(), SourceError> {
        let mut partitions = self.partitions.lock().await;
        let Some(state) = partitions.get_mut(&partition) else {
            return Ok(());
        };

        state.completed.insert(offset);

        while let Some(&head) = state.pending.front() {
            if !state.completed.remove(&head) {
                break;
            }
            state.pending.pop_front();
            self.checkpointer.checkpoint(partition, head).await?;
            RuntimeMetrics::incr(&self.metrics.checkpoints);
        }

        Ok(())
    }

    /// Offsets still awaiting release, across all partitions
    pub async fn pending(&self) -> usize {
        let partitions = self.partitions.lock().await;
        partitions.values().map(|s| s.pending.len()).sum()
    }
}
