//! Runtime
//!
//! Owns the reader, the worker pool and the sink boundary. Pulls records
//! on demand into a bounded work queue, runs each derived event through
//! the pipeline, awaits every sink ack, then hands the record to the
//! commit sequencer.
//!
//! # Shutdown
//!
//! Cancelling the token stops the reader; workers drain whatever is
//! already queued, sinks are flushed, and remaining checkpoints are
//! emitted by the sequencer as the last records complete. A terminal sink
//! failure cancels the token itself and surfaces as an error so the
//! process exits non-zero without checkpointing the affected record.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sift_protocol::{BadRowBuilder, Decoder};
use sift_sinks::{AttributedSink, Attributes, SinkError};
use sift_sources::{ByteRecordSource, Record, SourceError};

use crate::metrics::RuntimeMetrics;
use crate::pipeline::{EnrichmentPipeline, EventOutput};
use crate::sequencer::CommitSequencer;

#[cfg(test)]
#[path = "runtime_test.rs"]
mod tests;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Pipeline worker parallelism and work-queue bound
    pub enrich_concurrency: usize,

    /// Maximum concurrent sink writes
    pub sink_concurrency: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            enrich_concurrency: 8,
            sink_concurrency: 8,
        }
    }
}

/// The three output destinations
pub struct SinkSet {
    pub good: Box<dyn AttributedSink>,
    pub pii: Option<Box<dyn AttributedSink>>,
    pub bad: Box<dyn AttributedSink>,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("terminal sink failure: {0}")]
    Sink(SinkError),

    #[error("worker panicked")]
    WorkerPanic,
}

/// The wired runtime
pub struct Runtime {
    config: RuntimeConfig,
    decoder: Arc<Decoder>,
    pipeline: Arc<EnrichmentPipeline>,
    badrow: BadRowBuilder,
    sinks: Arc<SinkSet>,
    sequencer: Arc<CommitSequencer>,
    metrics: Arc<RuntimeMetrics>,
}

/// Everything a worker needs, cheaply cloneable
struct WorkerContext {
    decoder: Arc<Decoder>,
    pipeline: Arc<EnrichmentPipeline>,
    badrow: BadRowBuilder,
    sinks: Arc<SinkSet>,
    sequencer: Arc<CommitSequencer>,
    metrics: Arc<RuntimeMetrics>,
    write_permits: Arc<tokio::sync::Semaphore>,
    cancel: CancellationToken,
    fatal: Arc<parking_lot::Mutex<Option<SinkError>>>,
}

impl Clone for WorkerContext {
    fn clone(&self) -> Self {
        Self {
            decoder: Arc::clone(&self.decoder),
            pipeline: Arc::clone(&self.pipeline),
            badrow: self.badrow.clone(),
            sinks: Arc::clone(&self.sinks),
            sequencer: Arc::clone(&self.sequencer),
            metrics: Arc::clone(&self.metrics),
            write_permits: Arc::clone(&self.write_permits),
            cancel: self.cancel.clone(),
            fatal: Arc::clone(&self.fatal),
        }
    }
}

impl Runtime {
    pub fn new(
        config: RuntimeConfig,
        decoder: Decoder,
        pipeline: EnrichmentPipeline,
        badrow: BadRowBuilder,
        sinks: SinkSet,
        sequencer: CommitSequencer,
        metrics: Arc<RuntimeMetrics>,
    ) -> Self {
        Self {
            config,
            decoder: Arc::new(decoder),
            pipeline: Arc::new(pipeline),
            badrow,
            sinks: Arc::new(sinks),
            sequencer: Arc::new(sequencer),
            metrics,
        }
    }

    /// Run until the source ends or the token is cancelled
    pub async fn run(
        &self,
        mut source: Box<dyn ByteRecordSource>,
        cancel: CancellationToken,
    ) -> Result<(), RuntimeError> {
        let workers = self.config.enrich_concurrency.max(1);
        let (tx, rx) = crossfire::mpmc::bounded_async::<Record>(workers);

        let context = WorkerContext {
            decoder: Arc::clone(&self.decoder),
            pipeline: Arc::clone(&self.pipeline),
            badrow: self.badrow.clone(),
            sinks: Arc::clone(&self.sinks),
            sequencer: Arc::clone(&self.sequencer),
            metrics: Arc::clone(&self.metrics),
            write_permits: Arc::new(tokio::sync::Semaphore::new(
                self.config.sink_concurrency.max(1),
            )),
            cancel: cancel.clone(),
            fatal: Arc::new(parking_lot::Mutex::new(None)),
        };

        tracing::info!(
            enrich_concurrency = workers,
            sink_concurrency = self.config.sink_concurrency,
            "Running Enrich"
        );

        let mut worker_handles: Vec<JoinHandle<()>> = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let rx = rx.clone();
            let context = context.clone();
            worker_handles.push(tokio::spawn(async move {
                tracing::debug!(worker_id, "pipeline worker starting");
                while let Ok(record) = rx.recv().await {
                    process_record(&context, record).await;
                }
                tracing::debug!(worker_id, "pipeline worker stopping");
            }));
        }
        drop(rx);

        // Reader: pull on demand; the bounded queue is the backpressure.
        let read_result: Result<(), RuntimeError> = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("shutdown requested, source reads stopped");
                    break Ok(());
                }
                next = source.next() => match next {
                    Ok(Some(record)) => {
                        RuntimeMetrics::incr(&self.metrics.records_received);
                        self.sequencer.expect(record.partition, record.offset).await;
                        if tx.send(record).await.is_err() {
                            // workers are gone; the fatal slot says why
                            break Ok(());
                        }
                    }
                    Ok(None) => {
                        tracing::info!("source exhausted");
                        break Ok(());
                    }
                    Err(e) => break Err(e.into()),
                }
            }
        };

        // Close the queue and let workers drain in-flight work.
        drop(tx);
        for handle in worker_handles {
            if handle.await.is_err() {
                return Err(RuntimeError::WorkerPanic);
            }
        }

        // Flush sinks; remaining checkpoints were emitted as the last
        // records completed above.
        self.flush_sinks().await?;

        if let Some(sink_error) = context.fatal.lock().take() {
            return Err(RuntimeError::Sink(sink_error));
        }

        read_result
    }

    async fn flush_sinks(&self) -> Result<(), RuntimeError> {
        self.sinks.good.flush().await.map_err(RuntimeError::Sink)?;
        if let Some(ref pii) = self.sinks.pii {
            pii.flush().await.map_err(RuntimeError::Sink)?;
        }
        self.sinks.bad.flush().await.map_err(RuntimeError::Sink)?;
        Ok(())
    }
}

/// Process one record end to end: decode, enrich, write, complete
async fn process_record(context: &WorkerContext, record: Record) {
    // A terminal sink failure poisons the runtime; later records must not
    // be processed and checkpointed past the failed one.
    if context.fatal.lock().is_some() {
        return;
    }

    let outputs = match context.decoder.decode(&record.bytes) {
        Ok(raw_events) => {
            RuntimeMetrics::add(&context.metrics.raw_events, raw_events.len() as u64);
            let mut outputs = Vec::with_capacity(raw_events.len());
            for raw in &raw_events {
                outputs.push(context.pipeline.process(raw).await);
            }
            outputs
        }
        Err(detail) => {
            RuntimeMetrics::incr(&context.metrics.bad);
            let row = context.badrow.from_record(&detail, &record.bytes);
            vec![EventOutput::Bad(Bytes::from(row.to_bytes()))]
        }
    };

    // All sink writes for this record must ack before it may checkpoint.
    for output in outputs {
        let result = write_output(context, output).await;
        if let Err(e) = result {
            tracing::error!(error = %e, "terminal sink failure, stopping runtime");
            *context.fatal.lock() = Some(e);
            context.cancel.cancel();
            return; // record NOT completed, NOT checkpointed
        }
    }

    if let Err(e) = context
        .sequencer
        .complete(record.partition, record.offset)
        .await
    {
        tracing::error!(error = %e, "checkpoint failed, stopping runtime");
        *context.fatal.lock() = Some(SinkError::write(e.to_string()));
        context.cancel.cancel();
    }
}

/// Write one event's output(s), bounded by the sink permit pool
async fn write_output(context: &WorkerContext, output: EventOutput) -> Result<(), SinkError> {
    match output {
        EventOutput::Good {
            bytes,
            attributes,
            pii,
        } => {
            {
                // the semaphore is never closed; a permit always arrives
                let _permit = context.write_permits.acquire().await.ok();
                context.sinks.good.write(bytes, &attributes).await?;
            }
            if let (Some(twin), Some(pii_sink)) = (pii, context.sinks.pii.as_ref()) {
                let _permit = context.write_permits.acquire().await.ok();
                pii_sink.write(twin, &attributes).await?;
            }
            Ok(())
        }
        EventOutput::Bad(bytes) => {
            let _permit = context.write_permits.acquire().await.ok();
            context.sinks.bad.write(bytes, &Attributes::new()).await
        }
    }
}
