//! Sift - Pipeline
//!
//! The enrichment runtime: wires source → decode → enrich → validate →
//! sinks, and owns concurrency, backpressure, checkpoint ordering and
//! shutdown.
//!
//! # Architecture
//!
//! ```text
//! [Source] ──→ reader ──→ bounded work queue ──→ N workers
//!                 │                                  │ per record:
//!            sequencer.expect                        │  decode → events
//!                                                    │  per event:
//!                                                    │   gate → snapshot →
//!                                                    │   enrich → validate
//!                                                    ↓
//!                                      good / pii / bad sink writes
//!                                                    │ (all acked)
//!                                            sequencer.complete
//!                                                    ↓
//!                                        checkpoint, in partition order
//! ```
//!
//! # Key Design
//!
//! - **Structural backpressure**: the work queue is bounded by the enrich
//!   concurrency; the reader stops pulling when workers fall behind
//! - **At-least-once**: a record is checkpointed only after every sink ack
//!   for its derived events; terminal sink failure stops the runtime
//!   without checkpointing
//! - **Per-partition order**: the commit sequencer releases checkpoints in
//!   source order even when records complete out of order

mod metrics;
mod pipeline;
mod runtime;
mod sequencer;

pub use metrics::{MetricsReporter, MetricsSnapshot, RuntimeMetrics};
pub use pipeline::{EnrichmentPipeline, EventOutput, PipelineConfig, PII_TRANSFORMATION_SCHEMA};
pub use runtime::{Runtime, RuntimeConfig, RuntimeError, SinkSet};
pub use sequencer::CommitSequencer;
