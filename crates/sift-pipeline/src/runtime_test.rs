//! Runtime tests
//!
//! End-to-end over in-memory sources and sinks: counts, checkpoint
//! ordering, zero-event payloads, multi-event payloads, terminal sink
//! failure.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use sift_assets::{InFlightTracker, PauseGate};
use sift_enrich::{Registry, RegistryCell};
use sift_protocol::{BadRowBuilder, CollectorPayload, Decoder, DecoderConfig};
use sift_schema::{SchemaValidator, StaticRegistry, ValidatorConfig};
use sift_sinks::{MemorySink, RetryPolicy, RetryingSink};
use sift_sources::{MemoryCheckpointer, MemorySource, Record};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::metrics::RuntimeMetrics;
use crate::pipeline::{EnrichmentPipeline, PipelineConfig};
use crate::sequencer::CommitSequencer;

fn valid_payload() -> Vec<u8> {
    CollectorPayload {
        collector: Some("sift-collector".to_string()),
        timestamp: Some(1_700_000_000_000),
        querystring: Some("e=pv&aid=shop".to_string()),
        ..CollectorPayload::default()
    }
    .to_bytes()
}

fn zero_event_payload() -> Vec<u8> {
    CollectorPayload {
        collector: Some("sift-collector".to_string()),
        timestamp: Some(1_700_000_000_000),
        ..CollectorPayload::default()
    }
    .to_bytes()
}

fn multi_event_payload(n: usize) -> Vec<u8> {
    let data: Vec<serde_json::Value> = (0..n)
        .map(|i| serde_json::json!({"e": "pv", "aid": format!("app-{}", i)}))
        .collect();
    CollectorPayload {
        collector: Some("sift-collector".to_string()),
        timestamp: Some(1_700_000_000_000),
        content_type: Some("application/json".to_string()),
        body: Some(
            serde_json::json!({"schema": sift_protocol::PAYLOAD_DATA_SCHEMA, "data": data})
                .to_string(),
        ),
        ..CollectorPayload::default()
    }
    .to_bytes()
}

struct Harness {
    runtime: Runtime,
    good: Arc<MemorySink>,
    pii: Arc<MemorySink>,
    bad: Arc<MemorySink>,
    checkpointer: Arc<MemoryCheckpointer>,
    metrics: Arc<RuntimeMetrics>,
}

fn harness() -> Harness {
    let good = MemorySink::new();
    let pii = MemorySink::new();
    let bad = MemorySink::new();
    let checkpointer = MemoryCheckpointer::new();
    let metrics = RuntimeMetrics::new();

    let registry = Arc::new(RegistryCell::new(Arc::new(Registry::empty())));
    let gate = Arc::new(PauseGate::new());
    gate.open();

    let validator = SchemaValidator::new(
        Arc::new(StaticRegistry::new()),
        ValidatorConfig {
            initial_backoff: Duration::from_millis(1),
            ..ValidatorConfig::default()
        },
    );

    let pipeline = EnrichmentPipeline::new(
        registry,
        gate,
        Arc::new(InFlightTracker::new()),
        validator,
        BadRowBuilder::default(),
        Arc::clone(&metrics),
        PipelineConfig::default(),
    );

    let runtime = Runtime::new(
        RuntimeConfig {
            enrich_concurrency: 4,
            sink_concurrency: 4,
        },
        Decoder::new(DecoderConfig::default()),
        pipeline,
        BadRowBuilder::default(),
        SinkSet {
            good: Box::new(good.clone()),
            pii: Some(Box::new(pii.clone())),
            bad: Box::new(bad.clone()),
        },
        CommitSequencer::new(checkpointer.clone(), Arc::clone(&metrics)),
        Arc::clone(&metrics),
    );

    Harness {
        runtime,
        good,
        pii,
        bad,
        checkpointer,
        metrics,
    }
}

#[tokio::test]
async fn counts_scenario_good_and_bad_tally() {
    let h = harness();

    let mut payloads: Vec<Vec<u8>> = Vec::new();
    for _ in 0..100 {
        payloads.push(valid_payload());
    }
    for _ in 0..10 {
        payloads.push(b"\xde\xad\xbe\xef".to_vec());
    }

    let source = MemorySource::single_partition(payloads);
    h.runtime
        .run(Box::new(source), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(h.good.len(), 100);
    assert_eq!(h.bad.len(), 10);
    assert_eq!(h.pii.len(), 0);

    // every record checkpointed exactly once, in order
    assert_eq!(
        h.checkpointer.commits_for(0),
        (0..110).collect::<Vec<u64>>()
    );
    assert_eq!(h.metrics.snapshot().checkpoints, 110);
}

#[tokio::test]
async fn bad_rows_are_adapter_failures_with_replayable_payload() {
    use base64::Engine;

    let h = harness();
    let source = MemorySource::single_partition(vec![b"garbage!".to_vec()]);
    h.runtime
        .run(Box::new(source), CancellationToken::new())
        .await
        .unwrap();

    let rows = h.bad.lines();
    assert_eq!(rows.len(), 1);
    let row: serde_json::Value = serde_json::from_str(&rows[0]).unwrap();
    assert_eq!(row["schema"], sift_protocol::ADAPTER_FAILURES_SCHEMA);

    let payload = base64::engine::general_purpose::STANDARD
        .decode(row["data"]["payload"].as_str().unwrap())
        .unwrap();
    assert_eq!(payload, b"garbage!");
}

#[tokio::test]
async fn zero_event_payload_still_checkpoints() {
    let h = harness();
    let source = MemorySource::single_partition(vec![zero_event_payload()]);
    h.runtime
        .run(Box::new(source), CancellationToken::new())
        .await
        .unwrap();

    assert!(h.good.is_empty());
    assert!(h.bad.is_empty());
    assert_eq!(h.checkpointer.commits_for(0), vec![0]);
}

#[tokio::test]
async fn multi_event_payload_fans_out_before_one_checkpoint() {
    let h = harness();
    let source = MemorySource::single_partition(vec![multi_event_payload(3)]);
    h.runtime
        .run(Box::new(source), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(h.good.len(), 3);
    assert_eq!(h.checkpointer.commits_for(0), vec![0]);
    assert_eq!(h.metrics.snapshot().raw_events, 3);
}

#[tokio::test]
async fn oversized_record_becomes_size_violation() {
    let good = MemorySink::new();
    let bad = MemorySink::new();
    let checkpointer = MemoryCheckpointer::new();
    let metrics = RuntimeMetrics::new();

    let registry = Arc::new(RegistryCell::new(Arc::new(Registry::empty())));
    let gate = Arc::new(PauseGate::new());
    gate.open();

    let pipeline = EnrichmentPipeline::new(
        registry,
        gate,
        Arc::new(InFlightTracker::new()),
        SchemaValidator::new(Arc::new(StaticRegistry::new()), ValidatorConfig::default()),
        BadRowBuilder::default(),
        Arc::clone(&metrics),
        PipelineConfig::default(),
    );

    let runtime = Runtime::new(
        RuntimeConfig::default(),
        Decoder::new(DecoderConfig {
            max_record_size: 64,
            try_base64_decoding: false,
        }),
        pipeline,
        BadRowBuilder::default(),
        SinkSet {
            good: Box::new(good.clone()),
            pii: None,
            bad: Box::new(bad.clone()),
        },
        CommitSequencer::new(checkpointer.clone(), Arc::clone(&metrics)),
        metrics,
    );

    let source = MemorySource::single_partition(vec![vec![0u8; 65]]);
    runtime
        .run(Box::new(source), CancellationToken::new())
        .await
        .unwrap();

    let rows = bad.lines();
    assert_eq!(rows.len(), 1);
    let row: serde_json::Value = serde_json::from_str(&rows[0]).unwrap();
    assert_eq!(row["schema"], sift_protocol::SIZE_VIOLATION_SCHEMA);
    assert_eq!(checkpointer.commits_for(0), vec![0]);
}

#[tokio::test]
async fn partitions_checkpoint_independently_and_in_order() {
    let h = harness();

    let mut records = Vec::new();
    for partition in 0..3u32 {
        for offset in 0..20u64 {
            records.push(Record {
                bytes: Bytes::from(valid_payload()),
                partition,
                offset,
            });
        }
    }

    let source = MemorySource::new(records);
    h.runtime
        .run(Box::new(source), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(h.good.len(), 60);
    for partition in 0..3u32 {
        assert_eq!(
            h.checkpointer.commits_for(partition),
            (0..20).collect::<Vec<u64>>()
        );
    }
}

#[tokio::test]
async fn terminal_sink_failure_stops_without_checkpointing() {
    let good = MemorySink::new();
    good.fail_next(u32::MAX);
    let bad = MemorySink::new();
    let checkpointer = MemoryCheckpointer::new();
    let metrics = RuntimeMetrics::new();

    let registry = Arc::new(RegistryCell::new(Arc::new(Registry::empty())));
    let gate = Arc::new(PauseGate::new());
    gate.open();

    let pipeline = EnrichmentPipeline::new(
        registry,
        gate,
        Arc::new(InFlightTracker::new()),
        SchemaValidator::new(Arc::new(StaticRegistry::new()), ValidatorConfig::default()),
        BadRowBuilder::default(),
        Arc::clone(&metrics),
        PipelineConfig::default(),
    );

    // a fast retry policy so the test exhausts quickly
    let retrying = RetryingSink::new(
        good.clone(),
        RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        },
    );

    let runtime = Runtime::new(
        RuntimeConfig {
            enrich_concurrency: 1,
            sink_concurrency: 1,
        },
        Decoder::new(DecoderConfig::default()),
        pipeline,
        BadRowBuilder::default(),
        SinkSet {
            good: Box::new(retrying),
            pii: None,
            bad: Box::new(bad.clone()),
        },
        CommitSequencer::new(checkpointer.clone(), Arc::clone(&metrics)),
        metrics,
    );

    let source =
        MemorySource::single_partition(vec![valid_payload(), valid_payload(), valid_payload()]);
    let result = runtime
        .run(Box::new(source), CancellationToken::new())
        .await;

    assert!(matches!(result, Err(RuntimeError::Sink(_))));
    // the failed record was never checkpointed
    assert!(checkpointer.commits_for(0).is_empty());
}

#[tokio::test]
async fn cancellation_stops_reads_but_drains_in_flight() {
    let h = harness();
    let cancel = CancellationToken::new();
    cancel.cancel(); // cancelled before the first read

    let source = MemorySource::single_partition(vec![valid_payload()]);
    h.runtime.run(Box::new(source), cancel).await.unwrap();

    // nothing was pulled after cancellation
    assert!(h.good.is_empty());
    assert!(h.checkpointer.commits().is_empty());
}
