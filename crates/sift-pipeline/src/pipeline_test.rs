//! Per-event pipeline tests
//!
//! Exercised with stub enrichments so the orchestration contracts (order,
//! failure collection, classification precedence, timeouts) are isolated
//! from any real enrichment's behaviour.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use sift_assets::{InFlightTracker, PauseGate};
use sift_enrich::{Enrichment, EnrichmentFailure, Registry, RegistryCell};
use sift_protocol::{BadRowBuilder, EnrichedEvent, RawEvent};
use sift_schema::{SchemaValidator, StaticRegistry, ValidatorConfig};

use super::*;
use crate::metrics::RuntimeMetrics;

/// Stub enrichment attaching one context under the given schema
struct AttachContext {
    name: &'static str,
    schema: &'static str,
}

#[async_trait]
impl Enrichment for AttachContext {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn enrich(
        &self,
        _raw: &RawEvent,
        _event: &mut EnrichedEvent,
    ) -> Result<Vec<Value>, EnrichmentFailure> {
        Ok(vec![json!({"schema": self.schema, "data": {}})])
    }
}

/// Stub enrichment that always fails
struct AlwaysFails;

#[async_trait]
impl Enrichment for AlwaysFails {
    fn name(&self) -> &'static str {
        "always_fails"
    }

    async fn enrich(
        &self,
        _raw: &RawEvent,
        _event: &mut EnrichedEvent,
    ) -> Result<Vec<Value>, EnrichmentFailure> {
        Err(EnrichmentFailure::lookup("always_fails", "boom"))
    }
}

/// Stub enrichment that never returns in time
struct Sleeps;

#[async_trait]
impl Enrichment for Sleeps {
    fn name(&self) -> &'static str {
        "sleeps"
    }

    async fn enrich(
        &self,
        _raw: &RawEvent,
        _event: &mut EnrichedEvent,
    ) -> Result<Vec<Value>, EnrichmentFailure> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

/// Stub enrichment pushing a pii report entry
struct MarksPii;

#[async_trait]
impl Enrichment for MarksPii {
    fn name(&self) -> &'static str {
        "marks_pii"
    }

    async fn enrich(
        &self,
        _raw: &RawEvent,
        event: &mut EnrichedEvent,
    ) -> Result<Vec<Value>, EnrichmentFailure> {
        event.user_id = Some("0123abcd".to_string());
        event.pii.push(sift_protocol::PiiField {
            field_name: "user_id".to_string(),
            modified_value: "0123abcd".to_string(),
        });
        Ok(Vec::new())
    }
}

const CTX_A: &str = "iglu:com.test/ctx_a/jsonschema/1-0-0";
const CTX_B: &str = "iglu:com.test/ctx_b/jsonschema/1-0-0";
const CTX_UNRESOLVABLE: &str = "iglu:com.test/nowhere/jsonschema/1-0-0";

fn validator() -> SchemaValidator {
    let registry = StaticRegistry::new()
        .with_schema(CTX_A, json!({"type": "object"}))
        .with_schema(CTX_B, json!({"type": "object"}));
    SchemaValidator::new(
        Arc::new(registry),
        ValidatorConfig {
            initial_backoff: Duration::from_millis(1),
            ..ValidatorConfig::default()
        },
    )
}

fn pipeline_with(
    enrichments: Vec<Box<dyn Enrichment>>,
    config: PipelineConfig,
) -> EnrichmentPipeline {
    let registry = Arc::new(RegistryCell::new(Arc::new(Registry::new(
        enrichments,
        Vec::new(),
    ))));
    let gate = Arc::new(PauseGate::new());
    gate.open();

    EnrichmentPipeline::new(
        registry,
        gate,
        Arc::new(InFlightTracker::new()),
        validator(),
        BadRowBuilder::default(),
        RuntimeMetrics::new(),
        config,
    )
}

fn raw_page_view() -> RawEvent {
    let mut parameters = HashMap::new();
    for (k, v) in [("e", "pv"), ("aid", "shop"), ("p", "web")] {
        parameters.insert(k.to_string(), v.to_string());
    }
    RawEvent {
        parameters,
        ..RawEvent::default()
    }
}

fn tsv_columns(bytes: &bytes::Bytes) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .split('\t')
        .map(str::to_owned)
        .collect()
}

#[tokio::test]
async fn empty_registry_produces_plain_good_output() {
    let pipeline = pipeline_with(Vec::new(), PipelineConfig::default());

    match pipeline.process(&raw_page_view()).await {
        EventOutput::Good {
            bytes,
            attributes,
            pii,
        } => {
            let columns = tsv_columns(&bytes);
            assert_eq!(columns.len(), 131);
            assert_eq!(columns[0], "shop"); // app_id
            assert_eq!(columns[5], "page_view"); // event
            assert!(!columns[2].is_empty()); // etl_tstamp was set
            assert_eq!(columns[122], ""); // no derived contexts

            assert_eq!(attributes.get("app_id").map(String::as_str), Some("shop"));
            assert!(pii.is_none());
        }
        other => panic!("expected good output, got {:?}", other),
    }
}

#[tokio::test]
async fn contexts_append_in_registry_order() {
    let pipeline = pipeline_with(
        vec![
            Box::new(AttachContext {
                name: "a",
                schema: CTX_A,
            }),
            Box::new(AttachContext {
                name: "b",
                schema: CTX_B,
            }),
        ],
        PipelineConfig::default(),
    );

    match pipeline.process(&raw_page_view()).await {
        EventOutput::Good { bytes, .. } => {
            let columns = tsv_columns(&bytes);
            let contexts: Value = serde_json::from_str(&columns[122]).unwrap();
            let schemas: Vec<&str> = contexts["data"]
                .as_array()
                .unwrap()
                .iter()
                .map(|c| c["schema"].as_str().unwrap())
                .collect();
            assert_eq!(schemas, vec![CTX_A, CTX_B]);
        }
        other => panic!("expected good output, got {:?}", other),
    }
}

#[tokio::test]
async fn enrichment_failure_routes_to_bad_but_does_not_short_circuit() {
    let pipeline = pipeline_with(
        vec![
            Box::new(AlwaysFails),
            Box::new(AttachContext {
                name: "a",
                schema: CTX_A,
            }),
        ],
        PipelineConfig::default(),
    );

    match pipeline.process(&raw_page_view()).await {
        EventOutput::Bad(bytes) => {
            let row: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(row["schema"], sift_protocol::ENRICHMENT_FAILURES_SCHEMA);
            let messages = row["data"]["failure"]["messages"].as_array().unwrap();
            assert_eq!(messages.len(), 1);
            assert!(messages[0].as_str().unwrap().contains("always_fails"));
            // the original parameters ride along for replay
            assert_eq!(row["data"]["payload"]["e"], "pv");
        }
        other => panic!("expected bad output, got {:?}", other),
    }
}

#[tokio::test]
async fn unresolvable_context_schema_routes_to_bad() {
    let pipeline = pipeline_with(
        vec![Box::new(AttachContext {
            name: "x",
            schema: CTX_UNRESOLVABLE,
        })],
        PipelineConfig::default(),
    );

    match pipeline.process(&raw_page_view()).await {
        EventOutput::Bad(bytes) => {
            let row: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(row["schema"], sift_protocol::SCHEMA_VIOLATIONS_SCHEMA);
        }
        other => panic!("expected bad output, got {:?}", other),
    }
}

#[tokio::test]
async fn schema_violations_outrank_enrichment_failures() {
    let pipeline = pipeline_with(
        vec![
            Box::new(AlwaysFails),
            Box::new(AttachContext {
                name: "x",
                schema: CTX_UNRESOLVABLE,
            }),
        ],
        PipelineConfig::default(),
    );

    match pipeline.process(&raw_page_view()).await {
        EventOutput::Bad(bytes) => {
            let row: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(row["schema"], sift_protocol::SCHEMA_VIOLATIONS_SCHEMA);
        }
        other => panic!("expected bad output, got {:?}", other),
    }
}

#[tokio::test]
async fn accept_invalid_keeps_the_event_with_a_diagnostic() {
    let pipeline = pipeline_with(
        vec![Box::new(AttachContext {
            name: "x",
            schema: CTX_UNRESOLVABLE,
        })],
        PipelineConfig {
            accept_invalid: true,
            ..PipelineConfig::default()
        },
    );

    match pipeline.process(&raw_page_view()).await {
        EventOutput::Good { bytes, .. } => {
            let columns = tsv_columns(&bytes);
            let contexts: Value = serde_json::from_str(&columns[122]).unwrap();
            let schemas: Vec<&str> = contexts["data"]
                .as_array()
                .unwrap()
                .iter()
                .map(|c| c["schema"].as_str().unwrap())
                .collect();
            assert!(schemas.contains(&CTX_UNRESOLVABLE));
            assert!(schemas
                .iter()
                .any(|s| s.contains("validation_diagnostic")));
        }
        other => panic!("expected good output, got {:?}", other),
    }
}

#[tokio::test]
async fn overrunning_enrichment_times_out_to_bad() {
    let pipeline = pipeline_with(
        vec![Box::new(Sleeps)],
        PipelineConfig {
            enrichment_timeout: Duration::from_millis(10),
            ..PipelineConfig::default()
        },
    );

    match pipeline.process(&raw_page_view()).await {
        EventOutput::Bad(bytes) => {
            let row: Value = serde_json::from_slice(&bytes).unwrap();
            let messages = row["data"]["failure"]["messages"].as_array().unwrap();
            assert!(messages[0].as_str().unwrap().contains("timed out"));
        }
        other => panic!("expected bad output, got {:?}", other),
    }
}

#[tokio::test]
async fn pii_report_produces_a_twin() {
    let pipeline = pipeline_with(vec![Box::new(MarksPii)], PipelineConfig::default());

    match pipeline.process(&raw_page_view()).await {
        EventOutput::Good { pii, .. } => {
            let twin: Value = serde_json::from_slice(&pii.unwrap()).unwrap();
            assert_eq!(twin["schema"], PII_TRANSFORMATION_SCHEMA);
            assert_eq!(twin["data"]["pii"][0]["field_name"], "user_id");
            assert!(twin["data"]["parentEventId"].is_string());
        }
        other => panic!("expected good output, got {:?}", other),
    }
}

#[tokio::test]
async fn closed_gate_holds_events_at_entry() {
    let registry = Arc::new(RegistryCell::new(Arc::new(Registry::empty())));
    let gate = Arc::new(PauseGate::new()); // closed
    let pipeline = Arc::new(EnrichmentPipeline::new(
        Arc::clone(&registry),
        Arc::clone(&gate),
        Arc::new(InFlightTracker::new()),
        validator(),
        BadRowBuilder::default(),
        RuntimeMetrics::new(),
        PipelineConfig::default(),
    ));

    let raw = raw_page_view();
    let p = Arc::clone(&pipeline);
    let handle = tokio::spawn(async move { p.process(&raw).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!handle.is_finished());

    gate.open();
    let output = tokio::time::timeout(Duration::from_millis(500), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(output, EventOutput::Good { .. }));
}
