//! End-to-end scenarios over in-memory sources and sinks
//!
//! The enrichment-contexts scenario runs four trait-level enrichments and
//! asserts context ordering; the asset-refresh scenario swaps a referer
//! catalogue between batches and asserts the new data takes effect with
//! no record loss.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use sift_assets::{AssetManager, AssetManagerConfig, InFlightTracker, PauseGate};
use sift_enrich::{
    builtin_factories, Enrichment, EnrichmentConf, EnrichmentFailure, EnrichmentOrder, Registry,
    RegistryCell,
};
use sift_pipeline::{
    CommitSequencer, EnrichmentPipeline, EventOutput, PipelineConfig, Runtime, RuntimeConfig,
    RuntimeMetrics, SinkSet,
};
use sift_protocol::{BadRowBuilder, CollectorPayload, Decoder, DecoderConfig, EnrichedEvent, RawEvent};
use sift_schema::{SchemaValidator, StaticRegistry, ValidatorConfig};
use sift_sinks::MemorySink;
use sift_sources::{MemoryCheckpointer, MemorySource};
use tokio_util::sync::CancellationToken;

/// Trait-level enrichment standing in for an out-of-scope implementation
struct NamedContext {
    name: &'static str,
    schema: &'static str,
}

#[async_trait]
impl Enrichment for NamedContext {
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

const SCHEMAS: [&str; 4] = [
    "iglu:com.test/api_lookup/jsonschema/1-0-0",
    "iglu:com.test/script_output/jsonschema/1-0-0",
    "iglu:com.test/row_lookup/jsonschema/1-0-0",
    "iglu:com.test/agent_detail/jsonschema/1-0-0",
];

fn permissive_validator(schemas: &[&str]) -> SchemaValidator {
    let mut registry = StaticRegistry::new();
    for schema in schemas {
        registry.insert(schema, json!({"type": "object"}));
    }
    SchemaValidator::new(
        Arc::new(registry),
        ValidatorConfig {
            initial_backoff: Duration::from_millis(1),
            ..ValidatorConfig::default()
        },
    )
}

fn valid_payload() -> Vec<u8> {
    CollectorPayload {
        collector: Some("sift-collector".to_string()),
        timestamp: Some(1_700_000_000_000),
        querystring: Some("e=pv&aid=shop".to_string()),
        ..CollectorPayload::default()
    }
    .to_bytes()
}

#[tokio::test]
async fn four_enrichments_attach_contexts_in_run_order() {
    let enrichments: Vec<Box<dyn Enrichment>> = SCHEMAS
        .iter()
        .enumerate()
        .map(|(i, &schema)| {
            Box::new(NamedContext {
                name: ["api", "script", "row", "agent"][i],
                schema,
            }) as Box<dyn Enrichment>
        })
        .collect();

    let registry = Arc::new(RegistryCell::new(Arc::new(Registry::new(
        enrichments,
        Vec::new(),
    ))));
    let gate = Arc::new(PauseGate::new());
    gate.open();
    let metrics = RuntimeMetrics::new();

    let pipeline = EnrichmentPipeline::new(
        registry,
        gate,
        Arc::new(InFlightTracker::new()),
        permissive_validator(&SCHEMAS),
        BadRowBuilder::default(),
        Arc::clone(&metrics),
        PipelineConfig::default(),
    );

    let good = MemorySink::new();
    let bad = MemorySink::new();
    let checkpointer = MemoryCheckpointer::new();

    let runtime = Runtime::new(
        RuntimeConfig::default(),
        Decoder::new(DecoderConfig::default()),
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

    let payloads: Vec<Vec<u8>> = (0..50).map(|_| valid_payload()).collect();
    runtime
        .run(
            Box::new(MemorySource::single_partition(payloads)),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(good.len(), 50);
    assert_eq!(bad.len(), 0);

    for line in good.lines() {
        let columns: Vec<&str> = line.split('\t').collect();
        let contexts: Value = serde_json::from_str(columns[122]).unwrap();
        let schemas: Vec<&str> = contexts["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["schema"].as_str().unwrap())
            .collect();
        assert_eq!(schemas, SCHEMAS.to_vec());
    }
}

#[tokio::test]
async fn asset_refresh_takes_effect_between_batches() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("referers.json");
    // v1: partner.example.net is unknown
    std::fs::write(
        &source_path,
        json!({"search": {"Google": {"domains": ["google.com"], "parameters": ["q"]}}})
            .to_string(),
    )
    .unwrap();

    let uri = format!("file://{}", source_path.display());
    let confs = vec![EnrichmentConf::new(
        "referer_parser",
        json!({"database_uri": uri}),
    )];

    let cell = Arc::new(RegistryCell::new(Arc::new(Registry::empty())));
    let gate = Arc::new(PauseGate::new());
    let in_flight = Arc::new(InFlightTracker::new());

    let mut manager = AssetManager::new(
        AssetManagerConfig {
            cache_dir: dir.path().join("cache"),
            update_period: Some(Duration::from_secs(5)),
            order: EnrichmentOrder::Declared,
        },
        confs,
        Arc::new(builtin_factories()),
        Arc::clone(&cell),
        Arc::clone(&gate),
        Arc::clone(&in_flight),
        reqwest::Client::new(),
    );
    manager.bootstrap().await.unwrap();

    let pipeline = EnrichmentPipeline::new(
        Arc::clone(&cell),
        Arc::clone(&gate),
        Arc::clone(&in_flight),
        permissive_validator(&[]),
        BadRowBuilder::default(),
        RuntimeMetrics::new(),
        PipelineConfig::default(),
    );

    let raw = {
        let mut parameters = HashMap::new();
        parameters.insert("e".to_string(), "pv".to_string());
        parameters.insert(
            "refr".to_string(),
            "https://partner.example.net/campaign".to_string(),
        );
        RawEvent {
            parameters,
            ..RawEvent::default()
        }
    };

    let medium_of = |output: &EventOutput| -> String {
        match output {
            EventOutput::Good { bytes, .. } => {
                let line = String::from_utf8_lossy(bytes);
                // refr_medium is column 45 (0-based 44)
                line.split('\t').nth(44).unwrap().to_string()
            }
            EventOutput::Bad(_) => panic!("expected good output"),
        }
    };

    // batch 1: old catalogue classifies the referer as unknown
    let before = pipeline.process(&raw).await;
    assert_eq!(medium_of(&before), "unknown");

    // the catalogue changes on the asset host; a refresh cycle runs
    std::fs::write(
        &source_path,
        json!({
            "search": {"Google": {"domains": ["google.com"], "parameters": ["q"]}},
            "partner": {"ExampleNet": {"domains": ["partner.example.net"]}}
        })
        .to_string(),
    )
    .unwrap();
    assert!(manager.refresh().await.unwrap());

    // batch 2: the swapped registry answers with the new data, gate open
    let after = pipeline.process(&raw).await;
    assert_eq!(medium_of(&after), "partner");
}
