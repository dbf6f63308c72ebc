//! Per-event enrichment pipeline
//!
//! Takes one raw event through gate → registry snapshot → enrichments →
//! derived timestamps → validation → classification. Every outcome is a
//! value; nothing here panics on event content.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use serde_json::{json, Value};

use sift_assets::{InFlightTracker, PauseGate};
use sift_enrich::RegistryCell;
use sift_protocol::{BadRowBuilder, EnrichedEvent, FailureDetail, RawEvent};
use sift_schema::{SchemaFailure, SchemaValidator};
use sift_sinks::Attributes;

use crate::metrics::RuntimeMetrics;

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;

/// Schema key of the PII twin document
pub const PII_TRANSFORMATION_SCHEMA: &str = "iglu:com.sift/pii_transformation/jsonschema/1-0-0";

/// Schema key of the diagnostic context attached under accept_invalid
const VALIDATION_DIAGNOSTIC_SCHEMA: &str =
    "iglu:com.sift/validation_diagnostic/jsonschema/1-0-0";

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Route validation failures to good with a diagnostic context
    pub accept_invalid: bool,

    /// Per-enrichment wall-clock deadline per event
    pub enrichment_timeout: Duration,

    /// Atomic field names copied into sink attributes
    pub attributes: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            accept_invalid: false,
            enrichment_timeout: Duration::from_secs(10),
            attributes: vec!["app_id".to_string(), "event_name".to_string()],
        }
    }
}

/// Where one event ended up
#[derive(Debug)]
pub enum EventOutput {
    /// Schema-valid, fully enriched
    Good {
        bytes: Bytes,
        attributes: Attributes,
        /// Pseudonymisation twin, present when PII was rewritten
        pii: Option<Bytes>,
    },

    /// Routed to the bad sink
    Bad(Bytes),
}

/// The per-event orchestrator shared by all workers
pub struct EnrichmentPipeline {
    registry: Arc<RegistryCell>,
    gate: Arc<PauseGate>,
    in_flight: Arc<InFlightTracker>,
    validator: SchemaValidator,
    badrow: BadRowBuilder,
    metrics: Arc<RuntimeMetrics>,
    config: PipelineConfig,
}

impl EnrichmentPipeline {
    pub fn new(
        registry: Arc<RegistryCell>,
        gate: Arc<PauseGate>,
        in_flight: Arc<InFlightTracker>,
        validator: SchemaValidator,
        badrow: BadRowBuilder,
        metrics: Arc<RuntimeMetrics>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            gate,
            in_flight,
            validator,
            badrow,
            metrics,
            config,
        }
    }

    #[inline]
    pub fn in_flight(&self) -> Arc<InFlightTracker> {
        Arc::clone(&self.in_flight)
    }

    /// Run one raw event through the full pipeline
    pub async fn process(&self, raw: &RawEvent) -> EventOutput {
        // An asset swap in progress holds new work here; the in-flight
        // guard and registry snapshot are only taken once the gate opens,
        // and both are held until the event is classified.
        self.gate.wait_open().await;
        let _guard = InFlightTracker::enter(&self.in_flight);
        let registry = self.registry.snapshot();

        let mut event = EnrichedEvent::from_raw(raw);
        event.etl_tstamp = Some(Utc::now());
        event.v_etl = Some(concat!("sift-enrich-", env!("CARGO_PKG_VERSION")).to_string());

        // Enrichments run in registry order; failures collect, they do not
        // short-circuit the rest of the chain.
        let mut failures: Vec<String> = Vec::new();
        for enrichment in registry.enrichments() {
            let outcome = tokio::time::timeout(
                self.config.enrichment_timeout,
                enrichment.enrich(raw, &mut event),
            )
            .await;

            match outcome {
                Ok(Ok(contexts)) => event.derived_contexts.extend(contexts),
                Ok(Err(failure)) => {
                    RuntimeMetrics::incr(&self.metrics.enrichment_failures);
                    failures.push(failure.to_string());
                }
                Err(_elapsed) => {
                    RuntimeMetrics::incr(&self.metrics.enrichment_failures);
                    tracing::warn!(
                        enrichment = enrichment.name(),
                        timeout_secs = self.config.enrichment_timeout.as_secs(),
                        "enrichment timed out"
                    );
                    failures.push(
                        sift_enrich::EnrichmentFailure::timeout(enrichment.name()).to_string(),
                    );
                }
            }
        }

        event.set_derived_tstamp();

        let validation_failures = self.validate(&event).await;

        self.classify(raw, event, failures, validation_failures)
    }

    /// Validate the tracker entities and every derived context
    async fn validate(&self, event: &EnrichedEvent) -> Vec<String> {
        let mut messages = Vec::new();

        // custom contexts sent by the tracker: an envelope of entities
        if let Some(entities) = event
            .contexts
            .as_ref()
            .and_then(|c| c.get("data"))
            .and_then(Value::as_array)
        {
            for entity in entities {
                self.check_entity(entity, &mut messages).await;
            }
        }

        // the self-describing event itself
        if let Some(entity) = event.unstruct_event.as_ref().and_then(|u| u.get("data")) {
            self.check_entity(entity, &mut messages).await;
        }

        // everything the enrichments attached
        for entity in &event.derived_contexts {
            self.check_entity(entity, &mut messages).await;
        }

        messages
    }

    async fn check_entity(&self, entity: &Value, messages: &mut Vec<String>) {
        match self.validator.validate_entity(entity).await {
            Ok(()) => {}
            Err(SchemaFailure::ResolutionError { key, message }) => {
                RuntimeMetrics::incr(&self.metrics.resolution_errors);
                messages.push(format!("could not resolve {}: {}", key, message));
            }
            Err(failure) => messages.push(failure.to_string()),
        }
    }

    /// Split the event into good / bad, building the output bytes
    fn classify(
        &self,
        raw: &RawEvent,
        mut event: EnrichedEvent,
        failures: Vec<String>,
        validation_failures: Vec<String>,
    ) -> EventOutput {
        if !validation_failures.is_empty() {
            if self.config.accept_invalid {
                RuntimeMetrics::incr(&self.metrics.invalid_accepted);
                event.derived_contexts.push(json!({
                    "schema": VALIDATION_DIAGNOSTIC_SCHEMA,
                    "data": {"messages": validation_failures},
                }));
            } else {
                // schema violations outrank enrichment failures
                let detail = FailureDetail::SchemaViolations {
                    messages: validation_failures,
                };
                return self.bad(raw, &detail);
            }
        }

        if !failures.is_empty() {
            let detail = FailureDetail::EnrichmentFailures { messages: failures };
            return self.bad(raw, &detail);
        }

        RuntimeMetrics::incr(&self.metrics.good);

        let mut attributes = Attributes::new();
        for name in &self.config.attributes {
            if let Some(value) = event.field(name) {
                attributes.insert(name.clone(), value);
            }
        }

        // The twin is only emitted alongside good output; an event that
        // routes to bad drops its twin with it.
        let pii = if event.pii.is_empty() {
            None
        } else {
            RuntimeMetrics::incr(&self.metrics.pii);
            Some(Bytes::from(
                json!({
                    "schema": PII_TRANSFORMATION_SCHEMA,
                    "data": {
                        "pii": event.pii,
                        "strategy": "HMAC-SHA256",
                        "parentEventId": event.event_id,
                    }
                })
                .to_string()
                .into_bytes(),
            ))
        };

        EventOutput::Good {
            bytes: Bytes::from(event.to_tsv().into_bytes()),
            attributes,
            pii,
        }
    }

    fn bad(&self, raw: &RawEvent, detail: &FailureDetail) -> EventOutput {
        RuntimeMetrics::incr(&self.metrics.bad);
        let row = self.badrow.from_event(detail, raw.parameters_json());
        EventOutput::Bad(Bytes::from(row.to_bytes()))
    }
}
