//! Bad row construction
//!
//! Every per-event failure becomes a self-describing JSON document on the
//! bad sink. The schema key identifies the failure class; `data` always
//! carries the processor identity, a timestamped failure description, and
//! the original payload so the row can be replayed after a fix.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

#[cfg(test)]
#[path = "badrow_test.rs"]
mod tests;

/// Schema keys per failure class
pub const ADAPTER_FAILURES_SCHEMA: &str = "iglu:com.sift/adapter_failures/jsonschema/1-0-0";
pub const SIZE_VIOLATION_SCHEMA: &str = "iglu:com.sift/size_violation/jsonschema/1-0-0";
pub const SCHEMA_VIOLATIONS_SCHEMA: &str = "iglu:com.sift/schema_violations/jsonschema/2-0-0";
pub const ENRICHMENT_FAILURES_SCHEMA: &str = "iglu:com.sift/enrichment_failures/jsonschema/2-0-0";
pub const GENERIC_ERROR_SCHEMA: &str = "iglu:com.sift/generic_error/jsonschema/1-0-0";

/// Identity of the process that produced a bad row
#[derive(Debug, Clone, serde::Serialize)]
pub struct Processor {
    pub artifact: &'static str,
    pub version: &'static str,
}

impl Default for Processor {
    fn default() -> Self {
        Self {
            artifact: "sift-enrich",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Structured description of what went wrong with one record or event
#[derive(Debug, Clone, PartialEq)]
pub enum FailureDetail {
    /// The payload could not be decoded into raw events
    AdapterFailure { message: String },

    /// The record exceeded the maximum allowed size
    SizeViolation {
        actual_size: usize,
        maximum_allowed: usize,
        payload_preview: String,
    },

    /// One or more schema validations failed
    SchemaViolations { messages: Vec<String> },

    /// One or more enrichments failed
    EnrichmentFailures { messages: Vec<String> },

    /// Anything that does not fit the classes above
    Generic { message: String },
}

impl FailureDetail {
    /// Schema key for this failure class
    pub fn schema(&self) -> &'static str {
        match self {
            Self::AdapterFailure { .. } => ADAPTER_FAILURES_SCHEMA,
            Self::SizeViolation { .. } => SIZE_VIOLATION_SCHEMA,
            Self::SchemaViolations { .. } => SCHEMA_VIOLATIONS_SCHEMA,
            Self::EnrichmentFailures { .. } => ENRICHMENT_FAILURES_SCHEMA,
            Self::Generic { .. } => GENERIC_ERROR_SCHEMA,
        }
    }

    fn messages(&self) -> Vec<Value> {
        match self {
            Self::AdapterFailure { message } | Self::Generic { message } => {
                vec![Value::String(message.clone())]
            }
            Self::SizeViolation {
                actual_size,
                maximum_allowed,
                ..
            } => vec![json!({
                "actualSizeBytes": actual_size,
                "maximumAllowedSizeBytes": maximum_allowed,
            })],
            Self::SchemaViolations { messages } | Self::EnrichmentFailures { messages } => {
                messages.iter().cloned().map(Value::String).collect()
            }
        }
    }
}

/// A finished bad row, ready for the bad sink
#[derive(Debug, Clone)]
pub struct BadRow {
    pub schema: &'static str,
    pub data: Value,
}

impl BadRow {
    /// Serialise as the self-describing JSON document
    pub fn to_json(&self) -> Value {
        json!({
            "schema": self.schema,
            "data": self.data,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_json().to_string().into_bytes()
    }
}

/// Builder carrying the processor identity
///
/// One instance per process; construction is cheap and thread-safe.
#[derive(Debug, Clone, Default)]
pub struct BadRowBuilder {
    processor: Processor,
}

impl BadRowBuilder {
    pub fn new(processor: Processor) -> Self {
        Self { processor }
    }

    /// Bad row for a record that never became events
    ///
    /// The raw payload is base64-encoded: collector payloads are binary.
    pub fn from_record(&self, detail: &FailureDetail, payload: &[u8]) -> BadRow {
        self.build(
            detail,
            Value::String(base64::engine::general_purpose::STANDARD.encode(payload)),
            Utc::now(),
        )
    }

    /// Bad row for an event that failed during enrichment or validation
    ///
    /// The payload is the raw event's parameter map, replayable as JSON.
    pub fn from_event(&self, detail: &FailureDetail, event_payload: Value) -> BadRow {
        self.build(detail, event_payload, Utc::now())
    }

    fn build(&self, detail: &FailureDetail, payload: Value, at: DateTime<Utc>) -> BadRow {
        BadRow {
            schema: detail.schema(),
            data: json!({
                "processor": {
                    "artifact": self.processor.artifact,
                    "version": self.processor.version,
                },
                "failure": {
                    "timestamp": at.to_rfc3339(),
                    "messages": detail.messages(),
                },
                "payload": payload,
            }),
        }
    }
}
