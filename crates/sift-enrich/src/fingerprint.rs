//! Event fingerprinting
//!
//! Computes a deterministic SHA-256 over the raw tracker parameters so
//! downstream models can deduplicate replays. Volatile parameters (event
//! id, sent timestamp) are excluded by default.

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use sift_protocol::{EnrichedEvent, RawEvent};

use crate::conf::AssetMap;
use crate::error::{BuildError, EnrichmentFailure};
use crate::registry::EnrichmentFactory;
use crate::Enrichment;

pub(crate) const NAME: &str = "event_fingerprint";

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
struct Parameters {
    /// Tracker parameters excluded from the hash
    exclude_parameters: Vec<String>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            exclude_parameters: vec![
                "eid".to_string(),
                "stm".to_string(),
                "cv".to_string(),
                "nuid".to_string(),
            ],
        }
    }
}

/// Sets `event_fingerprint` from the raw parameter map
pub struct EventFingerprintEnrichment {
    parameters: Parameters,
}

impl EventFingerprintEnrichment {
    pub fn from_parameters(params: &Value) -> Result<Self, BuildError> {
        let parameters = if params.is_null() {
            Parameters::default()
        } else {
            serde_json::from_value(params.clone())
                .map_err(|e| BuildError::invalid_parameters(NAME, e.to_string()))?
        };
        Ok(Self { parameters })
    }
}

#[async_trait]
impl Enrichment for EventFingerprintEnrichment {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn enrich(
        &self,
        raw: &RawEvent,
        event: &mut EnrichedEvent,
    ) -> Result<Vec<Value>, EnrichmentFailure> {
        let mut keys: Vec<&String> = raw
            .parameters
            .keys()
            .filter(|k| !self.parameters.exclude_parameters.contains(k))
            .collect();
        keys.sort();

        let mut hasher = Sha256::new();
        for key in keys {
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            hasher.update(raw.parameters[key].as_bytes());
            hasher.update([0u8]);
        }

        event.event_fingerprint = Some(hex::encode(hasher.finalize()));
        Ok(Vec::new())
    }
}

pub(crate) struct Factory;

impl EnrichmentFactory for Factory {
    fn name(&self) -> &'static str {
        NAME
    }

    fn build(
        &self,
        parameters: &Value,
        _assets: &AssetMap,
    ) -> Result<Box<dyn Enrichment>, BuildError> {
        Ok(Box::new(EventFingerprintEnrichment::from_parameters(
            parameters,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> RawEvent {
        let parameters: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RawEvent {
            parameters,
            ..RawEvent::default()
        }
    }

    async fn fingerprint(raw_event: &RawEvent) -> String {
        let e = EventFingerprintEnrichment::from_parameters(&Value::Null).unwrap();
        let mut event = EnrichedEvent::default();
        e.enrich(raw_event, &mut event).await.unwrap();
        event.event_fingerprint.unwrap()
    }

    #[tokio::test]
    async fn deterministic_across_parameter_order() {
        // HashMap iteration order varies; the fingerprint must not.
        let a = fingerprint(&raw(&[("e", "pv"), ("aid", "shop"), ("url", "u")])).await;
        let b = fingerprint(&raw(&[("url", "u"), ("e", "pv"), ("aid", "shop")])).await;
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn excluded_parameters_do_not_change_the_hash() {
        let without = fingerprint(&raw(&[("e", "pv")])).await;
        let with = fingerprint(&raw(&[("e", "pv"), ("eid", "some-uuid"), ("stm", "123")])).await;
        assert_eq!(without, with);
    }

    #[tokio::test]
    async fn different_values_change_the_hash() {
        let a = fingerprint(&raw(&[("e", "pv")])).await;
        let b = fingerprint(&raw(&[("e", "pp")])).await;
        assert_ne!(a, b);
    }
}
