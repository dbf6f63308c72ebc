//! PII pseudonymisation
//!
//! Rewrites configured identity columns with a keyed HMAC-SHA-256 digest
//! and records what was rewritten. A non-empty report makes the pipeline
//! emit a PII twin alongside the good event.
//!
//! Runs last regardless of configured order so it observes the final value
//! of every field it rewrites.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use sift_protocol::{EnrichedEvent, PiiField, RawEvent};

use crate::conf::AssetMap;
use crate::error::{BuildError, EnrichmentFailure};
use crate::registry::EnrichmentFactory;
use crate::Enrichment;

pub(crate) const NAME: &str = "pii_pseudonymizer";

type HmacSha256 = Hmac<Sha256>;

/// Columns the pseudonymiser is allowed to rewrite
const PSEUDONYMISABLE: [&str; 12] = [
    "user_id",
    "user_ipaddress",
    "user_fingerprint",
    "domain_userid",
    "domain_sessionid",
    "network_userid",
    "mkt_term",
    "mkt_content",
    "tr_orderid",
    "ti_orderid",
    "refr_domain_userid",
    "se_label",
];

#[derive(Debug, Clone, serde::Deserialize)]
struct Parameters {
    /// Columns to pseudonymise; each must be in the allowed set
    fields: Vec<String>,

    /// HMAC key
    salt: String,
}

/// Rewrites identity columns with deterministic pseudonyms
pub struct PiiPseudonymizerEnrichment {
    fields: Vec<String>,
    key: Vec<u8>,
}

impl PiiPseudonymizerEnrichment {
    pub fn from_parameters(params: &Value) -> Result<Self, BuildError> {
        let parameters: Parameters = serde_json::from_value(params.clone())
            .map_err(|e| BuildError::invalid_parameters(NAME, e.to_string()))?;

        for field in &parameters.fields {
            if !PSEUDONYMISABLE.contains(&field.as_str()) {
                return Err(BuildError::invalid_parameters(
                    NAME,
                    format!("'{}' is not a pseudonymisable field", field),
                ));
            }
        }
        if parameters.salt.is_empty() {
            return Err(BuildError::invalid_parameters(NAME, "salt must not be empty"));
        }

        Ok(Self {
            fields: parameters.fields,
            key: parameters.salt.into_bytes(),
        })
    }

    /// Deterministic pseudonym for a value
    fn pseudonym(&self, value: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(value.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Mutable access to the rewritable columns
fn field_slot<'a>(event: &'a mut EnrichedEvent, name: &str) -> Option<&'a mut Option<String>> {
    match name {
        "user_id" => Some(&mut event.user_id),
        "user_ipaddress" => Some(&mut event.user_ipaddress),
        "user_fingerprint" => Some(&mut event.user_fingerprint),
        "domain_userid" => Some(&mut event.domain_userid),
        "domain_sessionid" => Some(&mut event.domain_sessionid),
        "network_userid" => Some(&mut event.network_userid),
        "mkt_term" => Some(&mut event.mkt_term),
        "mkt_content" => Some(&mut event.mkt_content),
        "tr_orderid" => Some(&mut event.tr_orderid),
        "ti_orderid" => Some(&mut event.ti_orderid),
        "refr_domain_userid" => Some(&mut event.refr_domain_userid),
        "se_label" => Some(&mut event.se_label),
        _ => None,
    }
}

#[async_trait]
impl Enrichment for PiiPseudonymizerEnrichment {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn enrich(
        &self,
        _raw: &RawEvent,
        event: &mut EnrichedEvent,
    ) -> Result<Vec<Value>, EnrichmentFailure> {
        for name in &self.fields {
            let Some(slot) = field_slot(event, name) else {
                continue;
            };
            let Some(original) = slot.take() else {
                continue;
            };
            let hashed = self.pseudonym(&original);
            *slot = Some(hashed.clone());
            event.pii.push(PiiField {
                field_name: name.clone(),
                modified_value: hashed,
            });
        }
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
        Ok(Box::new(PiiPseudonymizerEnrichment::from_parameters(
            parameters,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enrichment(fields: &[&str]) -> PiiPseudonymizerEnrichment {
        PiiPseudonymizerEnrichment::from_parameters(&serde_json::json!({
            "fields": fields,
            "salt": "pepper-42",
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn rewrites_fields_and_records_report() {
        let e = enrichment(&["user_id", "user_ipaddress"]);
        let mut event = EnrichedEvent {
            user_id: Some("user-42".to_string()),
            user_ipaddress: Some("203.0.113.9".to_string()),
            domain_userid: Some("kept".to_string()),
            ..EnrichedEvent::default()
        };

        e.enrich(&RawEvent::default(), &mut event).await.unwrap();

        let user_id = event.user_id.clone().unwrap();
        assert_ne!(user_id, "user-42");
        assert_eq!(user_id.len(), 64); // hex sha256
        assert_eq!(event.domain_userid.as_deref(), Some("kept"));

        assert_eq!(event.pii.len(), 2);
        assert_eq!(event.pii[0].field_name, "user_id");
        assert_eq!(event.pii[0].modified_value, user_id);
    }

    #[tokio::test]
    async fn deterministic_for_same_salt() {
        let a = enrichment(&["user_id"]);
        let b = enrichment(&["user_id"]);
        assert_eq!(a.pseudonym("user-42"), b.pseudonym("user-42"));
        assert_ne!(a.pseudonym("user-42"), a.pseudonym("user-43"));
    }

    #[tokio::test]
    async fn unset_fields_produce_no_report() {
        let e = enrichment(&["user_id"]);
        let mut event = EnrichedEvent::default();
        e.enrich(&RawEvent::default(), &mut event).await.unwrap();
        assert!(event.pii.is_empty());
    }

    #[test]
    fn rejects_unknown_fields() {
        let result = PiiPseudonymizerEnrichment::from_parameters(&serde_json::json!({
            "fields": ["event_id"],
            "salt": "s",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_empty_salt() {
        let result = PiiPseudonymizerEnrichment::from_parameters(&serde_json::json!({
            "fields": ["user_id"],
            "salt": "",
        }));
        assert!(result.is_err());
    }
}
