//! Campaign attribution
//!
//! Reads marketing parameters off the page URL querystring and fills the
//! `mkt_*` columns. Parameter names are configurable; the defaults cover
//! the utm family plus the common paid-click ids.

use async_trait::async_trait;
use serde_json::Value;
use sift_protocol::{EnrichedEvent, RawEvent};

use crate::conf::AssetMap;
use crate::error::{BuildError, EnrichmentFailure};
use crate::registry::EnrichmentFactory;
use crate::Enrichment;

pub(crate) const NAME: &str = "campaign_attribution";

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
struct Parameters {
    mkt_medium: Vec<String>,
    mkt_source: Vec<String>,
    mkt_term: Vec<String>,
    mkt_content: Vec<String>,
    mkt_campaign: Vec<String>,
    /// clickid parameter → network name
    mkt_clickid: Vec<(String, String)>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            mkt_medium: vec!["utm_medium".to_string()],
            mkt_source: vec!["utm_source".to_string()],
            mkt_term: vec!["utm_term".to_string()],
            mkt_content: vec!["utm_content".to_string()],
            mkt_campaign: vec!["utm_campaign".to_string()],
            mkt_clickid: vec![
                ("gclid".to_string(), "Google".to_string()),
                ("msclkid".to_string(), "Microsoft".to_string()),
                ("dclid".to_string(), "DoubleClick".to_string()),
            ],
        }
    }
}

/// Fills mkt_* from the page URL querystring
pub struct CampaignAttributionEnrichment {
    parameters: Parameters,
}

impl CampaignAttributionEnrichment {
    pub fn from_parameters(params: &Value) -> Result<Self, BuildError> {
        let parameters = if params.is_null() {
            Parameters::default()
        } else {
            serde_json::from_value(params.clone())
                .map_err(|e| BuildError::invalid_parameters(NAME, e.to_string()))?
        };
        Ok(Self { parameters })
    }

    fn first_match(query: &[(String, String)], names: &[String]) -> Option<String> {
        names.iter().find_map(|name| {
            query
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        })
    }
}

#[async_trait]
impl Enrichment for CampaignAttributionEnrichment {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn enrich(
        &self,
        _raw: &RawEvent,
        event: &mut EnrichedEvent,
    ) -> Result<Vec<Value>, EnrichmentFailure> {
        let Some(query) = event.page_urlquery.as_deref() else {
            return Ok(Vec::new());
        };

        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        event.mkt_medium = Self::first_match(&pairs, &self.parameters.mkt_medium);
        event.mkt_source = Self::first_match(&pairs, &self.parameters.mkt_source);
        event.mkt_term = Self::first_match(&pairs, &self.parameters.mkt_term);
        event.mkt_content = Self::first_match(&pairs, &self.parameters.mkt_content);
        event.mkt_campaign = Self::first_match(&pairs, &self.parameters.mkt_campaign);

        for (param, network) in &self.parameters.mkt_clickid {
            if let Some((_, v)) = pairs.iter().find(|(k, _)| k == param) {
                event.mkt_clickid = Some(v.clone());
                event.mkt_network = Some(network.clone());
                break;
            }
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
        Ok(Box::new(CampaignAttributionEnrichment::from_parameters(
            parameters,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_with_query(query: &str) -> EnrichedEvent {
        EnrichedEvent {
            page_urlquery: Some(query.to_string()),
            ..EnrichedEvent::default()
        }
    }

    #[tokio::test]
    async fn fills_utm_fields() {
        let e = CampaignAttributionEnrichment::from_parameters(&Value::Null).unwrap();
        let mut event =
            event_with_query("utm_medium=email&utm_source=newsletter&utm_campaign=spring");

        let contexts = e.enrich(&RawEvent::default(), &mut event).await.unwrap();
        assert!(contexts.is_empty());
        assert_eq!(event.mkt_medium.as_deref(), Some("email"));
        assert_eq!(event.mkt_source.as_deref(), Some("newsletter"));
        assert_eq!(event.mkt_campaign.as_deref(), Some("spring"));
        assert_eq!(event.mkt_term, None);
    }

    #[tokio::test]
    async fn maps_clickid_to_network() {
        let e = CampaignAttributionEnrichment::from_parameters(&Value::Null).unwrap();
        let mut event = event_with_query("gclid=abc123");

        e.enrich(&RawEvent::default(), &mut event).await.unwrap();
        assert_eq!(event.mkt_clickid.as_deref(), Some("abc123"));
        assert_eq!(event.mkt_network.as_deref(), Some("Google"));
    }

    #[tokio::test]
    async fn no_query_is_a_no_op() {
        let e = CampaignAttributionEnrichment::from_parameters(&Value::Null).unwrap();
        let mut event = EnrichedEvent::default();
        e.enrich(&RawEvent::default(), &mut event).await.unwrap();
        assert_eq!(event.mkt_medium, None);
    }

    #[tokio::test]
    async fn custom_parameter_names() {
        let params = serde_json::json!({"mkt_medium": ["med"]});
        let e = CampaignAttributionEnrichment::from_parameters(&params).unwrap();
        let mut event = event_with_query("med=cpc&utm_medium=ignored");

        e.enrich(&RawEvent::default(), &mut event).await.unwrap();
        assert_eq!(event.mkt_medium.as_deref(), Some("cpc"));
    }
}
