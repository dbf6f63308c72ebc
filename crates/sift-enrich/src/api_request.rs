//! HTTP lookup enrichment
//!
//! Calls a JSON endpoint per event, with field placeholders substituted
//! into the URL, and attaches the response as a derived context. Responses
//! are cached with a TTL so hot keys do not hammer the endpoint.
//!
//! This is the pipeline's canonical I/O-bound enrichment: a slow endpoint
//! surfaces as per-event timeout failures, never as a stalled worker.

use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use serde_json::{json, Value};
use sift_protocol::{EnrichedEvent, RawEvent};

use crate::conf::AssetMap;
use crate::error::{BuildError, EnrichmentFailure};
use crate::registry::EnrichmentFactory;
use crate::Enrichment;

pub(crate) const NAME: &str = "api_request";

/// Configuration for the HTTP lookup
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiRequestConfig {
    /// URL template; `{{field}}` placeholders name atomic fields
    pub url: String,

    /// Schema key of the attached context
    pub context_schema: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Response cache capacity
    #[serde(default = "default_cache_size")]
    pub cache_size: u64,

    /// Response cache TTL in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_timeout_ms() -> u64 {
    1_000
}

fn default_cache_size() -> u64 {
    1_000
}

fn default_cache_ttl_secs() -> u64 {
    60
}

/// Looks up a JSON endpoint and attaches the response as a context
pub struct ApiRequestEnrichment {
    config: ApiRequestConfig,
    client: reqwest::Client,
    cache: Cache<String, Value>,
}

impl ApiRequestEnrichment {
    pub fn new(config: ApiRequestConfig) -> Result<Self, BuildError> {
        if !config.url.contains("://") {
            return Err(BuildError::invalid_parameters(NAME, "url must be absolute"));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| BuildError::invalid_parameters(NAME, e.to_string()))?;
        let cache = Cache::builder()
            .max_capacity(config.cache_size)
            .time_to_live(Duration::from_secs(config.cache_ttl_secs))
            .build();
        Ok(Self {
            config,
            client,
            cache,
        })
    }

    /// Substitute `{{field}}` placeholders from the event
    ///
    /// Returns `None` when a referenced field is unset: no URL, no lookup.
    fn render_url(&self, event: &EnrichedEvent) -> Option<String> {
        let mut url = self.config.url.clone();
        while let Some(start) = url.find("{{") {
            let end = url[start..].find("}}").map(|i| start + i)?;
            let field = url[start + 2..end].trim().to_string();
            let value = event.field(&field)?;
            url.replace_range(start..end + 2, &value);
        }
        Some(url)
    }

    async fn fetch(&self, url: &str) -> Result<Value, EnrichmentFailure> {
        if let Some(hit) = self.cache.get(url) {
            return Ok(hit);
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EnrichmentFailure::lookup(NAME, e.to_string()))?;

        if !response.status().is_success() {
            return Err(EnrichmentFailure::lookup(
                NAME,
                format!("endpoint returned {}", response.status()),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| EnrichmentFailure::lookup(NAME, e.to_string()))?;

        self.cache.insert(url.to_string(), body.clone());
        Ok(body)
    }
}

#[async_trait]
impl Enrichment for ApiRequestEnrichment {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn enrich(
        &self,
        _raw: &RawEvent,
        event: &mut EnrichedEvent,
    ) -> Result<Vec<Value>, EnrichmentFailure> {
        let Some(url) = self.render_url(event) else {
            return Ok(Vec::new());
        };

        let body = self.fetch(&url).await?;

        Ok(vec![json!({
            "schema": self.config.context_schema,
            "data": body,
        })])
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
        let config: ApiRequestConfig = serde_json::from_value(parameters.clone())
            .map_err(|e| BuildError::invalid_parameters(NAME, e.to_string()))?;
        Ok(Box::new(ApiRequestEnrichment::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enrichment(url: &str) -> ApiRequestEnrichment {
        ApiRequestEnrichment::new(ApiRequestConfig {
            url: url.to_string(),
            context_schema: "iglu:com.acme/user_profile/jsonschema/1-0-0".to_string(),
            timeout_ms: 100,
            cache_size: 10,
            cache_ttl_secs: 60,
        })
        .unwrap()
    }

    #[test]
    fn renders_placeholders_from_event_fields() {
        let e = enrichment("https://api.example.com/users/{{user_id}}?app={{app_id}}");
        let event = EnrichedEvent {
            user_id: Some("user-42".to_string()),
            app_id: Some("shop".to_string()),
            ..EnrichedEvent::default()
        };
        assert_eq!(
            e.render_url(&event).as_deref(),
            Some("https://api.example.com/users/user-42?app=shop")
        );
    }

    #[test]
    fn unset_placeholder_field_skips_the_lookup() {
        let e = enrichment("https://api.example.com/users/{{user_id}}");
        assert_eq!(e.render_url(&EnrichedEvent::default()), None);
    }

    #[test]
    fn url_without_placeholders_is_unchanged() {
        let e = enrichment("https://api.example.com/static");
        assert_eq!(
            e.render_url(&EnrichedEvent::default()).as_deref(),
            Some("https://api.example.com/static")
        );
    }

    #[test]
    fn relative_url_is_rejected() {
        let result = ApiRequestEnrichment::new(ApiRequestConfig {
            url: "/users/{{user_id}}".to_string(),
            context_schema: "iglu:com.acme/p/jsonschema/1-0-0".to_string(),
            timeout_ms: 100,
            cache_size: 10,
            cache_ttl_secs: 60,
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_lookup_failure() {
        // reserved TEST-NET address, nothing listens there
        let e = enrichment("http://192.0.2.1:9/lookup");
        let mut event = EnrichedEvent::default();
        let err = e
            .enrich(&RawEvent::default(), &mut event)
            .await
            .unwrap_err();
        assert_eq!(err.enrichment, NAME);
        assert!(matches!(err.kind, crate::FailureKind::Lookup(_)));
    }
}
