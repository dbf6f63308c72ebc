//! Referer classification
//!
//! Splits the referer URL into its component columns and classifies it as
//! search / social / email / paid / internal / unknown using a JSON
//! catalogue asset mapping referer domains to mediums, sources and search
//! parameters.
//!
//! Catalogue shape:
//!
//! ```json
//! {
//!   "search": {
//!     "Google": { "domains": ["www.google.com", "google.com"], "parameters": ["q"] }
//!   },
//!   "social": {
//!     "Mastodon": { "domains": ["mastodon.social"] }
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use sift_protocol::{EnrichedEvent, RawEvent};

use crate::conf::AssetMap;
use crate::error::{BuildError, EnrichmentFailure};
use crate::registry::EnrichmentFactory;
use crate::Enrichment;

pub(crate) const NAME: &str = "referer_parser";

#[derive(Debug, Clone, serde::Deserialize)]
struct Parameters {
    /// URI of the referer catalogue asset
    database_uri: String,

    /// Hosts treated as internal traffic in addition to the page host
    #[serde(default)]
    internal_domains: Vec<String>,
}

#[derive(Debug, Clone)]
struct RefererEntry {
    medium: String,
    source: String,
    /// Querystring parameters carrying the search term
    parameters: Vec<String>,
}

/// Classifies `page_referrer` and fills the refr_* columns
pub struct RefererParserEnrichment {
    /// domain → classification, longest-domain-first lookup
    by_domain: HashMap<String, RefererEntry>,
    internal_domains: Vec<String>,
}

impl RefererParserEnrichment {
    /// Build from a catalogue file on disk
    pub fn from_catalogue(path: &Path, internal_domains: Vec<String>) -> Result<Self, BuildError> {
        let bytes = std::fs::read(path)
            .map_err(|e| BuildError::unusable_asset(NAME, format!("{}: {}", path.display(), e)))?;
        let doc: Value = serde_json::from_slice(&bytes)
            .map_err(|e| BuildError::unusable_asset(NAME, e.to_string()))?;

        let mut by_domain = HashMap::new();
        let Some(mediums) = doc.as_object() else {
            return Err(BuildError::unusable_asset(NAME, "catalogue is not an object"));
        };

        for (medium, sources) in mediums {
            let Some(sources) = sources.as_object() else {
                continue;
            };
            for (source, entry) in sources {
                let domains = entry
                    .get("domains")
                    .and_then(Value::as_array)
                    .map(|d| {
                        d.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_owned)
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                let parameters = entry
                    .get("parameters")
                    .and_then(Value::as_array)
                    .map(|p| {
                        p.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_owned)
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();

                for domain in domains {
                    by_domain.insert(
                        domain,
                        RefererEntry {
                            medium: medium.clone(),
                            source: source.clone(),
                            parameters: parameters.clone(),
                        },
                    );
                }
            }
        }

        Ok(Self {
            by_domain,
            internal_domains,
        })
    }

    /// Look up a host, trying progressively shorter suffixes
    ///
    /// `news.google.com` falls back to `google.com` when the full host has
    /// no entry of its own.
    fn lookup(&self, host: &str) -> Option<&RefererEntry> {
        let mut candidate = host;
        loop {
            if let Some(entry) = self.by_domain.get(candidate) {
                return Some(entry);
            }
            match candidate.split_once('.') {
                Some((_, rest)) if rest.contains('.') => candidate = rest,
                _ => return None,
            }
        }
    }
}

#[async_trait]
impl Enrichment for RefererParserEnrichment {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn enrich(
        &self,
        _raw: &RawEvent,
        event: &mut EnrichedEvent,
    ) -> Result<Vec<Value>, EnrichmentFailure> {
        let Some(parsed) = event
            .page_referrer
            .as_deref()
            .and_then(|r| url::Url::parse(r).ok())
        else {
            return Ok(Vec::new());
        };

        event.refr_urlscheme = Some(parsed.scheme().to_string());
        event.refr_urlhost = parsed.host_str().map(str::to_owned);
        event.refr_urlport = parsed.port_or_known_default().map(i32::from);
        event.refr_urlpath = Some(parsed.path().to_string());
        event.refr_urlquery = parsed.query().map(str::to_owned);
        event.refr_urlfragment = parsed.fragment().map(str::to_owned);

        let Some(host) = parsed.host_str() else {
            return Ok(Vec::new());
        };

        let internal = event.page_urlhost.as_deref() == Some(host)
            || self.internal_domains.iter().any(|d| d == host);
        if internal {
            event.refr_medium = Some("internal".to_string());
            return Ok(Vec::new());
        }

        match self.lookup(host) {
            Some(entry) => {
                event.refr_medium = Some(entry.medium.clone());
                event.refr_source = Some(entry.source.clone());
                event.refr_term = parsed
                    .query_pairs()
                    .find(|(k, _)| entry.parameters.iter().any(|p| p == k))
                    .map(|(_, v)| v.into_owned());
            }
            None => {
                event.refr_medium = Some("unknown".to_string());
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

    fn assets(&self, parameters: &Value) -> Vec<String> {
        parameters
            .get("database_uri")
            .and_then(Value::as_str)
            .map(|uri| vec![uri.to_string()])
            .unwrap_or_default()
    }

    fn build(
        &self,
        parameters: &Value,
        assets: &AssetMap,
    ) -> Result<Box<dyn Enrichment>, BuildError> {
        let params: Parameters = serde_json::from_value(parameters.clone())
            .map_err(|e| BuildError::invalid_parameters(NAME, e.to_string()))?;

        let path = assets
            .get(&params.database_uri)
            .ok_or_else(|| BuildError::MissingAsset {
                enrichment: NAME.to_string(),
                uri: params.database_uri.clone(),
            })?;

        Ok(Box::new(RefererParserEnrichment::from_catalogue(
            path,
            params.internal_domains,
        )?))
    }
}
