//! GeoIP lookups
//!
//! Resolves the client IP against a MaxMind city database and fills the
//! geo_* columns. The database file is an asset: the asset manager
//! downloads it, and a registry rebuild re-opens it after every refresh.

use std::net::IpAddr;
use std::path::Path;

use async_trait::async_trait;
use maxminddb::Reader;
use serde_json::Value;
use sift_protocol::{EnrichedEvent, RawEvent};

use crate::conf::AssetMap;
use crate::error::{BuildError, EnrichmentFailure};
use crate::registry::EnrichmentFactory;
use crate::Enrichment;

pub(crate) const NAME: &str = "ip_lookups";

#[derive(Debug, Clone, serde::Deserialize)]
struct Parameters {
    /// URI of the MaxMind city database asset
    geo_uri: String,
}

/// Field extraction table: (setter target, path into the city document)
const GEO_PATHS: [(&str, &[&str]); 7] = [
    ("geo_country", &["country", "iso_code"]),
    ("geo_region", &["subdivisions", "0", "iso_code"]),
    ("geo_region_name", &["subdivisions", "0", "names", "en"]),
    ("geo_city", &["city", "names", "en"]),
    ("geo_zipcode", &["postal", "code"]),
    ("geo_timezone", &["location", "time_zone"]),
    ("geo_latitude", &["location", "latitude"]),
];

/// Fills geo_* columns from a MaxMind city database
pub struct IpLookupsEnrichment {
    reader: Reader<Vec<u8>>,
}

impl IpLookupsEnrichment {
    /// Open a city database from disk
    pub fn open(path: &Path) -> Result<Self, BuildError> {
        let reader = Reader::open_readfile(path)
            .map_err(|e| BuildError::unusable_asset(NAME, format!("{}: {}", path.display(), e)))?;
        Ok(Self { reader })
    }

    fn lookup(&self, addr: IpAddr) -> Option<Value> {
        self.reader.lookup::<Value>(addr).ok()
    }
}

fn nested<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = doc;
    for key in path {
        current = match key.parse::<usize>() {
            Ok(index) => current.get(index)?,
            Err(_) => current.get(key)?,
        };
    }
    Some(current)
}

#[async_trait]
impl Enrichment for IpLookupsEnrichment {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn enrich(
        &self,
        _raw: &RawEvent,
        event: &mut EnrichedEvent,
    ) -> Result<Vec<Value>, EnrichmentFailure> {
        let Some(addr) = event
            .user_ipaddress
            .as_deref()
            .and_then(|ip| ip.parse::<IpAddr>().ok())
        else {
            return Ok(Vec::new());
        };

        // An address outside the database is ordinary traffic (private
        // ranges, new allocations), not a failure.
        let Some(city) = self.lookup(addr) else {
            return Ok(Vec::new());
        };

        for (field, path) in GEO_PATHS {
            let Some(value) = nested(&city, path) else {
                continue;
            };
            match field {
                "geo_country" => event.geo_country = value.as_str().map(str::to_owned),
                "geo_region" => event.geo_region = value.as_str().map(str::to_owned),
                "geo_region_name" => event.geo_region_name = value.as_str().map(str::to_owned),
                "geo_city" => event.geo_city = value.as_str().map(str::to_owned),
                "geo_zipcode" => event.geo_zipcode = value.as_str().map(str::to_owned),
                "geo_timezone" => event.geo_timezone = value.as_str().map(str::to_owned),
                "geo_latitude" => event.geo_latitude = value.as_f64(),
                _ => {}
            }
        }
        event.geo_longitude = nested(&city, &["location", "longitude"]).and_then(Value::as_f64);

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
            .get("geo_uri")
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
            .get(&params.geo_uri)
            .ok_or_else(|| BuildError::MissingAsset {
                enrichment: NAME.to_string(),
                uri: params.geo_uri.clone(),
            })?;

        Ok(Box::new(IpLookupsEnrichment::open(path)?))
    }
}
