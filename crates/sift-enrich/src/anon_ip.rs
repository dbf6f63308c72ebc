//! IP anonymisation
//!
//! Zeroes the trailing octets of IPv4 addresses and trailing segments of
//! IPv6 addresses in `user_ipaddress` before the event leaves the pipeline.

use std::net::IpAddr;

use async_trait::async_trait;
use serde_json::Value;
use sift_protocol::{EnrichedEvent, RawEvent};

use crate::conf::AssetMap;
use crate::error::{BuildError, EnrichmentFailure};
use crate::registry::EnrichmentFactory;
use crate::Enrichment;

pub(crate) const NAME: &str = "anon_ip";

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
struct Parameters {
    /// IPv4 octets to zero, counted from the right (0..=4)
    anon_octets: u8,

    /// IPv6 16-bit segments to zero, counted from the right (0..=8)
    anon_segments: u8,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            anon_octets: 1,
            anon_segments: 4,
        }
    }
}

/// Masks the client IP in place
pub struct AnonIpEnrichment {
    parameters: Parameters,
}

impl AnonIpEnrichment {
    pub fn from_parameters(params: &Value) -> Result<Self, BuildError> {
        let parameters: Parameters = if params.is_null() {
            Parameters::default()
        } else {
            serde_json::from_value(params.clone())
                .map_err(|e| BuildError::invalid_parameters(NAME, e.to_string()))?
        };
        if parameters.anon_octets > 4 {
            return Err(BuildError::invalid_parameters(NAME, "anon_octets > 4"));
        }
        if parameters.anon_segments > 8 {
            return Err(BuildError::invalid_parameters(NAME, "anon_segments > 8"));
        }
        Ok(Self { parameters })
    }

    fn mask(&self, ip: &str) -> Option<String> {
        match ip.parse::<IpAddr>().ok()? {
            IpAddr::V4(v4) => {
                let mut octets = v4.octets();
                let start = 4usize.saturating_sub(usize::from(self.parameters.anon_octets));
                for octet in &mut octets[start..] {
                    *octet = 0;
                }
                Some(std::net::Ipv4Addr::from(octets).to_string())
            }
            IpAddr::V6(v6) => {
                let mut segments = v6.segments();
                let start = 8usize.saturating_sub(usize::from(self.parameters.anon_segments));
                for segment in &mut segments[start..] {
                    *segment = 0;
                }
                Some(std::net::Ipv6Addr::from(segments).to_string())
            }
        }
    }
}

#[async_trait]
impl Enrichment for AnonIpEnrichment {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn enrich(
        &self,
        _raw: &RawEvent,
        event: &mut EnrichedEvent,
    ) -> Result<Vec<Value>, EnrichmentFailure> {
        if let Some(masked) = event.user_ipaddress.as_deref().and_then(|ip| self.mask(ip)) {
            event.user_ipaddress = Some(masked);
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
        Ok(Box::new(AnonIpEnrichment::from_parameters(parameters)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn masked(params: Value, ip: &str) -> Option<String> {
        let e = AnonIpEnrichment::from_parameters(&params).unwrap();
        let mut event = EnrichedEvent {
            user_ipaddress: Some(ip.to_string()),
            ..EnrichedEvent::default()
        };
        e.enrich(&RawEvent::default(), &mut event).await.unwrap();
        event.user_ipaddress
    }

    #[tokio::test]
    async fn masks_default_one_octet() {
        assert_eq!(
            masked(Value::Null, "203.0.113.97").await.as_deref(),
            Some("203.0.113.0")
        );
    }

    #[tokio::test]
    async fn masks_configured_octets() {
        assert_eq!(
            masked(serde_json::json!({"anon_octets": 2}), "203.0.113.97")
                .await
                .as_deref(),
            Some("203.0.0.0")
        );
    }

    #[tokio::test]
    async fn masks_ipv6_segments() {
        assert_eq!(
            masked(Value::Null, "2001:db8:1234:5678:9abc:def0:1:2")
                .await
                .as_deref(),
            Some("2001:db8:1234:5678::")
        );
    }

    #[tokio::test]
    async fn unparseable_ip_is_left_alone() {
        assert_eq!(
            masked(Value::Null, "not-an-ip").await.as_deref(),
            Some("not-an-ip")
        );
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        assert!(AnonIpEnrichment::from_parameters(&serde_json::json!({"anon_octets": 5})).is_err());
    }
}
