//! Sift - Enrich
//!
//! The enrichment contract, the immutable registry of active enrichments,
//! and the built-in enrichment set.
//!
//! # Overview
//!
//! Enrichments modify one event at a time as it flows through the pipeline:
//! they derive fields, attach self-describing contexts, and pseudonymise
//! PII. The active set is fixed at startup; only the *assets* enrichments
//! read (GeoIP databases, referer catalogues) are refreshed at runtime, by
//! rebuilding the registry against the new files and swapping it in.
//!
//! # Design
//!
//! - **Thread-safe**: enrichments are shared by every pipeline worker and
//!   must be `Send + Sync`
//! - **Failures are values**: an enrichment failure marks the event for the
//!   bad sink; it never unwinds the worker
//! - **One snapshot per event**: workers capture an `Arc<Registry>` before
//!   the first enrichment runs and hold it until the event is classified
//!
//! # Adding an Enrichment
//!
//! 1. Implement `Enrichment` on your struct
//! 2. Implement `EnrichmentFactory` for config-driven construction,
//!    declaring any asset URIs your builder needs pre-downloaded
//! 3. Register the factory in `builtin_factories()`

mod anon_ip;
mod api_request;
mod campaign;
mod conf;
mod error;
mod fingerprint;
mod ip_lookups;
mod pii;
mod referer;
mod registry;
mod ua_parser;

pub use anon_ip::AnonIpEnrichment;
pub use api_request::{ApiRequestConfig, ApiRequestEnrichment};
pub use campaign::CampaignAttributionEnrichment;
pub use conf::{AssetMap, EnrichmentConf};
pub use error::{BuildError, EnrichmentFailure, FailureKind};
pub use fingerprint::EventFingerprintEnrichment;
pub use ip_lookups::IpLookupsEnrichment;
pub use pii::PiiPseudonymizerEnrichment;
pub use referer::RefererParserEnrichment;
pub use registry::{
    builtin_factories, EnrichmentFactory, EnrichmentOrder, FactorySet, Registry, RegistryCell,
};
pub use ua_parser::UserAgentEnrichment;

use async_trait::async_trait;
use serde_json::Value;
use sift_protocol::{EnrichedEvent, RawEvent};

/// One unit of per-event enrichment work
///
/// `enrich` receives the raw event (read-only) and the partially enriched
/// event (mutable). It returns the derived contexts to append; PII updates
/// are applied directly to `event.pii` by the pseudonymiser.
#[async_trait]
pub trait Enrichment: Send + Sync {
    /// Stable name, used in config, logs and failure messages
    fn name(&self) -> &'static str;

    /// Run this enrichment against one event
    async fn enrich(
        &self,
        raw: &RawEvent,
        event: &mut EnrichedEvent,
    ) -> Result<Vec<Value>, EnrichmentFailure>;
}
