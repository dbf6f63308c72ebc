//! Enrichment configuration

use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::Value;

/// Static configuration of one enrichment instance
///
/// `parameters` is the enrichment-specific table; each factory deserialises
/// it into its own config struct.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct EnrichmentConf {
    /// Enrichment type name (e.g. "ip_lookups")
    pub name: String,

    /// Disabled confs are kept for bookkeeping but never built
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Enrichment-specific parameters
    #[serde(default)]
    pub parameters: Value,
}

fn default_enabled() -> bool {
    true
}

impl EnrichmentConf {
    pub fn new(name: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            parameters,
        }
    }
}

/// Downloaded assets by URI
///
/// The asset manager downloads every declared URI before a registry build
/// and hands builders the local paths.
pub type AssetMap = HashMap<String, PathBuf>;
