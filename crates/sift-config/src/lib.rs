//! Sift Configuration
//!
//! TOML-based configuration loading with sensible defaults. A minimal
//! config names an input and the good/bad outputs; everything else has a
//! working default.
//!
//! # Example Minimal Config
//!
//! ```toml
//! [input]
//! type = "file"
//! path = "payloads.b64"
//!
//! [output.good]
//! type = "stdout"
//!
//! [output.bad]
//! type = "stdout"
//! ```

mod error;
mod license;

pub use error::{ConfigError, Result};
pub use license::{license_accepted, LicenseConfig, LICENSE_ENV_VAR};

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Record source; required
    pub input: Option<InputConfig>,

    /// The three output destinations
    pub output: OutputConfig,

    /// Worker parallelism
    pub concurrency: ConcurrencyConfig,

    /// Asset cache and refresh
    pub assets: AssetsConfig,

    /// Upper bound on one source record, bytes
    pub max_record_size: Option<usize>,

    /// Behaviour toggles
    pub feature_flags: FeatureFlags,

    /// Atomic field names copied into good/pii sink attributes
    pub attributes: Vec<String>,

    /// Enrichment instances, in execution order
    pub enrichments: Vec<EnrichmentEntry>,

    /// Schema registries, tried in order
    pub iglu: IgluConfig,

    /// Metrics and error reporting
    pub monitoring: MonitoringConfig,

    /// Anonymous usage reporting (recognised, off by default)
    pub telemetry: TelemetryConfig,

    /// License acceptance
    pub license: LicenseConfig,
}

/// Source driver selection
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum InputConfig {
    /// Newline-delimited base64 payloads from a file
    File {
        path: PathBuf,
        /// Where the committed offset is persisted; absent disables it
        checkpoint_path: Option<PathBuf>,
    },
}

/// Sink driver selection
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum SinkConfig {
    Stdout,
    File { path: PathBuf },
    Null,
}

/// The good / pii / bad destinations
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub good: SinkConfig,
    pub pii: Option<SinkConfig>,
    pub bad: SinkConfig,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            good: SinkConfig::Stdout,
            pii: None,
            bad: SinkConfig::Stdout,
        }
    }
}

/// Worker parallelism
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConcurrencyConfig {
    /// Pipeline workers and work-queue bound
    pub enrich: usize,

    /// Concurrent sink writes
    pub sink: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            enrich: 8,
            sink: 8,
        }
    }
}

/// Asset cache and refresh settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetsConfig {
    /// Directory holding one file per asset URI
    pub cache_dir: PathBuf,

    /// Refresh interval in seconds; absent disables refresh
    pub update_period_secs: Option<u64>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("assets"),
            update_period_secs: None,
        }
    }
}

/// Behaviour toggles
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeatureFlags {
    /// Validation failures go to good with a diagnostic context
    pub accept_invalid: bool,

    /// Revert to the legacy enrichment permutation
    pub legacy_enrichment_order: bool,

    /// Attempt base64 decode of records before the Thrift parse
    pub try_base64_decoding: bool,
}

/// One enrichment instance
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnrichmentEntry {
    /// Enrichment type name (e.g. "ip_lookups")
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Enrichment-specific parameter table
    #[serde(default = "empty_table")]
    pub parameters: toml::Value,
}

fn default_true() -> bool {
    true
}

fn empty_table() -> toml::Value {
    toml::Value::Table(toml::map::Map::new())
}

impl EnrichmentEntry {
    /// Parameters as JSON, the form enrichment factories consume
    pub fn parameters_json(&self) -> serde_json::Value {
        toml_to_json(&self.parameters)
    }
}

/// Schema registry selection
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IgluConfig {
    pub registries: Vec<RegistryConfig>,
}

/// One schema registry
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum RegistryConfig {
    /// Local directory in the standard static layout
    Dir { path: PathBuf },

    /// Remote registry over HTTP
    Http { uri: String },
}

/// Metrics and error reporting
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitoringConfig {
    /// Interval of the metrics log line, seconds; absent disables it
    pub metrics_interval_secs: Option<u64>,

    /// Error-reporting DSN; recognised and recorded, wiring is deploy-side
    pub sentry_dsn: Option<String>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_interval_secs: Some(60),
            sentry_dsn: None,
        }
    }
}

/// Anonymous usage reporting
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    pub enabled: bool,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation beyond what serde enforces
    fn validate(&self) -> Result<()> {
        if self.concurrency.enrich == 0 {
            return Err(ConfigError::invalid("concurrency.enrich must be > 0"));
        }
        if self.concurrency.sink == 0 {
            return Err(ConfigError::invalid("concurrency.sink must be > 0"));
        }
        if self.max_record_size == Some(0) {
            return Err(ConfigError::invalid("max_record_size must be > 0"));
        }
        if self.assets.update_period_secs == Some(0) {
            return Err(ConfigError::invalid("assets.update_period_secs must be > 0"));
        }
        for entry in &self.enrichments {
            if entry.name.is_empty() {
                return Err(ConfigError::invalid("enrichment entry with empty name"));
            }
        }
        Ok(())
    }

    /// The input section, or an error naming what is missing
    pub fn require_input(&self) -> Result<&InputConfig> {
        self.input
            .as_ref()
            .ok_or_else(|| ConfigError::invalid("missing required [input] section"))
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Convert a TOML value into the JSON form factories consume
fn toml_to_json(value: &toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s.clone()),
        toml::Value::Integer(i) => serde_json::Value::from(*i),
        toml::Value::Float(f) => {
            serde_json::Number::from_f64(*f).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }
        toml::Value::Boolean(b) => serde_json::Value::Bool(*b),
        toml::Value::Datetime(d) => serde_json::Value::String(d.to_string()),
        toml::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .iter()
                .map(|(k, v)| (k.clone(), toml_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
