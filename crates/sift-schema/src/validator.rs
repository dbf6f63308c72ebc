//! Schema validator
//!
//! Resolves schema documents through the configured resolver and checks
//! entities against them. Two bounded caches keep the hot path off the
//! registry: one for schema documents, one for recent `(schema, data)`
//! outcomes.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use serde_json::Value;
use thiserror::Error;

use crate::key::SchemaKey;
use crate::resolver::{Resolution, SchemaResolver};
use crate::subset;

#[cfg(test)]
#[path = "validator_test.rs"]
mod tests;

/// Validator configuration
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Bounded schema-document cache size
    pub schema_cache_size: u64,

    /// Bounded validation-outcome cache size
    pub result_cache_size: u64,

    /// Resolution attempts before a transport error becomes terminal
    pub max_attempts: u32,

    /// First retry delay; doubles per attempt
    pub initial_backoff: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            schema_cache_size: 1_000,
            result_cache_size: 10_000,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

/// Why a validation did not succeed
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaFailure {
    /// The data does not conform to the schema
    #[error("{key}: {}", messages.join("; "))]
    ValidationErrors { key: String, messages: Vec<String> },

    /// No registry holds the schema
    #[error("schema not found: {key}")]
    NotFound { key: String },

    /// The registries could not be reached after retries
    #[error("could not resolve {key}: {message}")]
    ResolutionError { key: String, message: String },
}

/// Shared schema validator
///
/// Cheap to clone; all clones share the caches and the resolver.
#[derive(Clone)]
pub struct SchemaValidator {
    resolver: Arc<dyn SchemaResolver>,
    schema_cache: Cache<String, Arc<Value>>,
    result_cache: Cache<(String, u64), Result<(), SchemaFailure>>,
    config: ValidatorConfig,
}

impl SchemaValidator {
    pub fn new(resolver: Arc<dyn SchemaResolver>, config: ValidatorConfig) -> Self {
        Self {
            resolver,
            schema_cache: Cache::new(config.schema_cache_size),
            result_cache: Cache::new(config.result_cache_size),
            config,
        }
    }

    /// Validate `data` against the schema identified by `key`
    pub async fn validate(&self, key: &SchemaKey, data: &Value) -> Result<(), SchemaFailure> {
        let cache_key = (key.to_string(), hash_value(data));
        if let Some(outcome) = self.result_cache.get(&cache_key) {
            return outcome;
        }

        let outcome = self.validate_uncached(key, data).await;

        // Transport errors are transient; caching them would pin a flaky
        // registry's bad moment for 10k subsequent events.
        if !matches!(outcome, Err(SchemaFailure::ResolutionError { .. })) {
            self.result_cache.insert(cache_key, outcome.clone());
        }
        outcome
    }

    /// Validate a self-describing `{schema, data}` entity
    pub async fn validate_entity(&self, entity: &Value) -> Result<(), SchemaFailure> {
        let key_str = entity.get("schema").and_then(Value::as_str).unwrap_or("");
        let Some(key) = SchemaKey::parse(key_str) else {
            return Err(SchemaFailure::ValidationErrors {
                key: key_str.to_string(),
                messages: vec!["entity has no valid schema key".to_string()],
            });
        };
        let data = entity.get("data").unwrap_or(&Value::Null);
        self.validate(&key, data).await
    }

    async fn validate_uncached(&self, key: &SchemaKey, data: &Value) -> Result<(), SchemaFailure> {
        let schema = self.fetch_schema(key).await?;

        let mut messages = Vec::new();
        subset::check(&schema, data, &mut messages);

        if messages.is_empty() {
            Ok(())
        } else {
            Err(SchemaFailure::ValidationErrors {
                key: key.to_string(),
                messages,
            })
        }
    }

    /// Fetch a schema document, retrying transport errors with backoff
    async fn fetch_schema(&self, key: &SchemaKey) -> Result<Arc<Value>, SchemaFailure> {
        let key_str = key.to_string();
        if let Some(doc) = self.schema_cache.get(&key_str) {
            return Ok(doc);
        }

        let mut backoff = self.config.initial_backoff;
        let mut last_error = String::new();

        for attempt in 1..=self.config.max_attempts {
            match self.resolver.resolve(key).await {
                Resolution::Found(doc) => {
                    self.schema_cache.insert(key_str, Arc::clone(&doc));
                    return Ok(doc);
                }
                Resolution::NotFound => {
                    return Err(SchemaFailure::NotFound { key: key_str });
                }
                Resolution::TransportError(e) => {
                    tracing::warn!(
                        schema = %key_str,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %e,
                        "schema resolution failed"
                    );
                    last_error = e;
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        Err(SchemaFailure::ResolutionError {
            key: key_str,
            message: last_error,
        })
    }
}

/// Structural hash of a JSON value, used as the outcome-cache key
fn hash_value(value: &Value) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    hash_value_into(value, &mut hasher);
    hasher.finish()
}

fn hash_value_into(value: &Value, hasher: &mut impl Hasher) {
    match value {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => (1u8, b).hash(hasher),
        Value::Number(n) => (2u8, n.to_string()).hash(hasher),
        Value::String(s) => (3u8, s).hash(hasher),
        Value::Array(items) => {
            (4u8, items.len()).hash(hasher);
            for item in items {
                hash_value_into(item, hasher);
            }
        }
        Value::Object(obj) => {
            // serde_json preserves insertion order; hash key-sorted so
            // logically-equal objects collide.
            (5u8, obj.len()).hash(hasher);
            let mut keys: Vec<&String> = obj.keys().collect();
            keys.sort();
            for k in keys {
                k.hash(hasher);
                hash_value_into(&obj[k], hasher);
            }
        }
    }
}
