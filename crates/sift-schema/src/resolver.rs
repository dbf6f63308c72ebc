//! Schema registries
//!
//! A resolver answers `Found`, `NotFound` or `TransportError` for a schema
//! key. Registries compose into a chain tried in declaration order;
//! `NotFound` is only returned when every registry agrees.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

#[cfg(test)]
#[path = "resolver_test.rs"]
mod tests;

use crate::key::SchemaKey;

/// Outcome of a single resolution attempt
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The registry holds the schema
    Found(Arc<Value>),

    /// The registry authoritatively does not hold the schema
    NotFound,

    /// The registry could not be reached or answered garbage
    TransportError(String),
}

/// A source of schema documents
#[async_trait]
pub trait SchemaResolver: Send + Sync {
    async fn resolve(&self, key: &SchemaKey) -> Resolution;
}

/// Local directory registry
///
/// Schemas live at `<root>/schemas/<vendor>/<name>/<format>/<version>`,
/// the standard static-registry layout.
pub struct DirRegistry {
    root: PathBuf,
}

impl DirRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SchemaResolver for DirRegistry {
    async fn resolve(&self, key: &SchemaKey) -> Resolution {
        let path = self.root.join("schemas").join(key.as_path());
        match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(doc) => Resolution::Found(Arc::new(doc)),
                Err(e) => Resolution::TransportError(format!(
                    "invalid schema document at {}: {}",
                    path.display(),
                    e
                )),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Resolution::NotFound,
            Err(e) => Resolution::TransportError(e.to_string()),
        }
    }
}

/// HTTP registry
///
/// Fetches `<base>/schemas/<vendor>/<name>/<format>/<version>`.
pub struct HttpRegistry {
    base: String,
    client: reqwest::Client,
}

impl HttpRegistry {
    pub fn new(base: impl Into<String>, client: reqwest::Client) -> Self {
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self { base, client }
    }
}

#[async_trait]
impl SchemaResolver for HttpRegistry {
    async fn resolve(&self, key: &SchemaKey) -> Resolution {
        let url = format!("{}/schemas/{}", self.base, key.as_path());
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => return Resolution::TransportError(e.to_string()),
        };

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Resolution::NotFound;
        }
        if !response.status().is_success() {
            return Resolution::TransportError(format!(
                "registry returned {} for {}",
                response.status(),
                url
            ));
        }

        match response.json::<Value>().await {
            Ok(doc) => Resolution::Found(Arc::new(doc)),
            Err(e) => Resolution::TransportError(e.to_string()),
        }
    }
}

/// In-memory registry, used by tests and embedded schema sets
#[derive(Default)]
pub struct StaticRegistry {
    schemas: HashMap<String, Arc<Value>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, key: &str, doc: Value) -> Self {
        self.schemas.insert(key.to_string(), Arc::new(doc));
        self
    }

    pub fn insert(&mut self, key: &str, doc: Value) {
        self.schemas.insert(key.to_string(), Arc::new(doc));
    }
}

#[async_trait]
impl SchemaResolver for StaticRegistry {
    async fn resolve(&self, key: &SchemaKey) -> Resolution {
        match self.schemas.get(&key.to_string()) {
            Some(doc) => Resolution::Found(Arc::clone(doc)),
            None => Resolution::NotFound,
        }
    }
}

/// Chain of registries tried in order
///
/// First `Found` wins. A transport error is remembered but later registries
/// still get a chance; the chain only reports `NotFound` when every registry
/// said so.
pub struct ResolverChain {
    registries: Vec<Box<dyn SchemaResolver>>,
}

impl ResolverChain {
    pub fn new(registries: Vec<Box<dyn SchemaResolver>>) -> Self {
        Self { registries }
    }

    pub fn len(&self) -> usize {
        self.registries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }
}

#[async_trait]
impl SchemaResolver for ResolverChain {
    async fn resolve(&self, key: &SchemaKey) -> Resolution {
        let mut transport_error = None;

        for registry in &self.registries {
            match registry.resolve(key).await {
                Resolution::Found(doc) => return Resolution::Found(doc),
                Resolution::NotFound => {}
                Resolution::TransportError(e) => {
                    tracing::debug!(schema = %key, error = %e, "registry lookup failed");
                    transport_error = Some(e);
                }
            }
        }

        match transport_error {
            Some(e) => Resolution::TransportError(e),
            None => Resolution::NotFound,
        }
    }
}
