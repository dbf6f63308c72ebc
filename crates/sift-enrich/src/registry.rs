//! Enrichment registry
//!
//! The registry is an immutable snapshot of the active enrichment set. The
//! cell holding the current snapshot has one writer (the asset manager) and
//! many readers (pipeline workers); readers keep whatever snapshot they
//! captured alive until they drop it, so a swap never tears an in-flight
//! event.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::conf::{AssetMap, EnrichmentConf};
use crate::error::BuildError;
use crate::Enrichment;

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;

/// Enrichment execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnrichmentOrder {
    /// Declaration order from config
    #[default]
    Declared,

    /// The legacy permutation: declaration order reversed
    ///
    /// Kept for deployments whose downstream models grew to depend on the
    /// old context ordering.
    Legacy,
}

/// Factory for building one enrichment type from config
pub trait EnrichmentFactory: Send + Sync {
    /// Type name matched against `EnrichmentConf::name`
    fn name(&self) -> &'static str;

    /// Asset URIs this enrichment needs downloaded before `build`
    fn assets(&self, _parameters: &Value) -> Vec<String> {
        Vec::new()
    }

    /// Build an instance against pre-downloaded assets
    fn build(
        &self,
        parameters: &Value,
        assets: &AssetMap,
    ) -> Result<Box<dyn Enrichment>, BuildError>;
}

/// Immutable snapshot of the active enrichment set
pub struct Registry {
    enrichments: Vec<Box<dyn Enrichment>>,
    confs: Vec<EnrichmentConf>,
}

impl Registry {
    /// Registry over an explicit enrichment list, in execution order
    pub fn new(enrichments: Vec<Box<dyn Enrichment>>, confs: Vec<EnrichmentConf>) -> Self {
        Self { enrichments, confs }
    }

    /// Registry with no enrichments at all
    pub fn empty() -> Self {
        Self {
            enrichments: Vec::new(),
            confs: Vec::new(),
        }
    }

    /// Enrichments in execution order
    #[inline]
    pub fn enrichments(&self) -> &[Box<dyn Enrichment>] {
        &self.enrichments
    }

    /// The configs this registry was built from
    #[inline]
    pub fn confs(&self) -> &[EnrichmentConf] {
        &self.confs
    }

    pub fn len(&self) -> usize {
        self.enrichments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enrichments.is_empty()
    }

    /// Names in execution order, for logs
    pub fn names(&self) -> Vec<&'static str> {
        self.enrichments.iter().map(|e| e.name()).collect()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("enrichments", &self.names())
            .finish()
    }
}

/// The single cell holding the current registry
///
/// `snapshot` clones the inner `Arc` under a briefly-held read lock; the
/// lock is never held across an await point. `swap` publishes a fresh
/// snapshot; readers mid-event keep the old one alive until they finish.
pub struct RegistryCell {
    inner: RwLock<Arc<Registry>>,
}

impl RegistryCell {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            inner: RwLock::new(registry),
        }
    }

    /// Capture the current snapshot
    #[inline]
    pub fn snapshot(&self) -> Arc<Registry> {
        Arc::clone(&self.inner.read())
    }

    /// Publish a new snapshot
    pub fn swap(&self, registry: Arc<Registry>) {
        let mut guard = self.inner.write();
        tracing::info!(
            enrichments = ?registry.names(),
            "registry swapped"
        );
        *guard = registry;
    }
}

/// Named set of enrichment factories
pub struct FactorySet {
    factories: HashMap<&'static str, Box<dyn EnrichmentFactory>>,
}

impl FactorySet {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, factory: Box<dyn EnrichmentFactory>) {
        self.factories.insert(factory.name(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Asset URIs declared across a conf list (enabled confs only)
    pub fn declared_assets(&self, confs: &[EnrichmentConf]) -> Vec<String> {
        let mut uris = Vec::new();
        for conf in confs.iter().filter(|c| c.enabled) {
            if let Some(factory) = self.factories.get(conf.name.as_str()) {
                for uri in factory.assets(&conf.parameters) {
                    if !uris.contains(&uri) {
                        uris.push(uri);
                    }
                }
            }
        }
        uris
    }

    /// Build a registry from configs against pre-downloaded assets
    ///
    /// Any single builder failure fails the whole build: at startup that is
    /// fatal, at refresh the caller keeps the old registry.
    pub fn build_registry(
        &self,
        confs: &[EnrichmentConf],
        assets: &AssetMap,
        order: EnrichmentOrder,
    ) -> Result<Registry, BuildError> {
        let mut enrichments = Vec::new();

        for conf in confs.iter().filter(|c| c.enabled) {
            let factory = self
                .factories
                .get(conf.name.as_str())
                .ok_or_else(|| BuildError::UnknownType(conf.name.clone()))?;
            enrichments.push(factory.build(&conf.parameters, assets)?);
        }

        if order == EnrichmentOrder::Legacy {
            enrichments.reverse();
        }

        // The pseudonymiser must observe final field values, so it runs
        // last under either order.
        if let Some(pos) = enrichments
            .iter()
            .position(|e| e.name() == crate::pii::NAME)
        {
            let pii = enrichments.remove(pos);
            enrichments.push(pii);
        }

        Ok(Registry {
            enrichments,
            confs: confs.to_vec(),
        })
    }
}

impl Default for FactorySet {
    fn default() -> Self {
        Self::new()
    }
}

/// Factory set with every built-in enrichment registered
pub fn builtin_factories() -> FactorySet {
    let mut set = FactorySet::new();
    set.register(Box::new(crate::anon_ip::Factory));
    set.register(Box::new(crate::api_request::Factory));
    set.register(Box::new(crate::campaign::Factory));
    set.register(Box::new(crate::fingerprint::Factory));
    set.register(Box::new(crate::ip_lookups::Factory));
    set.register(Box::new(crate::pii::Factory));
    set.register(Box::new(crate::referer::Factory));
    set.register(Box::new(crate::ua_parser::Factory));
    set
}
