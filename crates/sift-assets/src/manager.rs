//! Asset manager
//!
//! Owns the asset files on disk and the refresh loop. Downloads are always
//! written to temp paths first; live paths only ever change by atomic
//! rename while the gate is closed and the pipeline is drained.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use sift_enrich::{
    AssetMap, BuildError, EnrichmentConf, EnrichmentOrder, FactorySet, Registry, RegistryCell,
};

use crate::gate::{InFlightTracker, PauseGate};
use crate::state::{asset_file_name, AssetState};

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;

/// How long the manager waits for in-flight events before abandoning a swap
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Asset manager configuration
#[derive(Debug, Clone)]
pub struct AssetManagerConfig {
    /// Directory holding one file per asset URI
    pub cache_dir: PathBuf,

    /// Refresh interval; `None` leaves the manager inert after startup
    pub update_period: Option<Duration>,

    /// Enrichment execution order used for every registry build
    pub order: EnrichmentOrder,
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to fetch {uri}: {message}")]
    Fetch { uri: String, message: String },

    #[error("unsupported asset scheme in {0}")]
    UnsupportedScheme(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("pipeline did not drain within {0:?}")]
    DrainTimeout(Duration),
}

/// Downloads assets and rebuilds/swaps the registry
pub struct AssetManager {
    config: AssetManagerConfig,
    confs: Vec<EnrichmentConf>,
    factories: Arc<FactorySet>,
    cell: Arc<RegistryCell>,
    gate: Arc<PauseGate>,
    in_flight: Arc<InFlightTracker>,
    http: reqwest::Client,
    state: AssetState,
}

impl AssetManager {
    pub fn new(
        config: AssetManagerConfig,
        confs: Vec<EnrichmentConf>,
        factories: Arc<FactorySet>,
        cell: Arc<RegistryCell>,
        gate: Arc<PauseGate>,
        in_flight: Arc<InFlightTracker>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            config,
            confs,
            factories,
            cell,
            gate,
            in_flight,
            http,
            state: AssetState::new(),
        }
    }

    /// Declared asset URIs across all enabled enrichments
    fn declared_uris(&self) -> Vec<String> {
        self.factories.declared_assets(&self.confs)
    }

    fn live_path(&self, uri: &str) -> PathBuf {
        self.config.cache_dir.join(asset_file_name(uri))
    }

    /// Startup sequence: download everything, build, swap, open the gate
    ///
    /// Any failure here is fatal; the process must not start ingesting
    /// without its reference data.
    pub async fn bootstrap(&mut self) -> Result<(), AssetError> {
        tokio::fs::create_dir_all(&self.config.cache_dir).await?;

        let uris = self.declared_uris();
        let mut assets = AssetMap::new();

        for uri in &uris {
            let live = self.live_path(uri);
            let bytes = self.fetch(uri).await?;
            let hash = hex::encode(Sha256::digest(&bytes));

            let temp = live.with_extension("tmp");
            tokio::fs::write(&temp, &bytes).await?;
            tokio::fs::rename(&temp, &live).await?;

            tracing::info!(uri = %uri, path = %live.display(), bytes = bytes.len(), "asset downloaded");
            self.state.record(uri, &live, hash);
            assets.insert(uri.clone(), live);
        }

        let registry =
            self.factories
                .build_registry(&self.confs, &assets, self.config.order)?;
        self.cell.swap(Arc::new(registry));
        self.gate.open();

        tracing::info!(assets = uris.len(), "asset bootstrap complete");
        Ok(())
    }

    /// Run the refresh loop until cancelled
    ///
    /// Inert when no update period is configured: the method parks on the
    /// cancellation token so callers can spawn it unconditionally.
    pub async fn run(mut self, cancel: CancellationToken) {
        let Some(period) = self.config.update_period else {
            cancel.cancelled().await;
            return;
        };

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick fires immediately; skip it, bootstrap just ran
        interval.tick().await;

        tracing::info!(period_secs = period.as_secs(), "asset refresh loop started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.refresh().await {
                        Ok(true) => tracing::info!("assets refreshed, registry swapped"),
                        Ok(false) => tracing::debug!("assets unchanged"),
                        Err(e) => tracing::warn!(error = %e, "asset refresh failed, keeping current registry"),
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::info!("asset refresh loop stopping");
                    break;
                }
            }
        }
    }

    /// One refresh cycle
    ///
    /// Returns `Ok(true)` when a new registry was swapped in, `Ok(false)`
    /// when nothing changed. On error the previous files and registry stay
    /// live and the gate ends up open.
    pub async fn refresh(&mut self) -> Result<bool, AssetError> {
        let uris = self.declared_uris();

        // Phase 1: fetch everything to temp paths, find what changed.
        let mut staged: Vec<(String, PathBuf)> = Vec::new();
        let mut changed = false;

        for uri in &uris {
            let bytes = match self.fetch(uri).await {
                Ok(b) => b,
                Err(e) => {
                    // All-or-nothing: one failed fetch abandons the cycle.
                    self.cleanup_staged(&staged).await;
                    return Err(e);
                }
            };
            let hash = hex::encode(Sha256::digest(&bytes));
            if self.state.hash_of(uri) == Some(hash.as_str()) {
                continue;
            }

            let temp = self.live_path(uri).with_extension("staged");
            if let Err(e) = tokio::fs::write(&temp, &bytes).await {
                self.cleanup_staged(&staged).await;
                return Err(e.into());
            }
            tracing::info!(uri = %uri, "asset changed");
            staged.push((uri.clone(), temp));
            changed = true;
        }

        if !changed {
            return Ok(false);
        }

        // Phase 2: stop the world (briefly) and swap.
        self.gate.close();
        let drained = self.in_flight.wait_idle_timeout(DRAIN_TIMEOUT).await;
        if !drained {
            self.gate.open();
            self.cleanup_staged(&staged).await;
            return Err(AssetError::DrainTimeout(DRAIN_TIMEOUT));
        }

        let result = self.install_staged(&staged).await;
        self.gate.open();

        match result {
            Ok(()) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Rename staged files onto live paths, rebuild and swap the registry
    ///
    /// On any failure the previous files are restored from backups and the
    /// old registry stays active.
    async fn install_staged(&mut self, staged: &[(String, PathBuf)]) -> Result<(), AssetError> {
        let mut backups: Vec<(PathBuf, PathBuf)> = Vec::new();

        let install = async {
            for (uri, temp) in staged {
                let live = self.live_path(uri);
                let backup = live.with_extension("bak");
                if tokio::fs::metadata(&live).await.is_ok() {
                    tokio::fs::rename(&live, &backup).await?;
                    backups.push((backup, live.clone()));
                }
                tokio::fs::rename(temp, &live).await?;
            }

            let mut assets = AssetMap::new();
            for uri in self.declared_uris() {
                let live = self.live_path(&uri);
                assets.insert(uri, live);
            }

            let registry =
                self.factories
                    .build_registry(&self.confs, &assets, self.config.order)?;
            Ok::<Registry, AssetError>(registry)
        };

        let installed = install.await;

        match installed {
            Ok(registry) => {
                for (uri, _) in staged {
                    let live = self.live_path(uri);
                    if let Ok(bytes) = tokio::fs::read(&live).await {
                        let hash = hex::encode(Sha256::digest(&bytes));
                        self.state.record(uri, &live, hash);
                    }
                }
                for (backup, _) in &backups {
                    let _ = tokio::fs::remove_file(backup).await;
                }
                self.cell.swap(Arc::new(registry));
                Ok(())
            }
            Err(e) => {
                for (backup, live) in backups.iter().rev() {
                    if let Err(restore_err) = tokio::fs::rename(backup, live).await {
                        tracing::error!(
                            path = %live.display(),
                            error = %restore_err,
                            "failed to restore asset backup"
                        );
                    }
                }
                self.cleanup_staged(staged).await;
                Err(e)
            }
        }
    }

    async fn cleanup_staged(&self, staged: &[(String, PathBuf)]) {
        for (_, temp) in staged {
            let _ = tokio::fs::remove_file(temp).await;
        }
    }

    /// Fetch an asset's bytes; `file://` and `http(s)://` are supported
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, AssetError> {
        if let Some(path) = uri.strip_prefix("file://") {
            return tokio::fs::read(path).await.map_err(|e| AssetError::Fetch {
                uri: uri.to_string(),
                message: e.to_string(),
            });
        }

        if uri.starts_with("http://") || uri.starts_with("https://") {
            let response = self
                .http
                .get(uri)
                .send()
                .await
                .map_err(|e| AssetError::Fetch {
                    uri: uri.to_string(),
                    message: e.to_string(),
                })?;
            if !response.status().is_success() {
                return Err(AssetError::Fetch {
                    uri: uri.to_string(),
                    message: format!("status {}", response.status()),
                });
            }
            let bytes = response.bytes().await.map_err(|e| AssetError::Fetch {
                uri: uri.to_string(),
                message: e.to_string(),
            })?;
            return Ok(bytes.to_vec());
        }

        Err(AssetError::UnsupportedScheme(uri.to_string()))
    }
}
