//! Asset bookkeeping

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};

/// Deterministic local file name for an asset URI
pub fn asset_file_name(uri: &str) -> String {
    hex::encode(Sha256::digest(uri.as_bytes()))
}

/// What the manager knows about one downloaded asset
#[derive(Debug, Clone)]
pub struct AssetEntry {
    pub uri: String,
    pub local_path: PathBuf,
    /// SHA-256 of the file contents, hex
    pub content_hash: String,
    pub last_fetched_at: SystemTime,
}

/// All assets by URI; owned exclusively by the asset manager
#[derive(Debug, Default)]
pub struct AssetState {
    entries: HashMap<String, AssetEntry>,
}

impl AssetState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uri: &str) -> Option<&AssetEntry> {
        self.entries.get(uri)
    }

    pub fn record(&mut self, uri: &str, local_path: &Path, content_hash: String) {
        self.entries.insert(
            uri.to_string(),
            AssetEntry {
                uri: uri.to_string(),
                local_path: local_path.to_path_buf(),
                content_hash,
                last_fetched_at: SystemTime::now(),
            },
        );
    }

    /// Known content hash for an URI, if any
    pub fn hash_of(&self, uri: &str) -> Option<&str> {
        self.entries.get(uri).map(|e| e.content_hash.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
