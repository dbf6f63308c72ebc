//! Sift - Assets
//!
//! Reference-data lifecycle: the pause gate that holds the pipeline at its
//! entry, and the manager that re-downloads enrichment assets and swaps a
//! freshly-built registry in without stopping ingestion.
//!
//! # Swap protocol
//!
//! ```text
//! download changed assets to temp paths
//!         │ (nothing changed → done)
//!         ↓
//! close gate ──→ wait for in-flight events to drain
//!         ↓
//! rename temp files onto live paths   (backups kept)
//!         ↓
//! rebuild registry from configs ──→ swap the cell
//!         ↓                             │ (failure → restore backups,
//! open gate ←──────────────────────────┘  keep old registry)
//! ```
//!
//! The pause is brief and bounded. It exists so a reader never observes a
//! half-replaced file set, and so asset files need no reader-side locking.

mod gate;
mod manager;
mod state;

pub use gate::{InFlightGuard, InFlightTracker, PauseGate};
pub use manager::{AssetError, AssetManager, AssetManagerConfig};
pub use state::{asset_file_name, AssetEntry, AssetState};
