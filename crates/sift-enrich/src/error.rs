//! Enrichment error types

use thiserror::Error;

/// Why an enrichment could not be built from its config
#[derive(Debug, Error)]
pub enum BuildError {
    /// The config names an enrichment type nobody registered
    #[error("unknown enrichment type '{0}'")]
    UnknownType(String),

    /// The enrichment's parameter table is invalid
    #[error("invalid parameters for '{enrichment}': {message}")]
    InvalidParameters {
        enrichment: String,
        message: String,
    },

    /// A declared asset was not downloaded before the build
    #[error("missing asset for '{enrichment}': {uri}")]
    MissingAsset { enrichment: String, uri: String },

    /// An asset file exists but could not be opened or parsed
    #[error("unusable asset for '{enrichment}': {message}")]
    UnusableAsset {
        enrichment: String,
        message: String,
    },
}

impl BuildError {
    pub fn invalid_parameters(enrichment: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameters {
            enrichment: enrichment.into(),
            message: message.into(),
        }
    }

    pub fn unusable_asset(enrichment: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnusableAsset {
            enrichment: enrichment.into(),
            message: message.into(),
        }
    }
}

/// What went wrong inside one enrichment for one event
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{enrichment}: {kind}")]
pub struct EnrichmentFailure {
    /// Name of the enrichment that failed
    pub enrichment: &'static str,

    pub kind: FailureKind,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FailureKind {
    /// An external lookup failed (HTTP error, unexpected response shape)
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// The event carried input the enrichment cannot work with
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The enrichment exceeded the per-event deadline
    #[error("timed out")]
    Timeout,
}

impl EnrichmentFailure {
    pub fn lookup(enrichment: &'static str, message: impl Into<String>) -> Self {
        Self {
            enrichment,
            kind: FailureKind::Lookup(message.into()),
        }
    }

    pub fn invalid_input(enrichment: &'static str, message: impl Into<String>) -> Self {
        Self {
            enrichment,
            kind: FailureKind::InvalidInput(message.into()),
        }
    }

    pub fn timeout(enrichment: &'static str) -> Self {
        Self {
            enrichment,
            kind: FailureKind::Timeout,
        }
    }
}
