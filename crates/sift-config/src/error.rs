//! Configuration error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Config parsed but is semantically invalid
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The limited-use license was not accepted
    #[error(
        "license not accepted: set license.accept = true in the config \
         or run with ACCEPT_LIMITED_USE_LICENSE=1"
    )]
    LicenseNotAccepted,
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}
