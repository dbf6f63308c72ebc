//! Protocol error types

use thiserror::Error;

/// Errors that can occur while decoding collector payloads
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Buffer ended before a complete value could be read
    #[error("truncated input: needed {needed} more bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    /// A field carried a wire type this decoder does not know
    #[error("unknown wire type {0}")]
    UnknownWireType(u8),

    /// A length prefix was negative or implausibly large
    #[error("invalid length {len} at offset {offset}")]
    InvalidLength { offset: usize, len: i32 },

    /// A string field was not valid UTF-8
    #[error("invalid utf-8 in field {field}")]
    InvalidUtf8 { field: &'static str },

    /// The payload decoded but is missing a field events cannot be built without
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The self-describing JSON body could not be parsed
    #[error("invalid payload body: {0}")]
    InvalidBody(String),

    /// The body declared a schema this engine does not accept
    #[error("unexpected body schema: {0}")]
    UnexpectedBodySchema(String),
}

impl ProtocolError {
    #[inline]
    pub fn truncated(offset: usize, needed: usize) -> Self {
        Self::Truncated { offset, needed }
    }

    #[inline]
    pub fn invalid_length(offset: usize, len: i32) -> Self {
        Self::InvalidLength { offset, len }
    }

    #[inline]
    pub fn invalid_body(msg: impl Into<String>) -> Self {
        Self::InvalidBody(msg.into())
    }
}
