//! Record decoder
//!
//! Front door for payload bytes coming off a source record: applies the size
//! gate, the optional base64 pre-pass, then the Thrift parse. Pure and
//! thread-safe; one instance is shared by all pipeline workers.

use base64::Engine;

use crate::badrow::FailureDetail;
use crate::payload::CollectorPayload;
use crate::{DEFAULT_MAX_RECORD_SIZE, SIZE_VIOLATION_PREVIEW};

#[cfg(test)]
#[path = "decoder_test.rs"]
mod tests;

/// Decoder configuration
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Records larger than this produce a size-violation bad row
    pub max_record_size: usize,

    /// Attempt a strict base64 decode of the record before the Thrift parse
    pub try_base64_decoding: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
            try_base64_decoding: false,
        }
    }
}

/// Shared, stateless payload decoder
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    config: DecoderConfig,
}

impl Decoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn max_record_size(&self) -> usize {
        self.config.max_record_size
    }

    /// Decode one source record into raw events
    ///
    /// Every failure is a value: the caller wraps it into a bad row together
    /// with the original payload bytes.
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<crate::RawEvent>, FailureDetail> {
        if bytes.len() > self.config.max_record_size {
            let preview_len = bytes.len().min(SIZE_VIOLATION_PREVIEW);
            return Err(FailureDetail::SizeViolation {
                actual_size: bytes.len(),
                maximum_allowed: self.config.max_record_size,
                payload_preview: String::from_utf8_lossy(&bytes[..preview_len]).into_owned(),
            });
        }

        let decoded;
        let effective: &[u8] = if self.config.try_base64_decoding {
            match base64::engine::general_purpose::STANDARD.decode(bytes) {
                Ok(plain) => {
                    decoded = plain;
                    &decoded
                }
                // Not base64: fall through to the raw bytes
                Err(_) => bytes,
            }
        } else {
            bytes
        };

        let payload = CollectorPayload::parse(effective).map_err(|e| {
            FailureDetail::AdapterFailure {
                message: e.to_string(),
            }
        })?;

        payload
            .into_raw_events()
            .map_err(|e| FailureDetail::AdapterFailure {
                message: e.to_string(),
            })
    }
}
