//! Sift - Protocol
//!
//! The wire-facing data model: collector payload decoding, the raw and
//! enriched event structures, and bad-row construction.
//!
//! # Overview
//!
//! ```text
//! [payload bytes] → CollectorPayload::parse → [RawEvent, ...]
//!                                                  │
//!                                             (enrichment)
//!                                                  ↓
//!                                            EnrichedEvent ──→ TSV + attributes
//!                                                  │
//!                                              (failure)
//!                                                  ↓
//!                                               BadRow ──────→ JSON
//! ```
//!
//! # Design
//!
//! - **Pure**: nothing in this crate performs I/O; decoding is a function of
//!   the input bytes and the decoder configuration
//! - **Failures are values**: a malformed payload produces a `FailureDetail`,
//!   never a panic; the pipeline turns it into a bad row

mod badrow;
mod decoder;
mod enriched;
mod error;
mod event;
mod payload;
mod thrift;

pub use badrow::{
    BadRow, BadRowBuilder, FailureDetail, Processor, ADAPTER_FAILURES_SCHEMA,
    ENRICHMENT_FAILURES_SCHEMA, GENERIC_ERROR_SCHEMA, SCHEMA_VIOLATIONS_SCHEMA,
    SIZE_VIOLATION_SCHEMA,
};
pub use decoder::{Decoder, DecoderConfig};
pub use enriched::{EnrichedEvent, PiiField, ATOMIC_FIELD_NAMES, CONTEXTS_SCHEMA};
pub use error::ProtocolError;
pub use event::{Envelope, RawEvent};
pub use payload::CollectorPayload;
pub use thrift::{ThriftReader, ThriftWriter, TType};

/// Default upper bound on a single source record, in bytes
pub const DEFAULT_MAX_RECORD_SIZE: usize = 1_048_576;

/// Bytes of payload retained in a size-violation bad row
pub const SIZE_VIOLATION_PREVIEW: usize = 32 * 1024;

/// Schema key carried by well-formed collector payloads
pub const PAYLOAD_SCHEMA: &str = "iglu:com.sift/collector_payload/thrift/1-0-0";

/// Schema key of the self-describing body bundling multiple events
pub const PAYLOAD_DATA_SCHEMA: &str = "iglu:com.sift/payload_data/jsonschema/1-0-4";
