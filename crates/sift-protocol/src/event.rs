//! Raw event model
//!
//! A `RawEvent` is one unenriched event: the tracker parameter map plus the
//! envelope fields shared by every event bundled in the same collector
//! payload.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Envelope fields shared by all events of one collector payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    /// When the collector received the payload
    pub collector_tstamp: Option<DateTime<Utc>>,

    /// Collector artifact name and version (e.g. "ssc-2.9.0-kinesis")
    pub collector: Option<String>,

    /// Client IP as seen by the collector
    pub ip_address: Option<String>,

    /// Raw User-Agent header
    pub user_agent: Option<String>,

    /// Referer URI forwarded by the collector
    pub referer_uri: Option<String>,

    /// Host the payload was posted to
    pub hostname: Option<String>,

    /// Third-party network user id (collector cookie)
    pub network_user_id: Option<String>,

    /// Request headers the collector chose to forward
    pub headers: Vec<String>,
}

/// One unenriched event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEvent {
    /// Tracker protocol parameters (e.g. `e`, `aid`, `p`, `url`)
    pub parameters: HashMap<String, String>,

    /// Shared payload envelope
    pub envelope: Envelope,
}

impl RawEvent {
    pub fn new(parameters: HashMap<String, String>, envelope: Envelope) -> Self {
        Self {
            parameters,
            envelope,
        }
    }

    /// Look up a tracker parameter
    #[inline]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// JSON rendering of the parameter map, used by bad rows
    pub fn parameters_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.parameters
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        )
    }
}
