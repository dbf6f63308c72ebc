//! Collector payload parsing
//!
//! The collector emits a Thrift-binary struct per HTTP request. One payload
//! expands to zero or more raw events: a GET carries a single event in its
//! querystring; a POST body may bundle many events in a self-describing
//! JSON document.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::ProtocolError;
use crate::event::{Envelope, RawEvent};
use crate::thrift::{ThriftReader, ThriftWriter, TType};
use crate::PAYLOAD_DATA_SCHEMA;

#[cfg(test)]
#[path = "payload_test.rs"]
mod tests;

// Field ids of the collector payload Thrift struct.
const FIELD_SCHEMA: i16 = 31337;
const FIELD_IP_ADDRESS: i16 = 100;
const FIELD_TIMESTAMP: i16 = 200;
const FIELD_ENCODING: i16 = 210;
const FIELD_COLLECTOR: i16 = 220;
const FIELD_USER_AGENT: i16 = 300;
const FIELD_REFERER_URI: i16 = 310;
const FIELD_PATH: i16 = 320;
const FIELD_QUERYSTRING: i16 = 330;
const FIELD_BODY: i16 = 340;
const FIELD_CONTENT_TYPE: i16 = 350;
const FIELD_HOSTNAME: i16 = 360;
const FIELD_NETWORK_USER_ID: i16 = 400;
const FIELD_HEADERS: i16 = 410;

/// Decoded collector payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectorPayload {
    pub schema: Option<String>,
    pub ip_address: Option<String>,
    /// Collector receipt time, milliseconds since the epoch
    pub timestamp: Option<i64>,
    pub encoding: Option<String>,
    pub collector: Option<String>,
    pub user_agent: Option<String>,
    pub referer_uri: Option<String>,
    pub path: Option<String>,
    pub querystring: Option<String>,
    pub body: Option<String>,
    pub content_type: Option<String>,
    pub hostname: Option<String>,
    pub network_user_id: Option<String>,
    pub headers: Vec<String>,
}

impl CollectorPayload {
    /// Parse a Thrift-binary collector payload
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = ThriftReader::new(bytes);
        let mut payload = Self::default();

        while let Some((ttype, id)) = reader.read_field_header()? {
            match (id, ttype) {
                (FIELD_SCHEMA, TType::String) => {
                    payload.schema = Some(reader.read_string("schema")?);
                }
                (FIELD_IP_ADDRESS, TType::String) => {
                    payload.ip_address = Some(reader.read_string("ip_address")?);
                }
                (FIELD_TIMESTAMP, TType::I64) => {
                    payload.timestamp = Some(reader.read_i64()?);
                }
                (FIELD_ENCODING, TType::String) => {
                    payload.encoding = Some(reader.read_string("encoding")?);
                }
                (FIELD_COLLECTOR, TType::String) => {
                    payload.collector = Some(reader.read_string("collector")?);
                }
                (FIELD_USER_AGENT, TType::String) => {
                    payload.user_agent = Some(reader.read_string("user_agent")?);
                }
                (FIELD_REFERER_URI, TType::String) => {
                    payload.referer_uri = Some(reader.read_string("referer_uri")?);
                }
                (FIELD_PATH, TType::String) => {
                    payload.path = Some(reader.read_string("path")?);
                }
                (FIELD_QUERYSTRING, TType::String) => {
                    payload.querystring = Some(reader.read_string("querystring")?);
                }
                (FIELD_BODY, TType::String) => {
                    payload.body = Some(reader.read_string("body")?);
                }
                (FIELD_CONTENT_TYPE, TType::String) => {
                    payload.content_type = Some(reader.read_string("content_type")?);
                }
                (FIELD_HOSTNAME, TType::String) => {
                    payload.hostname = Some(reader.read_string("hostname")?);
                }
                (FIELD_NETWORK_USER_ID, TType::String) => {
                    payload.network_user_id = Some(reader.read_string("network_user_id")?);
                }
                (FIELD_HEADERS, TType::List) => {
                    let (elem, count) = reader.read_list_header()?;
                    if elem != TType::String {
                        for _ in 0..count {
                            reader.skip(elem)?;
                        }
                    } else {
                        let mut headers = Vec::with_capacity(count);
                        for _ in 0..count {
                            headers.push(reader.read_string("headers")?);
                        }
                        payload.headers = headers;
                    }
                }
                // Unknown field or unexpected type: skip, stay decodable
                (_, other) => reader.skip(other)?,
            }
        }

        // A payload with none of the identifying fields set is not a payload
        // at all; treat it as malformed rather than emitting an empty event.
        if payload.collector.is_none() && payload.timestamp.is_none() && payload.schema.is_none() {
            return Err(ProtocolError::MissingField("collector"));
        }

        Ok(payload)
    }

    /// Encode back to Thrift-binary bytes
    ///
    /// Used by the file source round trip and by tests.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ThriftWriter::new();
        if let Some(ref v) = self.ip_address {
            w.write_string_field(FIELD_IP_ADDRESS, v);
        }
        if let Some(v) = self.timestamp {
            w.write_i64_field(FIELD_TIMESTAMP, v);
        }
        if let Some(ref v) = self.encoding {
            w.write_string_field(FIELD_ENCODING, v);
        }
        if let Some(ref v) = self.collector {
            w.write_string_field(FIELD_COLLECTOR, v);
        }
        if let Some(ref v) = self.user_agent {
            w.write_string_field(FIELD_USER_AGENT, v);
        }
        if let Some(ref v) = self.referer_uri {
            w.write_string_field(FIELD_REFERER_URI, v);
        }
        if let Some(ref v) = self.path {
            w.write_string_field(FIELD_PATH, v);
        }
        if let Some(ref v) = self.querystring {
            w.write_string_field(FIELD_QUERYSTRING, v);
        }
        if let Some(ref v) = self.body {
            w.write_string_field(FIELD_BODY, v);
        }
        if let Some(ref v) = self.content_type {
            w.write_string_field(FIELD_CONTENT_TYPE, v);
        }
        if let Some(ref v) = self.hostname {
            w.write_string_field(FIELD_HOSTNAME, v);
        }
        if let Some(ref v) = self.network_user_id {
            w.write_string_field(FIELD_NETWORK_USER_ID, v);
        }
        if !self.headers.is_empty() {
            w.write_string_list_field(FIELD_HEADERS, &self.headers);
        }
        if let Some(ref v) = self.schema {
            w.write_string_field(FIELD_SCHEMA, v);
        }
        w.finish()
    }

    /// Expand the payload into raw events
    ///
    /// - querystring present → one event from its parameters
    /// - JSON body → one event per entry of the self-describing `data` array
    /// - form body → one event from the body parameters
    /// - none of the above → zero events
    pub fn into_raw_events(self) -> Result<Vec<RawEvent>, ProtocolError> {
        let envelope = self.envelope();

        if let Some(qs) = self.querystring.as_deref().filter(|s| !s.is_empty()) {
            let parameters = parse_form(qs);
            return Ok(vec![RawEvent::new(parameters, envelope)]);
        }

        let Some(body) = self.body.as_deref().filter(|s| !s.is_empty()) else {
            return Ok(Vec::new());
        };

        match self.content_type.as_deref() {
            Some(ct) if ct.starts_with("application/json") => {
                let events = parse_json_body(body)?
                    .into_iter()
                    .map(|parameters| RawEvent::new(parameters, envelope.clone()))
                    .collect();
                Ok(events)
            }
            Some(ct) if ct.starts_with("application/x-www-form-urlencoded") => {
                Ok(vec![RawEvent::new(parse_form(body), envelope)])
            }
            // Trackers historically omit the content type on sendBeacon
            // posts; the body is still the self-describing JSON document.
            None if body.starts_with('{') => {
                let events = parse_json_body(body)?
                    .into_iter()
                    .map(|parameters| RawEvent::new(parameters, envelope.clone()))
                    .collect();
                Ok(events)
            }
            other => Err(ProtocolError::invalid_body(format!(
                "unsupported content type {:?}",
                other
            ))),
        }
    }

    fn envelope(&self) -> Envelope {
        Envelope {
            collector_tstamp: self.timestamp.and_then(millis_to_datetime),
            collector: self.collector.clone(),
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
            referer_uri: self.referer_uri.clone(),
            hostname: self.hostname.clone(),
            network_user_id: self.network_user_id.clone(),
            headers: self.headers.clone(),
        }
    }
}

fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
}

/// Parse `k=v&k2=v2` form pairs, percent-decoded
fn parse_form(input: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(input.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Parse the self-describing JSON body into per-event parameter maps
fn parse_json_body(body: &str) -> Result<Vec<HashMap<String, String>>, ProtocolError> {
    let doc: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ProtocolError::invalid_body(e.to_string()))?;

    let schema = doc
        .get("schema")
        .and_then(|s| s.as_str())
        .ok_or_else(|| ProtocolError::invalid_body("missing schema"))?;

    // Accept any version of the payload-data schema on the same vendor/name.
    let expected_prefix = PAYLOAD_DATA_SCHEMA
        .rsplit_once('/')
        .map(|(prefix, _)| prefix)
        .unwrap_or(PAYLOAD_DATA_SCHEMA);
    if !schema.starts_with(expected_prefix) {
        return Err(ProtocolError::UnexpectedBodySchema(schema.to_string()));
    }

    let data = doc
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| ProtocolError::invalid_body("data is not an array"))?;

    let mut events = Vec::with_capacity(data.len());
    for entry in data {
        let obj = entry
            .as_object()
            .ok_or_else(|| ProtocolError::invalid_body("data entry is not an object"))?;
        let mut parameters = HashMap::with_capacity(obj.len());
        for (k, v) in obj {
            let value = match v {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => continue,
                other => other.to_string(),
            };
            parameters.insert(k.clone(), value);
        }
        events.push(parameters);
    }
    Ok(events)
}
