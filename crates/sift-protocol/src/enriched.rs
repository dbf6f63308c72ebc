//! Enriched event model
//!
//! The flat 131-field output record. Field names and order are canonical:
//! downstream loaders index columns positionally, so `ATOMIC_FIELD_NAMES`
//! and `to_tsv` must never be reordered.
//!
//! # Design
//!
//! - Seeding from a raw event (`from_raw`) maps tracker parameters onto
//!   typed fields and never fails: unparseable values are left unset and the
//!   schema validator catches anything that matters downstream
//! - `field` gives stringified access by name, used for sink attributes and
//!   the TSV rendering
//! - `derived_contexts` and `pii` are carried alongside and rendered into
//!   their columns at serialisation time

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::event::RawEvent;

#[cfg(test)]
#[path = "enriched_test.rs"]
mod tests;

/// Envelope schema wrapped around the derived-context list in column 123
pub const CONTEXTS_SCHEMA: &str = "iglu:com.sift/contexts/jsonschema/1-0-1";

/// Timestamp rendering used in the TSV output
const TSTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// One pseudonymised field, reported on the PII twin
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PiiField {
    /// Atomic field name that was rewritten
    pub field_name: String,

    /// Value after pseudonymisation
    pub modified_value: String,
}

/// Canonical atomic field order
///
/// Column positions are load-bearing; append-only by schema evolution rules.
pub const ATOMIC_FIELD_NAMES: [&str; 131] = [
    "app_id",
    "platform",
    "etl_tstamp",
    "collector_tstamp",
    "dvce_created_tstamp",
    "event",
    "event_id",
    "txn_id",
    "name_tracker",
    "v_tracker",
    "v_collector",
    "v_etl",
    "user_id",
    "user_ipaddress",
    "user_fingerprint",
    "domain_userid",
    "domain_sessionidx",
    "network_userid",
    "geo_country",
    "geo_region",
    "geo_city",
    "geo_zipcode",
    "geo_latitude",
    "geo_longitude",
    "geo_region_name",
    "ip_isp",
    "ip_organization",
    "ip_domain",
    "ip_netspeed",
    "page_url",
    "page_title",
    "page_referrer",
    "page_urlscheme",
    "page_urlhost",
    "page_urlport",
    "page_urlpath",
    "page_urlquery",
    "page_urlfragment",
    "refr_urlscheme",
    "refr_urlhost",
    "refr_urlport",
    "refr_urlpath",
    "refr_urlquery",
    "refr_urlfragment",
    "refr_medium",
    "refr_source",
    "refr_term",
    "mkt_medium",
    "mkt_source",
    "mkt_term",
    "mkt_content",
    "mkt_campaign",
    "contexts",
    "se_category",
    "se_action",
    "se_label",
    "se_property",
    "se_value",
    "unstruct_event",
    "tr_orderid",
    "tr_affiliation",
    "tr_total",
    "tr_tax",
    "tr_shipping",
    "tr_city",
    "tr_state",
    "tr_country",
    "ti_orderid",
    "ti_sku",
    "ti_name",
    "ti_category",
    "ti_price",
    "ti_quantity",
    "pp_xoffset_min",
    "pp_xoffset_max",
    "pp_yoffset_min",
    "pp_yoffset_max",
    "useragent",
    "br_name",
    "br_family",
    "br_version",
    "br_type",
    "br_renderengine",
    "br_lang",
    "br_features_pdf",
    "br_features_flash",
    "br_features_java",
    "br_features_director",
    "br_features_quicktime",
    "br_features_realplayer",
    "br_features_windowsmedia",
    "br_features_gears",
    "br_features_silverlight",
    "br_cookies",
    "br_colordepth",
    "br_viewwidth",
    "br_viewheight",
    "os_name",
    "os_family",
    "os_manufacturer",
    "os_timezone",
    "dvce_type",
    "dvce_ismobile",
    "dvce_screenwidth",
    "dvce_screenheight",
    "doc_charset",
    "doc_width",
    "doc_height",
    "tr_currency",
    "tr_total_base",
    "tr_tax_base",
    "tr_shipping_base",
    "ti_currency",
    "ti_price_base",
    "base_currency",
    "geo_timezone",
    "mkt_clickid",
    "mkt_network",
    "etl_tags",
    "dvce_sent_tstamp",
    "refr_domain_userid",
    "refr_dvce_tstamp",
    "derived_contexts",
    "domain_sessionid",
    "derived_tstamp",
    "event_vendor",
    "event_name",
    "event_format",
    "event_version",
    "event_fingerprint",
    "true_tstamp",
];

/// The enriched event
///
/// All fields are optional; unset fields render as empty TSV columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichedEvent {
    // Application
    pub app_id: Option<String>,
    pub platform: Option<String>,

    // Timestamps
    pub etl_tstamp: Option<DateTime<Utc>>,
    pub collector_tstamp: Option<DateTime<Utc>>,
    pub dvce_created_tstamp: Option<DateTime<Utc>>,

    // Event identity
    pub event: Option<String>,
    pub event_id: Option<String>,
    pub txn_id: Option<String>,

    // Versioning
    pub name_tracker: Option<String>,
    pub v_tracker: Option<String>,
    pub v_collector: Option<String>,
    pub v_etl: Option<String>,

    // User
    pub user_id: Option<String>,
    pub user_ipaddress: Option<String>,
    pub user_fingerprint: Option<String>,
    pub domain_userid: Option<String>,
    pub domain_sessionidx: Option<i32>,
    pub network_userid: Option<String>,

    // Geo (ip_lookups)
    pub geo_country: Option<String>,
    pub geo_region: Option<String>,
    pub geo_city: Option<String>,
    pub geo_zipcode: Option<String>,
    pub geo_latitude: Option<f64>,
    pub geo_longitude: Option<f64>,
    pub geo_region_name: Option<String>,

    // IP intelligence
    pub ip_isp: Option<String>,
    pub ip_organization: Option<String>,
    pub ip_domain: Option<String>,
    pub ip_netspeed: Option<String>,

    // Page
    pub page_url: Option<String>,
    pub page_title: Option<String>,
    pub page_referrer: Option<String>,
    pub page_urlscheme: Option<String>,
    pub page_urlhost: Option<String>,
    pub page_urlport: Option<i32>,
    pub page_urlpath: Option<String>,
    pub page_urlquery: Option<String>,
    pub page_urlfragment: Option<String>,

    // Referer
    pub refr_urlscheme: Option<String>,
    pub refr_urlhost: Option<String>,
    pub refr_urlport: Option<i32>,
    pub refr_urlpath: Option<String>,
    pub refr_urlquery: Option<String>,
    pub refr_urlfragment: Option<String>,
    pub refr_medium: Option<String>,
    pub refr_source: Option<String>,
    pub refr_term: Option<String>,

    // Marketing
    pub mkt_medium: Option<String>,
    pub mkt_source: Option<String>,
    pub mkt_term: Option<String>,
    pub mkt_content: Option<String>,
    pub mkt_campaign: Option<String>,

    // Custom contexts sent by the tracker
    pub contexts: Option<Value>,

    // Structured event
    pub se_category: Option<String>,
    pub se_action: Option<String>,
    pub se_label: Option<String>,
    pub se_property: Option<String>,
    pub se_value: Option<f64>,

    // Self-describing event
    pub unstruct_event: Option<Value>,

    // Transaction
    pub tr_orderid: Option<String>,
    pub tr_affiliation: Option<String>,
    pub tr_total: Option<f64>,
    pub tr_tax: Option<f64>,
    pub tr_shipping: Option<f64>,
    pub tr_city: Option<String>,
    pub tr_state: Option<String>,
    pub tr_country: Option<String>,

    // Transaction item
    pub ti_orderid: Option<String>,
    pub ti_sku: Option<String>,
    pub ti_name: Option<String>,
    pub ti_category: Option<String>,
    pub ti_price: Option<f64>,
    pub ti_quantity: Option<i32>,

    // Page ping
    pub pp_xoffset_min: Option<i32>,
    pub pp_xoffset_max: Option<i32>,
    pub pp_yoffset_min: Option<i32>,
    pub pp_yoffset_max: Option<i32>,

    // User agent
    pub useragent: Option<String>,

    // Browser
    pub br_name: Option<String>,
    pub br_family: Option<String>,
    pub br_version: Option<String>,
    pub br_type: Option<String>,
    pub br_renderengine: Option<String>,
    pub br_lang: Option<String>,
    pub br_features_pdf: Option<bool>,
    pub br_features_flash: Option<bool>,
    pub br_features_java: Option<bool>,
    pub br_features_director: Option<bool>,
    pub br_features_quicktime: Option<bool>,
    pub br_features_realplayer: Option<bool>,
    pub br_features_windowsmedia: Option<bool>,
    pub br_features_gears: Option<bool>,
    pub br_features_silverlight: Option<bool>,
    pub br_cookies: Option<bool>,
    pub br_colordepth: Option<String>,
    pub br_viewwidth: Option<i32>,
    pub br_viewheight: Option<i32>,

    // Operating system
    pub os_name: Option<String>,
    pub os_family: Option<String>,
    pub os_manufacturer: Option<String>,
    pub os_timezone: Option<String>,

    // Device
    pub dvce_type: Option<String>,
    pub dvce_ismobile: Option<bool>,
    pub dvce_screenwidth: Option<i32>,
    pub dvce_screenheight: Option<i32>,

    // Document
    pub doc_charset: Option<String>,
    pub doc_width: Option<i32>,
    pub doc_height: Option<i32>,

    // Currency
    pub tr_currency: Option<String>,
    pub tr_total_base: Option<f64>,
    pub tr_tax_base: Option<f64>,
    pub tr_shipping_base: Option<f64>,
    pub ti_currency: Option<String>,
    pub ti_price_base: Option<f64>,
    pub base_currency: Option<String>,

    // Geo extras
    pub geo_timezone: Option<String>,

    // Click id
    pub mkt_clickid: Option<String>,
    pub mkt_network: Option<String>,

    // ETL
    pub etl_tags: Option<String>,
    pub dvce_sent_tstamp: Option<DateTime<Utc>>,

    // Cross-domain referer
    pub refr_domain_userid: Option<String>,
    pub refr_dvce_tstamp: Option<DateTime<Utc>>,

    // Derived
    pub derived_contexts: Vec<Value>,
    pub domain_sessionid: Option<String>,
    pub derived_tstamp: Option<DateTime<Utc>>,

    // Event classification
    pub event_vendor: Option<String>,
    pub event_name: Option<String>,
    pub event_format: Option<String>,
    pub event_version: Option<String>,
    pub event_fingerprint: Option<String>,
    pub true_tstamp: Option<DateTime<Utc>>,

    /// Pseudonymised-field report; non-empty means a PII twin is due
    pub pii: Vec<PiiField>,
}

impl EnrichedEvent {
    /// Seed an enriched event from a raw event's envelope and parameters
    pub fn from_raw(raw: &RawEvent) -> Self {
        let mut e = Self {
            collector_tstamp: raw.envelope.collector_tstamp,
            v_collector: raw.envelope.collector.clone(),
            user_ipaddress: raw.envelope.ip_address.clone(),
            useragent: raw.envelope.user_agent.clone(),
            page_referrer: raw.envelope.referer_uri.clone(),
            network_userid: raw.envelope.network_user_id.clone(),
            ..Self::default()
        };

        e.event_id = Some(
            raw.param("eid")
                .and_then(|s| Uuid::parse_str(s).ok())
                .unwrap_or_else(Uuid::new_v4)
                .to_string(),
        );

        e.apply_parameters(&raw.parameters);
        e.classify_event();
        e.split_page_url();
        e
    }

    fn apply_parameters(&mut self, params: &HashMap<String, String>) {
        for (key, value) in params {
            match key.as_str() {
                "e" => self.event = Some(event_type_name(value).to_string()),
                "aid" => self.app_id = Some(value.clone()),
                "p" => self.platform = Some(value.clone()),
                "tid" => self.txn_id = Some(value.clone()),
                "tna" => self.name_tracker = Some(value.clone()),
                "tv" => self.v_tracker = Some(value.clone()),
                "uid" => self.user_id = Some(value.clone()),
                "ip" => self.user_ipaddress = Some(value.clone()),
                "fp" => self.user_fingerprint = Some(value.clone()),
                "duid" => self.domain_userid = Some(value.clone()),
                "vid" => self.domain_sessionidx = value.parse().ok(),
                "sid" => self.domain_sessionid = Some(value.clone()),
                "tnuid" => self.network_userid = Some(value.clone()),
                "url" => self.page_url = Some(value.clone()),
                "page" => self.page_title = Some(value.clone()),
                "refr" => self.page_referrer = Some(value.clone()),
                "dtm" => self.dvce_created_tstamp = parse_millis(value),
                "stm" => self.dvce_sent_tstamp = parse_millis(value),
                "ttm" => self.true_tstamp = parse_millis(value),
                "se_ca" => self.se_category = Some(value.clone()),
                "se_ac" => self.se_action = Some(value.clone()),
                "se_la" => self.se_label = Some(value.clone()),
                "se_pr" => self.se_property = Some(value.clone()),
                "se_va" => self.se_value = value.parse().ok(),
                "tr_id" => self.tr_orderid = Some(value.clone()),
                "tr_af" => self.tr_affiliation = Some(value.clone()),
                "tr_tt" => self.tr_total = value.parse().ok(),
                "tr_tx" => self.tr_tax = value.parse().ok(),
                "tr_sh" => self.tr_shipping = value.parse().ok(),
                "tr_ci" => self.tr_city = Some(value.clone()),
                "tr_st" => self.tr_state = Some(value.clone()),
                "tr_co" => self.tr_country = Some(value.clone()),
                "tr_cu" => self.tr_currency = Some(value.clone()),
                "ti_id" => self.ti_orderid = Some(value.clone()),
                "ti_sk" => self.ti_sku = Some(value.clone()),
                "ti_nm" => self.ti_name = Some(value.clone()),
                "ti_ca" => self.ti_category = Some(value.clone()),
                "ti_pr" => self.ti_price = value.parse().ok(),
                "ti_qu" => self.ti_quantity = value.parse().ok(),
                "ti_cu" => self.ti_currency = Some(value.clone()),
                "pp_mix" => self.pp_xoffset_min = value.parse().ok(),
                "pp_max" => self.pp_xoffset_max = value.parse().ok(),
                "pp_miy" => self.pp_yoffset_min = value.parse().ok(),
                "pp_may" => self.pp_yoffset_max = value.parse().ok(),
                "ua" => self.useragent = Some(value.clone()),
                "lang" => self.br_lang = Some(value.clone()),
                "cd" => self.br_colordepth = Some(value.clone()),
                "cookie" => self.br_cookies = parse_bool(value),
                "f_pdf" => self.br_features_pdf = parse_bool(value),
                "f_fla" => self.br_features_flash = parse_bool(value),
                "f_java" => self.br_features_java = parse_bool(value),
                "f_dir" => self.br_features_director = parse_bool(value),
                "f_qt" => self.br_features_quicktime = parse_bool(value),
                "f_realp" => self.br_features_realplayer = parse_bool(value),
                "f_wma" => self.br_features_windowsmedia = parse_bool(value),
                "f_gears" => self.br_features_gears = parse_bool(value),
                "f_ag" => self.br_features_silverlight = parse_bool(value),
                "res" => {
                    if let Some((w, h)) = parse_dimensions(value) {
                        self.dvce_screenwidth = Some(w);
                        self.dvce_screenheight = Some(h);
                    }
                }
                "vp" => {
                    if let Some((w, h)) = parse_dimensions(value) {
                        self.br_viewwidth = Some(w);
                        self.br_viewheight = Some(h);
                    }
                }
                "ds" => {
                    if let Some((w, h)) = parse_dimensions(value) {
                        self.doc_width = Some(w);
                        self.doc_height = Some(h);
                    }
                }
                "cs" => self.doc_charset = Some(value.clone()),
                "tz" => self.os_timezone = Some(value.clone()),
                "co" => self.contexts = serde_json::from_str(value).ok(),
                "cx" => self.contexts = decode_base64_json(value),
                "ue_pr" => self.unstruct_event = serde_json::from_str(value).ok(),
                "ue_px" => self.unstruct_event = decode_base64_json(value),
                "refr_duid" => self.refr_domain_userid = Some(value.clone()),
                "refr_dtm" => self.refr_dvce_tstamp = parse_millis(value),
                // eid handled by the caller, everything else ignored
                _ => {}
            }
        }
    }

    /// Fill event_vendor / event_name / event_format / event_version
    fn classify_event(&mut self) {
        if self.event.as_deref() == Some("unstruct") {
            // Classification comes from the inner self-describing schema.
            if let Some(key) = self
                .unstruct_event
                .as_ref()
                .and_then(|u| u.get("data"))
                .and_then(|d| d.get("schema"))
                .and_then(|s| s.as_str())
            {
                if let Some((vendor, name, format, version)) = split_schema_key(key) {
                    self.event_vendor = Some(vendor);
                    self.event_name = Some(name);
                    self.event_format = Some(format);
                    self.event_version = Some(version);
                }
            }
            return;
        }

        if let Some(ref name) = self.event {
            self.event_vendor = Some("com.sift".to_string());
            self.event_name = Some(name.clone());
            self.event_format = Some("jsonschema".to_string());
            self.event_version = Some("1-0-0".to_string());
        }
    }

    /// Split page_url into its component columns
    fn split_page_url(&mut self) {
        let Some(parsed) = self.page_url.as_deref().and_then(|u| url::Url::parse(u).ok()) else {
            return;
        };
        self.page_urlscheme = Some(parsed.scheme().to_string());
        self.page_urlhost = parsed.host_str().map(str::to_owned);
        self.page_urlport = Some(i32::from(
            parsed.port_or_known_default().unwrap_or(80),
        ));
        self.page_urlpath = Some(parsed.path().to_string());
        self.page_urlquery = parsed.query().map(str::to_owned);
        self.page_urlfragment = parsed.fragment().map(str::to_owned);
    }

    /// Set the derived timestamp from device clock skew when possible
    ///
    /// `derived = collector - (sent - created)`; a true timestamp, when the
    /// tracker supplied one, wins outright.
    pub fn set_derived_tstamp(&mut self) {
        if let Some(t) = self.true_tstamp {
            self.derived_tstamp = Some(t);
            return;
        }
        self.derived_tstamp = match (
            self.collector_tstamp,
            self.dvce_sent_tstamp,
            self.dvce_created_tstamp,
        ) {
            (Some(collector), Some(sent), Some(created)) => {
                Some(collector - (sent - created))
            }
            (collector, _, _) => collector,
        };
    }

    /// Stringified field access by atomic name
    ///
    /// Returns `None` when the field is unset or the name is unknown.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "app_id" => self.app_id.clone(),
            "platform" => self.platform.clone(),
            "etl_tstamp" => fmt_tstamp(self.etl_tstamp),
            "collector_tstamp" => fmt_tstamp(self.collector_tstamp),
            "dvce_created_tstamp" => fmt_tstamp(self.dvce_created_tstamp),
            "event" => self.event.clone(),
            "event_id" => self.event_id.clone(),
            "txn_id" => self.txn_id.clone(),
            "name_tracker" => self.name_tracker.clone(),
            "v_tracker" => self.v_tracker.clone(),
            "v_collector" => self.v_collector.clone(),
            "v_etl" => self.v_etl.clone(),
            "user_id" => self.user_id.clone(),
            "user_ipaddress" => self.user_ipaddress.clone(),
            "user_fingerprint" => self.user_fingerprint.clone(),
            "domain_userid" => self.domain_userid.clone(),
            "domain_sessionidx" => self.domain_sessionidx.map(|v| v.to_string()),
            "network_userid" => self.network_userid.clone(),
            "geo_country" => self.geo_country.clone(),
            "geo_region" => self.geo_region.clone(),
            "geo_city" => self.geo_city.clone(),
            "geo_zipcode" => self.geo_zipcode.clone(),
            "geo_latitude" => self.geo_latitude.map(|v| v.to_string()),
            "geo_longitude" => self.geo_longitude.map(|v| v.to_string()),
            "geo_region_name" => self.geo_region_name.clone(),
            "ip_isp" => self.ip_isp.clone(),
            "ip_organization" => self.ip_organization.clone(),
            "ip_domain" => self.ip_domain.clone(),
            "ip_netspeed" => self.ip_netspeed.clone(),
            "page_url" => self.page_url.clone(),
            "page_title" => self.page_title.clone(),
            "page_referrer" => self.page_referrer.clone(),
            "page_urlscheme" => self.page_urlscheme.clone(),
            "page_urlhost" => self.page_urlhost.clone(),
            "page_urlport" => self.page_urlport.map(|v| v.to_string()),
            "page_urlpath" => self.page_urlpath.clone(),
            "page_urlquery" => self.page_urlquery.clone(),
            "page_urlfragment" => self.page_urlfragment.clone(),
            "refr_urlscheme" => self.refr_urlscheme.clone(),
            "refr_urlhost" => self.refr_urlhost.clone(),
            "refr_urlport" => self.refr_urlport.map(|v| v.to_string()),
            "refr_urlpath" => self.refr_urlpath.clone(),
            "refr_urlquery" => self.refr_urlquery.clone(),
            "refr_urlfragment" => self.refr_urlfragment.clone(),
            "refr_medium" => self.refr_medium.clone(),
            "refr_source" => self.refr_source.clone(),
            "refr_term" => self.refr_term.clone(),
            "mkt_medium" => self.mkt_medium.clone(),
            "mkt_source" => self.mkt_source.clone(),
            "mkt_term" => self.mkt_term.clone(),
            "mkt_content" => self.mkt_content.clone(),
            "mkt_campaign" => self.mkt_campaign.clone(),
            "contexts" => self.contexts.as_ref().map(Value::to_string),
            "se_category" => self.se_category.clone(),
            "se_action" => self.se_action.clone(),
            "se_label" => self.se_label.clone(),
            "se_property" => self.se_property.clone(),
            "se_value" => self.se_value.map(|v| v.to_string()),
            "unstruct_event" => self.unstruct_event.as_ref().map(Value::to_string),
            "tr_orderid" => self.tr_orderid.clone(),
            "tr_affiliation" => self.tr_affiliation.clone(),
            "tr_total" => self.tr_total.map(|v| v.to_string()),
            "tr_tax" => self.tr_tax.map(|v| v.to_string()),
            "tr_shipping" => self.tr_shipping.map(|v| v.to_string()),
            "tr_city" => self.tr_city.clone(),
            "tr_state" => self.tr_state.clone(),
            "tr_country" => self.tr_country.clone(),
            "ti_orderid" => self.ti_orderid.clone(),
            "ti_sku" => self.ti_sku.clone(),
            "ti_name" => self.ti_name.clone(),
            "ti_category" => self.ti_category.clone(),
            "ti_price" => self.ti_price.map(|v| v.to_string()),
            "ti_quantity" => self.ti_quantity.map(|v| v.to_string()),
            "pp_xoffset_min" => self.pp_xoffset_min.map(|v| v.to_string()),
            "pp_xoffset_max" => self.pp_xoffset_max.map(|v| v.to_string()),
            "pp_yoffset_min" => self.pp_yoffset_min.map(|v| v.to_string()),
            "pp_yoffset_max" => self.pp_yoffset_max.map(|v| v.to_string()),
            "useragent" => self.useragent.clone(),
            "br_name" => self.br_name.clone(),
            "br_family" => self.br_family.clone(),
            "br_version" => self.br_version.clone(),
            "br_type" => self.br_type.clone(),
            "br_renderengine" => self.br_renderengine.clone(),
            "br_lang" => self.br_lang.clone(),
            "br_features_pdf" => fmt_bool(self.br_features_pdf),
            "br_features_flash" => fmt_bool(self.br_features_flash),
            "br_features_java" => fmt_bool(self.br_features_java),
            "br_features_director" => fmt_bool(self.br_features_director),
            "br_features_quicktime" => fmt_bool(self.br_features_quicktime),
            "br_features_realplayer" => fmt_bool(self.br_features_realplayer),
            "br_features_windowsmedia" => fmt_bool(self.br_features_windowsmedia),
            "br_features_gears" => fmt_bool(self.br_features_gears),
            "br_features_silverlight" => fmt_bool(self.br_features_silverlight),
            "br_cookies" => fmt_bool(self.br_cookies),
            "br_colordepth" => self.br_colordepth.clone(),
            "br_viewwidth" => self.br_viewwidth.map(|v| v.to_string()),
            "br_viewheight" => self.br_viewheight.map(|v| v.to_string()),
            "os_name" => self.os_name.clone(),
            "os_family" => self.os_family.clone(),
            "os_manufacturer" => self.os_manufacturer.clone(),
            "os_timezone" => self.os_timezone.clone(),
            "dvce_type" => self.dvce_type.clone(),
            "dvce_ismobile" => fmt_bool(self.dvce_ismobile),
            "dvce_screenwidth" => self.dvce_screenwidth.map(|v| v.to_string()),
            "dvce_screenheight" => self.dvce_screenheight.map(|v| v.to_string()),
            "doc_charset" => self.doc_charset.clone(),
            "doc_width" => self.doc_width.map(|v| v.to_string()),
            "doc_height" => self.doc_height.map(|v| v.to_string()),
            "tr_currency" => self.tr_currency.clone(),
            "tr_total_base" => self.tr_total_base.map(|v| v.to_string()),
            "tr_tax_base" => self.tr_tax_base.map(|v| v.to_string()),
            "tr_shipping_base" => self.tr_shipping_base.map(|v| v.to_string()),
            "ti_currency" => self.ti_currency.clone(),
            "ti_price_base" => self.ti_price_base.map(|v| v.to_string()),
            "base_currency" => self.base_currency.clone(),
            "geo_timezone" => self.geo_timezone.clone(),
            "mkt_clickid" => self.mkt_clickid.clone(),
            "mkt_network" => self.mkt_network.clone(),
            "etl_tags" => self.etl_tags.clone(),
            "dvce_sent_tstamp" => fmt_tstamp(self.dvce_sent_tstamp),
            "refr_domain_userid" => self.refr_domain_userid.clone(),
            "refr_dvce_tstamp" => fmt_tstamp(self.refr_dvce_tstamp),
            "derived_contexts" => self.derived_contexts_json().map(|v| v.to_string()),
            "domain_sessionid" => self.domain_sessionid.clone(),
            "derived_tstamp" => fmt_tstamp(self.derived_tstamp),
            "event_vendor" => self.event_vendor.clone(),
            "event_name" => self.event_name.clone(),
            "event_format" => self.event_format.clone(),
            "event_version" => self.event_version.clone(),
            "event_fingerprint" => self.event_fingerprint.clone(),
            "true_tstamp" => fmt_tstamp(self.true_tstamp),
            _ => None,
        }
    }

    /// Derived contexts wrapped in the self-describing contexts envelope
    pub fn derived_contexts_json(&self) -> Option<Value> {
        if self.derived_contexts.is_empty() {
            return None;
        }
        Some(serde_json::json!({
            "schema": CONTEXTS_SCHEMA,
            "data": self.derived_contexts,
        }))
    }

    /// Serialise as the canonical 131-column TSV line
    pub fn to_tsv(&self) -> String {
        let mut out = String::with_capacity(512);
        for (i, name) in ATOMIC_FIELD_NAMES.iter().enumerate() {
            if i > 0 {
                out.push('\t');
            }
            if let Some(value) = self.field(name) {
                // Tabs and newlines are column separators; strip them.
                if value.contains(['\t', '\n', '\r']) {
                    out.extend(value.chars().map(|c| match c {
                        '\t' | '\n' | '\r' => ' ',
                        c => c,
                    }));
                } else {
                    out.push_str(&value);
                }
            }
        }
        out
    }
}

/// Map the tracker's `e` parameter to the canonical event type
fn event_type_name(e: &str) -> &'static str {
    match e {
        "pv" => "page_view",
        "pp" => "page_ping",
        "se" => "struct",
        "ue" => "unstruct",
        "tr" => "transaction",
        "ti" => "transaction_item",
        _ => "unknown",
    }
}

fn split_schema_key(key: &str) -> Option<(String, String, String, String)> {
    let rest = key.strip_prefix("iglu:")?;
    let mut parts = rest.split('/');
    let vendor = parts.next()?.to_string();
    let name = parts.next()?.to_string();
    let format = parts.next()?.to_string();
    let version = parts.next()?.to_string();
    Some((vendor, name, format, version))
}

fn parse_millis(value: &str) -> Option<DateTime<Utc>> {
    value
        .parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

/// Parse `WIDTHxHEIGHT` dimension pairs
fn parse_dimensions(value: &str) -> Option<(i32, i32)> {
    let (w, h) = value.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

fn decode_base64_json(value: &str) -> Option<Value> {
    use base64::Engine;
    // Trackers emit URL-safe base64 without padding; accept standard too.
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(value)
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(value))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn fmt_tstamp(t: Option<DateTime<Utc>>) -> Option<String> {
    t.map(|t| t.format(TSTAMP_FORMAT).to_string())
}

fn fmt_bool(b: Option<bool>) -> Option<String> {
    b.map(|b| if b { "1" } else { "0" }.to_string())
}
