//! User-agent parsing
//!
//! Classifies the raw User-Agent header into browser, OS and device
//! columns using a compiled regex table, and attaches the parsed result as
//! a derived context. The table covers the families that dominate real
//! traffic; everything else falls through to "Unknown".

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use sift_protocol::{EnrichedEvent, RawEvent};

use crate::conf::AssetMap;
use crate::error::{BuildError, EnrichmentFailure};
use crate::registry::EnrichmentFactory;
use crate::Enrichment;

pub(crate) const NAME: &str = "user_agent_parser";

/// Context schema attached by this enrichment
pub const CONTEXT_SCHEMA: &str = "iglu:com.sift/ua_parser_context/jsonschema/1-0-0";

struct BrowserRule {
    family: &'static str,
    pattern: Lazy<Regex>,
}

macro_rules! rule {
    ($family:literal, $pattern:literal) => {
        BrowserRule {
            family: $family,
            pattern: Lazy::new(|| Regex::new($pattern).expect("static pattern compiles")),
        }
    };
}

// Order matters: Edge and Opera embed "Chrome", Chrome embeds "Safari".
static BROWSER_RULES: [BrowserRule; 6] = [
    rule!("Edge", r"Edg(?:e|A|iOS)?/(\d+[\d.]*)"),
    rule!("Opera", r"OPR/(\d+[\d.]*)"),
    rule!("Samsung Internet", r"SamsungBrowser/(\d+[\d.]*)"),
    rule!("Chrome", r"Chrome/(\d+[\d.]*)"),
    rule!("Firefox", r"Firefox/(\d+[\d.]*)"),
    rule!("Safari", r"Version/(\d+[\d.]*).*Safari"),
];

static OS_RULES: [(&str, &str, Lazy<Regex>); 6] = [
    ("Android", "Google", Lazy::new(|| Regex::new(r"Android").expect("static pattern compiles"))),
    ("iOS", "Apple", Lazy::new(|| Regex::new(r"iPhone|iPad|iPod").expect("static pattern compiles"))),
    ("Windows", "Microsoft", Lazy::new(|| Regex::new(r"Windows NT").expect("static pattern compiles"))),
    ("macOS", "Apple", Lazy::new(|| Regex::new(r"Macintosh|Mac OS X").expect("static pattern compiles"))),
    ("Linux", "-", Lazy::new(|| Regex::new(r"Linux|X11").expect("static pattern compiles"))),
    ("Chrome OS", "Google", Lazy::new(|| Regex::new(r"CrOS").expect("static pattern compiles"))),
];

static MOBILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Mobile|Android|iPhone|iPod").expect("static pattern compiles"));
static TABLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"iPad|Tablet").expect("static pattern compiles"));
static BOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)bot|crawler|spider|slurp|curl/").expect("static pattern compiles"));

#[derive(Debug, PartialEq)]
struct ParsedAgent {
    browser_family: &'static str,
    browser_version: Option<String>,
    os_family: &'static str,
    os_manufacturer: &'static str,
    device_type: &'static str,
    is_mobile: bool,
}

fn parse_agent(ua: &str) -> ParsedAgent {
    let (browser_family, browser_version) = BROWSER_RULES
        .iter()
        .find_map(|rule| {
            rule.pattern
                .captures(ua)
                .map(|c| (rule.family, c.get(1).map(|m| m.as_str().to_string())))
        })
        .unwrap_or(("Unknown", None));

    let (os_family, os_manufacturer) = OS_RULES
        .iter()
        .find(|(_, _, re)| re.is_match(ua))
        .map(|(family, manufacturer, _)| (*family, *manufacturer))
        .unwrap_or(("Unknown", "-"));

    let device_type = if BOT.is_match(ua) {
        "Robot"
    } else if TABLET.is_match(ua) {
        "Tablet"
    } else if MOBILE.is_match(ua) {
        "Mobile"
    } else {
        "Computer"
    };

    ParsedAgent {
        browser_family,
        browser_version,
        os_family,
        os_manufacturer,
        device_type,
        is_mobile: device_type == "Mobile" || device_type == "Tablet",
    }
}

/// Fills br_*/os_*/dvce_* columns and attaches a ua context
pub struct UserAgentEnrichment;

impl UserAgentEnrichment {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UserAgentEnrichment {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Enrichment for UserAgentEnrichment {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn enrich(
        &self,
        _raw: &RawEvent,
        event: &mut EnrichedEvent,
    ) -> Result<Vec<Value>, EnrichmentFailure> {
        let Some(ua) = event.useragent.as_deref() else {
            return Ok(Vec::new());
        };

        let parsed = parse_agent(ua);

        event.br_name = Some(match &parsed.browser_version {
            Some(v) => format!("{} {}", parsed.browser_family, v),
            None => parsed.browser_family.to_string(),
        });
        event.br_family = Some(parsed.browser_family.to_string());
        event.br_version = parsed.browser_version.clone();
        event.os_family = Some(parsed.os_family.to_string());
        event.os_name = Some(parsed.os_family.to_string());
        event.os_manufacturer = Some(parsed.os_manufacturer.to_string());
        event.dvce_type = Some(parsed.device_type.to_string());
        event.dvce_ismobile = Some(parsed.is_mobile);

        Ok(vec![json!({
            "schema": CONTEXT_SCHEMA,
            "data": {
                "useragentFamily": parsed.browser_family,
                "useragentVersion": parsed.browser_version,
                "osFamily": parsed.os_family,
                "deviceClass": parsed.device_type,
            }
        })])
    }
}

pub(crate) struct Factory;

impl EnrichmentFactory for Factory {
    fn name(&self) -> &'static str {
        NAME
    }

    fn build(
        &self,
        _parameters: &Value,
        _assets: &AssetMap,
    ) -> Result<Box<dyn Enrichment>, BuildError> {
        Ok(Box::new(UserAgentEnrichment::new()))
    }
}
