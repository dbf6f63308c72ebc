//! Schema keys

use std::fmt;

/// Parsed form of `iglu:vendor/name/format/version`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaKey {
    pub vendor: String,
    pub name: String,
    pub format: String,
    pub version: String,
}

impl SchemaKey {
    /// Parse a schema key string
    ///
    /// Returns `None` for anything that is not a four-part iglu URI.
    pub fn parse(input: &str) -> Option<Self> {
        let rest = input.strip_prefix("iglu:")?;
        let mut parts = rest.split('/');
        let key = Self {
            vendor: parts.next()?.to_string(),
            name: parts.next()?.to_string(),
            format: parts.next()?.to_string(),
            version: parts.next()?.to_string(),
        };
        if parts.next().is_some()
            || key.vendor.is_empty()
            || key.name.is_empty()
            || key.format.is_empty()
            || key.version.is_empty()
        {
            return None;
        }
        Some(key)
    }

    /// Registry path of this key, `vendor/name/format/version`
    pub fn as_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.vendor, self.name, self.format, self.version
        )
    }
}

impl fmt::Display for SchemaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "iglu:{}", self.as_path())
    }
}
