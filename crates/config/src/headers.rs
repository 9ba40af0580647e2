//! Header transformation rules applied to requests forwarded upstream.

use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::fmt;

/// A literal header name or a regex pattern matching several names.
#[derive(Debug, Clone)]
pub enum NameOrPattern {
    /// A single, literal header name.
    Name(String),
    /// A regex pattern matched against header names.
    Pattern(NamePattern),
}

/// A compiled regex used to match header names.
#[derive(Clone)]
pub struct NamePattern(Regex);

impl NamePattern {
    /// Whether the given header name matches this pattern.
    pub fn is_match(&self, name: &str) -> bool {
        self.0.is_match(name)
    }
}

impl fmt::Debug for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NamePattern").field(&self.0.as_str()).finish()
    }
}

impl<'de> Deserialize<'de> for NameOrPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            name: Option<String>,
            #[serde(default)]
            pattern: Option<String>,
        }

        let raw = Raw::deserialize(deserializer)?;

        match (raw.name, raw.pattern) {
            (Some(name), None) => Ok(NameOrPattern::Name(name)),
            (None, Some(pattern)) => {
                let regex = Regex::new(&pattern).map_err(serde::de::Error::custom)?;
                Ok(NameOrPattern::Pattern(NamePattern(regex)))
            }
            _ => Err(serde::de::Error::custom("expected exactly one of `name` or `pattern`")),
        }
    }
}

/// Forward a header from the inbound request to the upstream request, unmodified.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderForward {
    /// The inbound header name or pattern to forward.
    #[serde(flatten)]
    pub name: NameOrPattern,
    /// Optional rename applied to the forwarded header.
    #[serde(default)]
    pub rename: Option<String>,
    /// Default value used when the inbound header is absent.
    #[serde(default)]
    pub default: Option<String>,
}

/// Insert a header with a fixed value into the upstream request.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderInsert {
    /// The header name to insert.
    pub name: String,
    /// The value to insert.
    pub value: String,
}

/// Remove a header before forwarding upstream.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderRemove {
    /// The header name or pattern to remove.
    #[serde(flatten)]
    pub name: NameOrPattern,
}

/// Rename a duplicated header (e.g. a multi-valued header) into distinct names.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderRenameDuplicate {
    /// The source header name.
    pub name: String,
    /// The new name for the duplicated header.
    pub rename: String,
    /// Default value used when the inbound header is absent.
    #[serde(default)]
    pub default: Option<String>,
}

/// A single header transformation rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case", deny_unknown_fields)]
pub enum HeaderRule {
    /// Forward an inbound header as-is (or renamed).
    Forward(HeaderForward),
    /// Insert a fixed header value.
    Insert(HeaderInsert),
    /// Remove a header before forwarding.
    Remove(HeaderRemove),
    /// Rename a duplicated header.
    RenameDuplicate(HeaderRenameDuplicate),
}
