//! Wire header map
//!
//! Header names are matched ASCII case-insensitively, the spelling of the
//! first insertion is kept for the wire.

use std::collections::BTreeMap;

use jiff::Timestamp;
use jiff::fmt::rfc2822::{DateTimeParser, DateTimePrinter};

/// Request or response headers of a remote object call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectHeaders {
    entries: BTreeMap<String, (String, String)>,
}

impl ObjectHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any value stored under the same name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.get_mut(&name.to_ascii_lowercase()) {
            Some(entry) => entry.1 = value,
            None => {
                self.entries.insert(name.to_ascii_lowercase(), (name, value));
            }
        }
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries
            .remove(&name.to_ascii_lowercase())
            .map(|(_, value)| value)
    }

    /// Copy every header of `other` into this map
    pub fn merge(&mut self, other: &ObjectHeaders) {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }

    /// Iterate over `(name, value)` pairs in wire spelling
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ObjectHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = ObjectHeaders::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// Format a timestamp as an HTTP date (`Sun, 06 Nov 1994 08:49:37 GMT`)
pub fn format_http_date(timestamp: &Timestamp) -> String {
    DateTimePrinter::new()
        .timestamp_to_rfc9110_string(timestamp)
        .unwrap_or_else(|_| timestamp.to_string())
}

/// Parse an HTTP date, falling back to RFC 3339
pub fn parse_http_date(value: &str) -> Option<Timestamp> {
    DateTimeParser::new()
        .parse_timestamp(value)
        .ok()
        .or_else(|| value.parse::<Timestamp>().ok())
}
