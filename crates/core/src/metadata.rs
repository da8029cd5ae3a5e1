//! User metadata codec
//!
//! Translates between symbolic snake_case metadata keys (`content_owner`) and
//! prefixed, hyphen-capitalized header names (`x-oss-meta-Content-Owner`).

use std::collections::BTreeMap;

use crate::headers::ObjectHeaders;

/// User-defined metadata of a file, keyed by symbolic name
pub type Metadata = BTreeMap<String, String>;

/// Metadata prefix used by OSS-style backends
pub const OSS_META_PREFIX: &str = "x-oss-meta-";

/// Metadata prefix used by S3-compatible backends
pub const AMZ_META_PREFIX: &str = "x-amz-meta-";

/// Metadata prefix used by the legacy object-meta REST API
pub const OBJECT_META_PREFIX: &str = "X-Object-Meta-";

/// Bidirectional metadata/header transcoder bound to one header prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataCodec {
    prefix: String,
}

impl MetadataCodec {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn oss() -> Self {
        Self::new(OSS_META_PREFIX)
    }

    pub fn amz() -> Self {
        Self::new(AMZ_META_PREFIX)
    }

    pub fn object_meta() -> Self {
        Self::new(OBJECT_META_PREFIX)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Encode a symbolic key into its header name
    pub fn key_to_header(&self, key: &str) -> String {
        let words: Vec<String> = key.split(['-', '_']).map(capitalize).collect();
        format!("{}{}", self.prefix, words.join("-"))
    }

    /// Decode a header name into its symbolic key
    ///
    /// Returns `None` for headers outside this codec's prefix.
    pub fn header_to_key(&self, header: &str) -> Option<String> {
        let rest = strip_prefix_ignore_case(header, &self.prefix)?;
        let words: Vec<String> = rest.split('-').map(uncapitalize).collect();
        Some(words.join("_"))
    }

    /// Build request headers for a metadata map
    pub fn encode(&self, metadata: &Metadata) -> ObjectHeaders {
        metadata
            .iter()
            .map(|(key, value)| (self.key_to_header(key), value.clone()))
            .collect()
    }

    /// Extract metadata from response headers
    ///
    /// Headers outside the prefix are ignored and empty values pruned.
    pub fn decode(&self, headers: &ObjectHeaders) -> Metadata {
        headers
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .filter_map(|(name, value)| {
                self.header_to_key(name)
                    .map(|key| (key, value.to_string()))
            })
            .collect()
    }
}

impl Default for MetadataCodec {
    fn default() -> Self {
        Self::oss()
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn uncapitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_to_header() {
        let codec = MetadataCodec::object_meta();
        assert_eq!(codec.key_to_header("owner"), "X-Object-Meta-Owner");
        assert_eq!(codec.key_to_header("content_owner"), "X-Object-Meta-Content-Owner");
        assert_eq!(codec.key_to_header("build-id"), "X-Object-Meta-Build-Id");
    }

    #[test]
    fn test_header_to_key() {
        let codec = MetadataCodec::oss();
        assert_eq!(
            codec.header_to_key("x-oss-meta-Content-Owner").as_deref(),
            Some("content_owner")
        );
        // servers commonly lower-case header names
        assert_eq!(
            codec.header_to_key("X-OSS-META-content-owner").as_deref(),
            Some("content_owner")
        );
        assert_eq!(codec.header_to_key("Content-Type"), None);
    }

    #[test]
    fn test_round_trip() {
        let codecs = [
            MetadataCodec::oss(),
            MetadataCodec::amz(),
            MetadataCodec::object_meta(),
        ];
        let keys = ["a", "owner", "content_owner", "x1_y2_z3", "build2024", "camelCase_key"];
        for codec in &codecs {
            for key in keys {
                let header = codec.key_to_header(key);
                assert_eq!(codec.header_to_key(&header).as_deref(), Some(key), "{header}");
            }
        }
    }

    #[test]
    fn test_hyphen_normalizes_to_underscore() {
        let codec = MetadataCodec::oss();
        let header = codec.key_to_header("build-id");
        assert_eq!(codec.header_to_key(&header).as_deref(), Some("build_id"));
    }

    #[test]
    fn test_decode_filters_and_prunes() {
        let codec = MetadataCodec::oss();
        let headers = ObjectHeaders::new()
            .with("Content-Type", "text/plain")
            .with("x-oss-meta-Owner", "alice")
            .with("x-oss-meta-Empty", "")
            .with("ETag", "\"abc\"");

        let metadata = codec.decode(&headers);
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata.get("owner").map(String::as_str), Some("alice"));
    }

    #[test]
    fn test_encode_decode_map() {
        let codec = MetadataCodec::amz();
        let mut metadata = Metadata::new();
        metadata.insert("owner".into(), "alice".into());
        metadata.insert("build_number".into(), "42".into());

        let headers = codec.encode(&metadata);
        assert_eq!(headers.get("x-amz-meta-Build-Number"), Some("42"));
        assert_eq!(codec.decode(&headers), metadata);
    }
}
