//! Key resolution and path parsing
//!
//! A directory key is either a plain bucket name or `bucket/prefix[/...]`,
//! where the first segment names the bucket and the rest is a key prefix.
//! Remote CLI paths have the format: alias/bucket[/prefix...]/key
//! Local paths are passed through as-is.

use crate::error::{Error, Result};

/// Canonical location of an object on the remote side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    /// Bucket name
    pub bucket: String,
    /// Full object path inside the bucket
    pub path: String,
}

impl std::fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.path)
    }
}

/// Split a directory key into `(bucket, prefix)`
///
/// The prefix never carries a trailing slash and is empty for plain buckets.
pub fn check_directory_key(directory_key: &str) -> Result<(String, String)> {
    let (bucket, prefix) = match directory_key.split_once('/') {
        Some((bucket, prefix)) => (bucket, prefix.trim_end_matches('/')),
        None => (directory_key, ""),
    };

    if bucket.is_empty() {
        return Err(Error::InvalidPath(format!(
            "Directory key '{directory_key}' has no bucket name"
        )));
    }

    Ok((bucket.to_string(), prefix.to_string()))
}

/// Resolve a directory key and file key to the canonical object location
pub fn resolve(directory_key: &str, file_key: &str) -> Result<ObjectLocation> {
    let (bucket, prefix) = check_directory_key(directory_key)?;
    let path = if prefix.is_empty() {
        file_key.to_string()
    } else {
        format!("{prefix}/{file_key}")
    };
    Ok(ObjectLocation { bucket, path })
}

/// A parsed remote path pointing to a file inside a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePath {
    /// Alias name
    pub alias: String,
    /// Directory key (bucket, optionally followed by a prefix)
    pub directory_key: String,
    /// File key relative to the directory (empty for directory root)
    pub key: String,
}

impl RemotePath {
    /// Create a new RemotePath
    pub fn new(
        alias: impl Into<String>,
        directory_key: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            directory_key: directory_key.into(),
            key: key.into(),
        }
    }

    /// Get the full path as a string (alias/directory/key)
    pub fn to_full_path(&self) -> String {
        if self.key.is_empty() {
            format!("{}/{}", self.alias, self.directory_key)
        } else {
            format!("{}/{}/{}", self.alias, self.directory_key, self.key)
        }
    }

    /// Resolve the canonical object location for this path
    pub fn location(&self) -> Result<ObjectLocation> {
        resolve(&self.directory_key, &self.key)
    }
}

impl std::fmt::Display for RemotePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_full_path())
    }
}

/// Parsed path that can be either local or remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPath {
    /// Local filesystem path
    Local(std::path::PathBuf),
    /// Remote path
    Remote(RemotePath),
}

impl ParsedPath {
    /// Check if this is a local path
    pub fn is_local(&self) -> bool {
        matches!(self, ParsedPath::Local(_))
    }

    /// Get the remote path if this is a remote path
    pub fn as_remote(&self) -> Option<&RemotePath> {
        match self {
            ParsedPath::Remote(p) => Some(p),
            ParsedPath::Local(_) => None,
        }
    }
}

/// Parse a path string into a ParsedPath
///
/// Remote paths have the format: alias/bucket[/prefix...]/key. The last
/// segment is the file key, everything between the alias and the key is the
/// directory key. Local paths are anything that:
/// - Starts with / (absolute path)
/// - Starts with ./ or ../ (relative path)
/// - Is a single segment containing a dot
/// - Or doesn't start with a valid alias name
pub fn parse_path(path: &str) -> Result<ParsedPath> {
    if path.is_empty() {
        return Err(Error::InvalidPath("Path cannot be empty".into()));
    }

    if path.starts_with('/') || path.starts_with("./") || path.starts_with("../") {
        return Ok(ParsedPath::Local(std::path::PathBuf::from(path)));
    }

    #[cfg(windows)]
    if path.len() >= 2 && path.chars().nth(1) == Some(':') {
        return Ok(ParsedPath::Local(std::path::PathBuf::from(path)));
    }

    let Some((alias, rest)) = path.split_once('/') else {
        if path.contains('.') || path.contains('\\') {
            return Ok(ParsedPath::Local(std::path::PathBuf::from(path)));
        }
        return Err(Error::InvalidPath(format!(
            "Path '{path}' is incomplete. Use format: alias/bucket[/prefix]/key"
        )));
    };

    if !is_valid_alias_name(alias) {
        return Ok(ParsedPath::Local(std::path::PathBuf::from(path)));
    }

    let (directory_key, key) = match rest.trim_end_matches('/').rsplit_once('/') {
        Some((directory_key, key)) => (directory_key, key),
        None => (rest.trim_end_matches('/'), ""),
    };

    if directory_key.is_empty() || directory_key.starts_with('/') {
        return Err(Error::InvalidPath("Bucket name cannot be empty".into()));
    }

    Ok(ParsedPath::Remote(RemotePath::new(alias, directory_key, key)))
}

/// Check if a string is a valid alias name
pub(crate) fn is_valid_alias_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_plain_bucket() {
        let location = resolve("bucket", "a.txt").unwrap();
        assert_eq!(location.bucket, "bucket");
        assert_eq!(location.path, "a.txt");
    }

    #[test]
    fn test_resolve_with_prefix() {
        let location = resolve("bucket/logs", "a.txt").unwrap();
        assert_eq!(location.bucket, "bucket");
        assert_eq!(location.path, "logs/a.txt");

        let location = resolve("bucket/logs/2024", "a.txt").unwrap();
        assert_eq!(location.path, "logs/2024/a.txt");
    }

    #[test]
    fn test_resolve_empty_prefix_has_no_leading_slash() {
        let location = resolve("bucket/", "a.txt").unwrap();
        assert_eq!(location.path, "a.txt");

        let location = resolve("bucket/logs/", "a.txt").unwrap();
        assert_eq!(location.path, "logs/a.txt");
    }

    #[test]
    fn test_check_directory_key() {
        assert_eq!(
            check_directory_key("bucket").unwrap(),
            ("bucket".to_string(), String::new())
        );
        assert_eq!(
            check_directory_key("bucket/a/b").unwrap(),
            ("bucket".to_string(), "a/b".to_string())
        );
        assert!(check_directory_key("").is_err());
        assert!(check_directory_key("/prefix").is_err());
    }

    #[test]
    fn test_location_display() {
        let location = resolve("bucket/logs", "a.txt").unwrap();
        assert_eq!(location.to_string(), "bucket/logs/a.txt");
    }

    #[test]
    fn test_parse_remote_path() {
        let path = parse_path("minio/bucket/file.txt").unwrap();
        let remote = path.as_remote().unwrap();
        assert_eq!(remote.alias, "minio");
        assert_eq!(remote.directory_key, "bucket");
        assert_eq!(remote.key, "file.txt");
    }

    #[test]
    fn test_parse_remote_path_with_prefix() {
        let path = parse_path("minio/bucket/logs/2024/file.txt").unwrap();
        let remote = path.as_remote().unwrap();
        assert_eq!(remote.directory_key, "bucket/logs/2024");
        assert_eq!(remote.key, "file.txt");
        assert_eq!(remote.location().unwrap().path, "logs/2024/file.txt");
    }

    #[test]
    fn test_parse_remote_path_directory_only() {
        let path = parse_path("minio/bucket").unwrap();
        let remote = path.as_remote().unwrap();
        assert_eq!(remote.directory_key, "bucket");
        assert_eq!(remote.key, "");
        assert_eq!(remote.to_string(), "minio/bucket");
    }

    #[test]
    fn test_parse_local_paths() {
        assert!(parse_path("/home/user/file.txt").unwrap().is_local());
        assert!(parse_path("./file.txt").unwrap().is_local());
        assert!(parse_path("../file.txt").unwrap().is_local());
        assert!(parse_path("some.file.txt").unwrap().is_local());
    }

    #[test]
    fn test_parse_invalid_paths() {
        assert!(parse_path("").is_err());
        assert!(parse_path("minio").is_err());
        assert!(parse_path("minio//file.txt").is_err());
    }

    #[test]
    fn test_remote_path_display() {
        let path = RemotePath::new("minio", "bucket/logs", "file.txt");
        assert_eq!(path.to_string(), "minio/bucket/logs/file.txt");
    }
}
