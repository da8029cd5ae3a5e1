//! Alias management
//!
//! An alias names one object-storage endpoint: the protocol it speaks, where
//! it lives and which credentials open it. Aliases are stored in the
//! configuration file and looked up by name on every command.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ConfigManager;
use crate::error::{Error, Result};
use crate::path::is_valid_alias_name;

/// How often and how patiently a failing request is repeated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Connection and read deadlines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_ms: u64,
    pub read_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 5_000,
            read_ms: 30_000,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn read(&self) -> Duration {
        Duration::from_millis(self.read_ms)
    }
}

/// Wire protocol spoken by an endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// S3-compatible API through the AWS SDK
    #[default]
    S3,
    /// OSS-style REST API
    Oss,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::S3 => f.write_str("s3"),
            Backend::Oss => f.write_str("oss"),
        }
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(Backend::S3),
            "oss" => Ok(Backend::Oss),
            other => Err(Error::Config(format!(
                "Unknown backend '{other}', expected 's3' or 'oss'"
            ))),
        }
    }
}

/// Where the bucket name goes in a request URL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketLookup {
    /// Path style; works against every self-hosted server
    #[default]
    Auto,
    /// `https://endpoint/bucket/key`
    Path,
    /// `https://bucket.endpoint/key`
    Dns,
}

impl BucketLookup {
    pub fn path_style(self) -> bool {
        !matches!(self, BucketLookup::Dns)
    }
}

impl fmt::Display for BucketLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BucketLookup::Auto => "auto",
            BucketLookup::Path => "path",
            BucketLookup::Dns => "dns",
        })
    }
}

impl FromStr for BucketLookup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(BucketLookup::Auto),
            "path" => Ok(BucketLookup::Path),
            "dns" => Ok(BucketLookup::Dns),
            other => Err(Error::Config(format!(
                "Invalid bucket lookup '{other}', expected 'auto', 'path' or 'dns'"
            ))),
        }
    }
}

/// A named object-storage endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alias {
    pub name: String,

    /// Base URL, scheme included
    pub endpoint: String,

    pub access_key: String,
    pub secret_key: String,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub backend: Backend,

    #[serde(default)]
    pub bucket_lookup: BucketLookup,

    /// Skip TLS certificate verification
    #[serde(default)]
    pub insecure: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutConfig>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Alias {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: default_region(),
            backend: Backend::default(),
            bucket_lookup: BucketLookup::default(),
            insecure: false,
            retry: None,
            timeout: None,
        }
    }

    /// Retry settings, falling back to the defaults
    pub fn retry_config(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }

    /// Timeout settings, falling back to the defaults
    pub fn timeout_config(&self) -> TimeoutConfig {
        self.timeout.clone().unwrap_or_default()
    }

    /// Whether buckets are addressed in the path rather than the host name
    pub fn path_style(&self) -> bool {
        self.bucket_lookup.path_style()
    }

    /// Reject names that cannot appear in a remote path and endpoints that
    /// are not http(s) URLs
    pub fn validate(&self) -> Result<()> {
        if !is_valid_alias_name(&self.name) {
            return Err(Error::Config(format!(
                "Invalid alias name '{}': use letters, digits, '-' or '_'",
                self.name
            )));
        }

        let endpoint = Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("Invalid endpoint '{}': {e}", self.endpoint)))?;
        if !matches!(endpoint.scheme(), "http" | "https") || endpoint.host_str().is_none() {
            return Err(Error::Config(format!(
                "Endpoint '{}' must be an http or https URL",
                self.endpoint
            )));
        }
        Ok(())
    }
}

/// Lists, looks up and edits the aliases in the configuration file
pub struct AliasManager {
    config_manager: ConfigManager,
}

impl AliasManager {
    pub fn with_config_manager(config_manager: ConfigManager) -> Self {
        Self { config_manager }
    }

    pub fn new() -> Result<Self> {
        Ok(Self::with_config_manager(ConfigManager::new()?))
    }

    pub fn list(&self) -> Result<Vec<Alias>> {
        Ok(self.config_manager.load()?.aliases)
    }

    pub fn get(&self, name: &str) -> Result<Alias> {
        self.config_manager
            .load()?
            .aliases
            .into_iter()
            .find(|a| a.name == name)
            .ok_or_else(|| Error::AliasNotFound(name.to_string()))
    }

    /// Add an alias, replacing any alias of the same name.
    /// Returns true when an existing alias was replaced.
    pub fn set(&self, alias: Alias) -> Result<bool> {
        alias.validate()?;
        self.config_manager.update(|config| {
            let replaced = match config.aliases.iter_mut().find(|a| a.name == alias.name) {
                Some(existing) => {
                    *existing = alias;
                    true
                }
                None => {
                    config.aliases.push(alias);
                    false
                }
            };
            Ok(replaced)
        })
    }

    pub fn remove(&self, name: &str) -> Result<Alias> {
        self.config_manager.update(|config| {
            let index = config
                .aliases
                .iter()
                .position(|a| a.name == name)
                .ok_or_else(|| Error::AliasNotFound(name.to_string()))?;
            Ok(config.aliases.remove(index))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_alias_manager() -> (AliasManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_manager = ConfigManager::with_path(temp_dir.path().join("config.toml"));
        (AliasManager::with_config_manager(config_manager), temp_dir)
    }

    #[test]
    fn test_alias_defaults() {
        let alias = Alias::new("local", "http://localhost:9000", "access", "secret");
        assert_eq!(alias.region, "us-east-1");
        assert_eq!(alias.backend, Backend::S3);
        assert_eq!(alias.bucket_lookup, BucketLookup::Auto);
        assert!(alias.path_style());
        assert!(!alias.insecure);
        assert_eq!(alias.retry_config().initial_backoff(), Duration::from_millis(100));
        assert_eq!(alias.timeout_config().read(), Duration::from_secs(30));
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("oss".parse::<Backend>().unwrap(), Backend::Oss);
        assert_eq!("S3".parse::<Backend>().unwrap(), Backend::S3);
        assert!(matches!("gcs".parse::<Backend>(), Err(Error::Config(_))));

        assert_eq!("DNS".parse::<BucketLookup>().unwrap(), BucketLookup::Dns);
        assert!(matches!("vhost".parse::<BucketLookup>(), Err(Error::Config(_))));
        assert!(!BucketLookup::Dns.path_style());
        assert!(BucketLookup::Path.path_style());
        assert_eq!(BucketLookup::Path.to_string(), "path");
    }

    #[test]
    fn test_validate() {
        assert!(Alias::new("ok-1", "https://s3.example.com", "a", "b").validate().is_ok());
        assert!(Alias::new("bad/name", "http://localhost", "a", "b").validate().is_err());
        assert!(Alias::new("x", "localhost:9000", "a", "b").validate().is_err());
        assert!(Alias::new("x", "ftp://host", "a", "b").validate().is_err());
    }

    #[test]
    fn test_partial_retry_section() {
        let alias: Alias = toml::from_str(
            r#"
            name = "r"
            endpoint = "http://localhost:9000"
            access_key = "a"
            secret_key = "b"
            bucket_lookup = "dns"

            [retry]
            max_attempts = 7
            "#,
        )
        .unwrap();

        let retry = alias.retry_config();
        assert_eq!(retry.max_attempts, 7);
        assert_eq!(retry.max_backoff(), Duration::from_secs(10));
        assert_eq!(alias.bucket_lookup, BucketLookup::Dns);
    }

    #[test]
    fn test_set_get_and_replace() {
        let (manager, _temp_dir) = temp_alias_manager();

        let mut alias = Alias::new("store", "https://oss-cn-hangzhou.aliyuncs.com", "a", "b");
        alias.backend = Backend::Oss;
        alias.bucket_lookup = BucketLookup::Dns;
        assert!(!manager.set(alias).unwrap());

        let stored = manager.get("store").unwrap();
        assert_eq!(stored.backend, Backend::Oss);
        assert!(!stored.path_style());

        assert!(manager.set(Alias::new("store", "http://new:9000", "c", "d")).unwrap());
        let aliases = manager.list().unwrap();
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases[0].endpoint, "http://new:9000");
    }

    #[test]
    fn test_set_rejects_invalid_alias() {
        let (manager, _temp_dir) = temp_alias_manager();

        let result = manager.set(Alias::new("a b", "http://localhost", "k", "s"));
        assert!(matches!(result, Err(Error::Config(_))));
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_remove() {
        let (manager, _temp_dir) = temp_alias_manager();
        manager.set(Alias::new("a", "http://a:9000", "a", "a")).unwrap();
        manager.set(Alias::new("b", "http://b:9000", "b", "b")).unwrap();

        assert_eq!(manager.remove("a").unwrap().endpoint, "http://a:9000");
        let names: Vec<_> = manager.list().unwrap().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["b"]);

        assert!(matches!(manager.remove("a"), Err(Error::AliasNotFound(_))));
        assert!(matches!(manager.get("a"), Err(Error::AliasNotFound(_))));
    }
}
