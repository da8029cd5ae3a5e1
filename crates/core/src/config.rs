//! Configuration management
//!
//! The bf configuration lives in a TOML file at `~/.config/bf/config.toml`.
//! Setting `BF_CONFIG_DIR` moves it to another directory. The file carries a
//! schema version; older files are migrated on load, newer ones rejected.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::alias::Alias;
use crate::error::{Error, Result};
use crate::multipart::MultipartConfig;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "BF_CONFIG_DIR";

const CONFIG_FILE: &str = "config.toml";

/// Current configuration schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Whole configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub schema_version: u32,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub aliases: Vec<Alias>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            defaults: Defaults::default(),
            aliases: Vec::new(),
        }
    }
}

/// Output format used when no flag asks otherwise
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

/// When to color terminal output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

/// Settings applied to every command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub output: OutputFormat,

    #[serde(default)]
    pub color: ColorMode,

    /// Show progress bars for multipart uploads
    #[serde(default = "default_progress")]
    pub progress: bool,

    /// Part size, threshold and concurrency of multipart uploads
    #[serde(default)]
    pub multipart: MultipartConfig,
}

fn default_progress() -> bool {
    true
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: OutputFormat::default(),
            color: ColorMode::default(),
            progress: default_progress(),
            multipart: MultipartConfig::default(),
        }
    }
}

/// Reads and writes the configuration file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Locate the configuration file, honoring `BF_CONFIG_DIR`
    pub fn new() -> Result<Self> {
        let dir = match std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| Error::Config("Could not determine config directory".into()))?
                .join("bf"),
        };
        let config_path = dir.join(CONFIG_FILE);
        tracing::debug!(path = %config_path.display(), "Using config file");
        Ok(Self::with_path(config_path))
    }

    /// Use an explicit file path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the configuration; a missing file yields the defaults
    pub fn load(&self) -> Result<Config> {
        let content = match std::fs::read_to_string(&self.config_path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Config::default()),
            Err(e) => return Err(e.into()),
        };

        let config: Config = toml::from_str(&content)?;
        match config.schema_version {
            v if v == SCHEMA_VERSION => Ok(config),
            v if v < SCHEMA_VERSION => Ok(migrate(config)),
            v => Err(Error::Config(format!(
                "Configuration file version {v} is newer than supported version \
                 {SCHEMA_VERSION}. Please upgrade bf."
            ))),
        }
    }

    /// Write the configuration, readable by the owner only
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.config_path, toml::to_string_pretty(config)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.config_path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Load, change and save the configuration in one step
    pub fn update<T>(&self, change: impl FnOnce(&mut Config) -> Result<T>) -> Result<T> {
        let mut config = self.load()?;
        let outcome = change(&mut config)?;
        self.save(&config)?;
        Ok(outcome)
    }
}

fn migrate(mut config: Config) -> Config {
    tracing::info!(
        from = config.schema_version,
        to = SCHEMA_VERSION,
        "Migrating configuration"
    );
    config.schema_version = SCHEMA_VERSION;
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::Backend;
    use tempfile::TempDir;

    fn temp_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp_dir.path().join(CONFIG_FILE));
        (manager, temp_dir)
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let (manager, _temp_dir) = temp_config_manager();
        let config = manager.load().unwrap();

        assert_eq!(config.schema_version, SCHEMA_VERSION);
        assert_eq!(config.defaults.output, OutputFormat::Human);
        assert_eq!(config.defaults.color, ColorMode::Auto);
        assert!(config.defaults.progress);
        assert_eq!(config.defaults.multipart, MultipartConfig::default());
        assert!(config.aliases.is_empty());
    }

    #[test]
    fn test_partial_defaults_section() {
        let (manager, _temp_dir) = temp_config_manager();
        std::fs::write(
            manager.config_path(),
            r#"
            schema_version = 1

            [defaults]
            output = "json"
            progress = false

            [defaults.multipart]
            part_size = 8388608
            "#,
        )
        .unwrap();

        let defaults = manager.load().unwrap().defaults;
        assert_eq!(defaults.output, OutputFormat::Json);
        assert_eq!(defaults.color, ColorMode::Auto);
        assert!(!defaults.progress);
        assert_eq!(defaults.multipart.part_size, 8 * 1024 * 1024);
        assert_eq!(defaults.multipart.threshold, 5_368_709_120);
    }

    #[test]
    fn test_update_persists_changes() {
        let (manager, _temp_dir) = temp_config_manager();

        let count = manager
            .update(|config| {
                let mut alias = Alias::new("store", "http://localhost:9000", "key", "secret");
                alias.backend = Backend::Oss;
                config.aliases.push(alias);
                config.defaults.multipart = MultipartConfig::new().concurrency(4);
                Ok(config.aliases.len())
            })
            .unwrap();
        assert_eq!(count, 1);

        let loaded = manager.load().unwrap();
        assert_eq!(loaded.aliases[0].name, "store");
        assert_eq!(loaded.aliases[0].backend, Backend::Oss);
        assert_eq!(loaded.defaults.multipart.concurrency, 4);
    }

    #[test]
    fn test_failed_update_leaves_file_alone() {
        let (manager, _temp_dir) = temp_config_manager();

        let result: Result<()> = manager.update(|config| {
            config.defaults.progress = false;
            Err(Error::Config("rejected".into()))
        });
        assert!(result.is_err());
        assert!(!manager.config_path().exists());
    }

    #[test]
    fn test_older_schema_is_migrated() {
        let (manager, _temp_dir) = temp_config_manager();
        std::fs::write(manager.config_path(), "schema_version = 0\n").unwrap();

        assert_eq!(manager.load().unwrap().schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_schema_version_too_new() {
        let (manager, _temp_dir) = temp_config_manager();
        std::fs::write(
            manager.config_path(),
            format!("schema_version = {}\n", SCHEMA_VERSION + 1),
        )
        .unwrap();

        let err = manager.load().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("newer than supported"));
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let (manager, _temp_dir) = temp_config_manager();
        manager.save(&Config::default()).unwrap();

        let mode = std::fs::metadata(manager.config_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
