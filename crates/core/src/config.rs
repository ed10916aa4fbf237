//! Configuration management
//!
//! This module handles loading, saving, and migrating the pan configuration file.
//! The configuration file is stored in TOML format at ~/.config/pan/config.toml,
//! or under `$PAN_CONFIG_DIR` when that variable is set.
//!
//! PROTECTED FILE: Changes to schema_version require migration support.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::entry::{DEFAULT_PAGE_SIZE, ListOptions, OrderBy};
use crate::error::{Error, Result};
use crate::space::SpaceProfile;
use crate::transfer::DEFAULT_CHUNK_SIZE;

/// Current configuration schema version
///
/// IMPORTANT: Bumping this version requires:
/// 1. Adding a migration in `ConfigManager::migrate`
/// 2. Updating migration tests
/// 3. Marking the change as BREAKING
pub const SCHEMA_VERSION: u32 = 1;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "PAN_CONFIG_DIR";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Schema version for migration support
    pub schema_version: u32,

    /// Default settings
    #[serde(default)]
    pub defaults: Defaults,

    /// Configured space profiles
    #[serde(default)]
    pub spaces: Vec<SpaceProfile>,
}

/// Default settings for listing and transfers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defaults {
    /// Entries requested per listing page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Listing sort key: "name", "size" or "time"
    #[serde(default)]
    pub order_by: OrderBy,

    /// Sort listings in descending order
    #[serde(default)]
    pub descending: bool,

    /// Upload chunk size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Cache resolved paths within a process
    #[serde(default)]
    pub path_cache: bool,

    /// Directory for persisted upload state; uploads are not resumable
    /// across restarts when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            order_by: OrderBy::default(),
            descending: false,
            chunk_size: default_chunk_size(),
            path_cache: false,
            state_dir: None,
        }
    }
}

impl Defaults {
    /// Listing options described by these defaults
    pub fn list_options(&self) -> ListOptions {
        ListOptions {
            order_by: self.order_by,
            descending: self.descending,
            page_size: self.page_size,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            defaults: Defaults::default(),
            spaces: Vec::new(),
        }
    }
}

/// Configuration manager handles loading and saving config
#[derive(Debug)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the default config path
    pub fn new() -> Result<Self> {
        let config_dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::config_dir()
                .ok_or_else(|| Error::Config("Could not determine config directory".into()))?
                .join("pan"),
        };
        Ok(Self {
            config_path: config_dir.join("config.toml"),
        })
    }

    /// Create a ConfigManager with a custom path (useful for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load configuration from disk
    ///
    /// If the configuration file doesn't exist, returns a default configuration.
    /// If the schema version doesn't match, attempts migration.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        if config.schema_version < SCHEMA_VERSION {
            config = self.migrate(config)?;
        } else if config.schema_version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "Configuration file version {} is newer than supported version {}. Please upgrade pan.",
                config.schema_version, SCHEMA_VERSION
            )));
        }

        if config.defaults.page_size == 0 {
            return Err(Error::Config("defaults.page_size must be positive".into()));
        }

        Ok(config)
    }

    /// Save configuration to disk
    ///
    /// Creates parent directories if they don't exist.
    /// Sets file permissions to 600 (owner read/write only).
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(config)?;
        std::fs::write(&self.config_path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.config_path, permissions)?;
        }

        tracing::debug!("saved configuration to {}", self.config_path.display());
        Ok(())
    }

    /// Migrate configuration from older schema version
    fn migrate(&self, mut config: Config) -> Result<Config> {
        tracing::info!(
            "migrating configuration from schema {} to {}",
            config.schema_version,
            SCHEMA_VERSION
        );
        config.schema_version = SCHEMA_VERSION;
        Ok(config)
    }
}
