//! Space profile management
//!
//! Profiles are named references to a storage space (the personal drive or a
//! family drive), kept in the configuration file.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ConfigManager;
use crate::entry::Space;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::traits::PanStore;

/// Kind of space a profile points at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceKind {
    #[default]
    Personal,
    Family,
}

/// A named space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceProfile {
    /// Unique name for this profile
    pub name: String,

    /// Personal or family space
    #[serde(default)]
    pub kind: SpaceKind,

    /// Family id, required for family spaces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_id: Option<i64>,
}

impl SpaceProfile {
    /// Profile for the personal drive
    pub fn personal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SpaceKind::Personal,
            family_id: None,
        }
    }

    /// Profile for a family drive
    pub fn family(name: impl Into<String>, family_id: i64) -> Self {
        Self {
            name: name.into(),
            kind: SpaceKind::Family,
            family_id: Some(family_id),
        }
    }

    /// The space this profile addresses
    pub fn space(&self) -> Result<Space> {
        match (self.kind, self.family_id) {
            (SpaceKind::Personal, _) => Ok(Space::Personal),
            (SpaceKind::Family, Some(family_id)) => Ok(Space::Family { family_id }),
            (SpaceKind::Family, None) => Err(Error::Config(format!(
                "space '{}' is a family space without family_id",
                self.name
            ))),
        }
    }
}

/// Manager for space profile operations
pub struct SpaceManager {
    config_manager: ConfigManager,
}

impl SpaceManager {
    /// Create a new SpaceManager with a specific ConfigManager
    pub fn with_config_manager(config_manager: ConfigManager) -> Self {
        Self { config_manager }
    }

    /// Create a new SpaceManager using the default config location
    pub fn new() -> Result<Self> {
        let config_manager = ConfigManager::new()?;
        Ok(Self { config_manager })
    }

    /// List all configured profiles
    pub fn list(&self) -> Result<Vec<SpaceProfile>> {
        let config = self.config_manager.load()?;
        Ok(config.spaces)
    }

    /// Get a profile by name
    pub fn get(&self, name: &str) -> Result<SpaceProfile> {
        let config = self.config_manager.load()?;
        config
            .spaces
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::SpaceNotFound(name.to_string()))
    }

    /// Add or update a profile
    pub fn set(&self, profile: SpaceProfile) -> Result<()> {
        profile.space()?;
        let mut config = self.config_manager.load()?;

        config.spaces.retain(|s| s.name != profile.name);
        config.spaces.push(profile);

        self.config_manager.save(&config)
    }

    /// Remove a profile
    pub fn remove(&self, name: &str) -> Result<()> {
        let mut config = self.config_manager.load()?;
        let original_len = config.spaces.len();

        config.spaces.retain(|s| s.name != name);

        if config.spaces.len() == original_len {
            return Err(Error::SpaceNotFound(name.to_string()));
        }

        self.config_manager.save(&config)
    }

    /// Check if a profile exists
    pub fn exists(&self, name: &str) -> Result<bool> {
        let config = self.config_manager.load()?;
        Ok(config.spaces.iter().any(|s| s.name == name))
    }

    /// Build a session for the named profile using the configured defaults
    pub fn session(&self, name: &str, store: Arc<dyn PanStore>) -> Result<Session> {
        let config = self.config_manager.load()?;
        let profile = config
            .spaces
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::SpaceNotFound(name.to_string()))?;
        Ok(Session::from_config(store, profile.space()?, &config.defaults))
    }
}
