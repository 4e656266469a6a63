//! Engine configuration
//!
//! Usually embedded in the host's own config file under a `[signet]` table,
//! or loaded standalone from a TOML file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use signet_core::{Result, DEFAULT_PRIORITY};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Install the `entity` and `external` namespaces
    pub builtins: bool,
    /// Install the family index as system `family`
    pub family_system: bool,
    /// Priority for hooks attached without an `@n` suffix
    pub default_priority: i32,
    /// Let `entity.create` skip data keys that have no add action
    pub ignore_missing_on_create: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            builtins: true,
            family_system: true,
            default_priority: DEFAULT_PRIORITY,
            ignore_missing_on_create: false,
        }
    }
}

impl EngineConfig {
    /// A bare engine: no built-in namespaces and no family index.
    pub fn bare() -> Self {
        Self {
            builtins: false,
            family_system: false,
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a config file, or return defaults if it is missing or invalid
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No engine config at {:?}, using defaults", path);
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(config) => {
                    info!("Loaded engine config from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse engine config: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read engine config: {}, using defaults", e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signet_core::Error;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("default_priority = 50\n").unwrap();
        assert_eq!(config.default_priority, 50);
        assert!(config.builtins);
        assert!(config.family_system);
        assert!(!config.ignore_missing_on_create);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        assert!(matches!(
            EngineConfig::from_toml_str("builtins = \"yes\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn missing_file_falls_back() {
        let config = EngineConfig::load("/nonexistent/signet/engine.toml");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn unparsable_file_falls_back() {
        let path = std::env::temp_dir().join(format!("signet-config-{}.toml", std::process::id()));
        fs::write(&path, "family_system = 3").unwrap();
        let config = EngineConfig::load(&path);
        fs::remove_file(&path).unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
