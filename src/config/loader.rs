//! Configuration Loader
//!
//! Handles loading and merging client configuration from multiple sources.

use crate::config::settings::ClientConfig;
use crate::error::{ItineraError, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Configuration loader with support for multiple sources
pub struct ConfigLoader {
    merged: Value,
}

impl ConfigLoader {
    /// Create a new config loader and load from default locations
    pub fn new() -> Result<Self> {
        let mut loader = Self::with_builtin_defaults()?;

        // Then load from file system (can override built-ins)
        loader.load_from_default_paths()?;

        Ok(loader)
    }

    /// Create a loader with a specific config file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut loader = Self::with_builtin_defaults()?;
        loader.load_from_file(path)?;
        Ok(loader)
    }

    fn with_builtin_defaults() -> Result<Self> {
        let defaults = include_str!("../../defaults.json");
        let merged: Value = serde_json::from_str(defaults).map_err(|e| {
            ItineraError::Config(format!("Failed to parse built-in defaults.json: {}", e))
        })?;
        Ok(Self { merged })
    }

    /// Load configuration from default paths
    fn load_from_default_paths(&mut self) -> Result<()> {
        for path in Self::get_config_paths() {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading config file");
                self.load_from_file(&path)?;
            }
        }

        Ok(())
    }

    /// Get list of config paths to check
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // 1. Environment variable
        if let Ok(custom_path) = std::env::var("ITINERA_CONFIG_PATH") {
            paths.push(PathBuf::from(custom_path));
        }

        // 2. Current directory
        paths.push(PathBuf::from("itinera.json"));

        // 3. User config directory
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("itinera").join("config.json"));
        }

        // 4. Home directory
        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".itinera").join("config.json"));
        }

        paths
    }

    /// Load configuration from a specific file
    fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ItineraError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let overlay: Value = serde_json::from_str(&content).map_err(|e| {
            ItineraError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        if !overlay.is_object() {
            return Err(ItineraError::Config(format!(
                "{} must contain a JSON object",
                path.display()
            )));
        }

        merge_values(&mut self.merged, overlay);
        Ok(())
    }

    /// Take ownership of the configuration
    pub fn into_config(self) -> Result<ClientConfig> {
        serde_json::from_value(self.merged)
            .map_err(|e| ItineraError::Config(format!("Invalid configuration: {}", e)))
    }
}

/// Merge `overlay` into `base`; objects merge per key, everything else replaces
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
