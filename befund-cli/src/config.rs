use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: u32,
    /// Template file; defaults to `templates.json` in the config directory
    pub templates_path: Option<PathBuf>,
    /// Dictionary file; defaults to `corrections.json` in the config directory
    pub corrections_path: Option<PathBuf>,
    /// Fall back to the shipped dictionary when no dictionary file exists
    pub use_default_corrections: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: 1,
            templates_path: None,
            corrections_path: None,
            use_default_corrections: true,
        }
    }
}

impl Config {
    /// Load config from file, or create default
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {:?}", path))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file {:?}", path))
        } else {
            Ok(Self::default())
        }
    }

    /// Load from the default location, ignoring any error
    pub fn load_or_default() -> Self {
        match Self::default_config_path().and_then(|path| Self::load(&path)) {
            Ok(config) => config,
            Err(e) => {
                debug!("Failed to load config, using default: {:#}", e);
                Self::default()
            }
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = serde_json::to_string_pretty(self)
            .context("Failed to serialize config")?;
        std::fs::write(path, content)
            .context("Failed to write config file")
    }

    /// Get the default config directory
    pub fn default_config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .context("Failed to get home directory")?;
        Ok(home.join(".befundtool"))
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("config.json"))
    }

    pub fn templates_path(&self) -> Result<PathBuf> {
        match &self.templates_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::default_config_dir()?.join("templates.json")),
        }
    }

    pub fn corrections_path(&self) -> Result<PathBuf> {
        match &self.corrections_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::default_config_dir()?.join("corrections.json")),
        }
    }
}
