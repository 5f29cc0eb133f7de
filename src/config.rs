use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::compat::CompatibilityConfig;
use crate::core::QuestionCatalog;

/// Application configuration, loaded from `config.json` in the data
/// directory (created with defaults on first run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub data_dir: PathBuf,

    /// Optional path to a question catalog JSON file; the built-in
    /// catalog is used when absent
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,

    #[serde(default)]
    pub compatibility: CompatibilityConfig,
}

impl Config {
    pub fn new(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => dirs::config_dir()
                .context("Failed to resolve config directory")?
                .join("kokoro"),
        };

        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        let config_path = data_dir.join("config.json");
        if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).context("Failed to read config.json")?;
            let mut config: Config =
                serde_json::from_str(&content).context("Failed to parse config.json")?;
            config.data_dir = data_dir;
            return Ok(config);
        }

        let config = Config {
            data_dir,
            catalog_path: None,
            compatibility: CompatibilityConfig::new(),
        };
        config.save()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = self.data_dir.join("config.json");
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, json).context("Failed to write config.json")?;
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("kokoro.db")
    }

    /// Load the question catalog: the configured file if set, the
    /// built-in set otherwise. A malformed catalog is fatal.
    pub fn catalog(&self) -> crate::core::Result<QuestionCatalog> {
        match &self.catalog_path {
            Some(path) => QuestionCatalog::from_path(path),
            None => Ok(QuestionCatalog::builtin()),
        }
    }
}
