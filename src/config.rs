use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde::Deserialize;

use crate::index::MAX_BIT_WIDTH;
use crate::storage::StorageConfig;

/// Top-level application configuration loaded from file + environment.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageSection,
    pub index: IndexSection,
    pub logging: LoggingSection,
}

impl AppConfig {
    /// Load configuration from disk and environment.
    pub fn load() -> Result<Self> {
        let config_path = env::var("BSI_CONFIG").unwrap_or_else(|_| "bsi.toml".to_string());

        let mut builder = config::Config::builder();

        if Path::new(&config_path).exists() {
            builder = builder.add_source(config::File::from(PathBuf::from(&config_path)));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("BSI")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder.build()?;
        let mut config: Self = settings.try_deserialize()?;

        if config.logging.level.trim().is_empty() {
            config.logging.level = "info".to_string();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let width = self.index.default_bit_width;
        if width == 0 || width > MAX_BIT_WIDTH {
            bail!("index.default_bit_width must be within 1..=64, got {}", width);
        }
        if self.index.table.trim().is_empty() {
            bail!("index.table must not be empty");
        }
        if self.index.table.contains('.') {
            bail!("index.table must not contain '.', got {:?}", self.index.table);
        }
        Ok(())
    }

    /// Resolve the storage backend configuration.
    pub fn storage_runtime(&self) -> Result<StorageConfig> {
        self.storage.to_runtime()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub backend: StorageBackendKind,
    pub root_path: String,
}

impl StorageSection {
    pub fn to_runtime(&self) -> Result<StorageConfig> {
        match self.backend {
            StorageBackendKind::Local => {
                if self.root_path.trim().is_empty() {
                    bail!("storage.root_path must be specified for the local backend");
                }
                Ok(StorageConfig::Local {
                    root_path: self.root_path.clone(),
                })
            }
            StorageBackendKind::Memory => Ok(StorageConfig::Memory),
        }
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::Local,
            root_path: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    #[default]
    Local,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexSection {
    /// Table whose column indexes the CLI operates on.
    pub table: String,
    /// Width used for columns created without an explicit width.
    pub default_bit_width: u8,
}

impl IndexSection {
    /// Width for a new column, falling back to `default_bit_width`.
    pub fn bit_width_or_default(&self, requested: Option<u8>) -> u8 {
        requested.unwrap_or(self.default_bit_width)
    }
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            table: "default".to_string(),
            default_bit_width: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}
