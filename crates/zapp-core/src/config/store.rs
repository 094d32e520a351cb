//! Config store for loading and saving zapp.toml.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use super::{FuseConfig, ZappConfig, parser};

/// Read-only access to the fuse configuration.
///
/// Each call returns a snapshot; a build keeps using the snapshot it started
/// with even if the backing file changes.
pub trait ConfigSource: Send + Sync {
    fn fuse_config(&self) -> anyhow::Result<Arc<FuseConfig>>;
}

impl ConfigSource for FuseConfig {
    fn fuse_config(&self) -> anyhow::Result<Arc<FuseConfig>> {
        Ok(Arc::new(self.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// `<config-dir>/zapp/zapp.toml`
    pub fn default_location() -> anyhow::Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("zapp");
        Ok(Self::new(dir.join("zapp.toml")))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn load(&self) -> anyhow::Result<ZappConfig> {
        if !self.config_path.exists() {
            return Ok(ZappConfig::new());
        }
        parser::parse_zapp_toml(&self.config_path)
    }

    pub fn save(&self, config: &ZappConfig) -> anyhow::Result<()> {
        let content = parser::to_toml(config)?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.config_path, content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;
        Ok(())
    }
}

impl ConfigSource for ConfigStore {
    fn fuse_config(&self) -> anyhow::Result<Arc<FuseConfig>> {
        Ok(Arc::new(self.load()?.fuse))
    }
}
