//! A sync source backed by a TOML file of target versions.
//!
//! ```toml
//! [versions]
//! core = "2.0.0"
//! plugin = "1.4.1"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use super::SyncSource;
use crate::types::same_id;

#[derive(Debug, Default, Deserialize)]
struct VersionFile {
    #[serde(default)]
    versions: HashMap<String, String>,
}

/// Re-reads the file on every query so operators can edit it in place.
#[derive(Debug, Clone)]
pub struct VersionFileSync {
    path: PathBuf,
}

impl VersionFileSync {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> anyhow::Result<VersionFile> {
        if !self.path.exists() {
            return Ok(VersionFile::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read version file: {}", self.path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse version file: {}", self.path.display()))
    }
}

impl SyncSource for VersionFileSync {
    fn sync(&self, package_id: &str) -> anyhow::Result<Option<String>> {
        let file = self.read()?;
        let version = file.versions.get(package_id).or_else(|| {
            file.versions
                .iter()
                .find(|(id, _)| same_id(id, package_id))
                .map(|(_, version)| version)
        });
        Ok(version
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()))
    }
}
