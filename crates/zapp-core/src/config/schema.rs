//! Configuration schema for zapp.toml
//!
//! ```toml
//! zapp_dir = "/var/lib/zapp"
//!
//! [fuse]
//! entry_pattern = "*.dll"
//!
//! [[fuse.fusions]]
//! id = "web"
//! package_ids = ["core", "plugin"]
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fuse::EntryPattern;
use crate::types::{fold_id, same_id};

use super::paths::{FUSION_ID_PLACEHOLDER, is_path_segment};

/// Root configuration structure for zapp.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZappConfig {
    /// Base directory substituted for `{zappDir}`
    #[serde(default)]
    pub zapp_dir: Option<PathBuf>,

    /// Root of the directory package store
    #[serde(default = "default_packages_dir")]
    pub packages_dir: String,

    /// TOML file read by the file sync source
    #[serde(default = "default_versions_file")]
    pub versions_file: String,

    /// Directory holding the host runtime files (defaults to the executable's directory)
    #[serde(default)]
    pub host_dir: Option<PathBuf>,

    #[serde(default)]
    pub fuse: FuseConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub batch: BatchConfig,
}

impl Default for ZappConfig {
    fn default() -> Self {
        Self {
            zapp_dir: None,
            packages_dir: default_packages_dir(),
            versions_file: default_versions_file(),
            host_dir: None,
            fuse: FuseConfig::default(),
            timeouts: TimeoutConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

fn default_packages_dir() -> String {
    "{zappDir}/packages".to_string()
}

fn default_versions_file() -> String {
    "{zappDir}/versions.toml".to_string()
}

impl ZappConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// The configured `zapp_dir`, or `<data-local-dir>/zapp`.
    pub fn resolve_zapp_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.zapp_dir {
            return Ok(dir.clone());
        }
        Ok(dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine local data directory"))?
            .join("zapp"))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.fuse.validate()?;
        self.timeouts.validate()?;
        if self.batch.max_parallel == 0 {
            anyhow::bail!("batch.max_parallel must be greater than zero");
        }
        Ok(())
    }
}

/// Fusion build settings and the list of configured fusions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuseConfig {
    /// Scratch root for staging extractions
    #[serde(default = "default_root_directory")]
    pub root_directory: String,

    /// Glob selecting which package entries end up in a fusion
    #[serde(default = "default_entry_pattern")]
    pub entry_pattern: String,

    /// Target directory per fusion; must contain `{fusionId}`
    #[serde(default = "default_fusion_directory")]
    pub fusion_directory: String,

    #[serde(default)]
    pub fusions: Vec<FusionConfig>,
}

impl Default for FuseConfig {
    fn default() -> Self {
        Self {
            root_directory: default_root_directory(),
            entry_pattern: default_entry_pattern(),
            fusion_directory: default_fusion_directory(),
            fusions: Vec::new(),
        }
    }
}

fn default_root_directory() -> String {
    "{zappDir}/fuse".to_string()
}

fn default_entry_pattern() -> String {
    "*.dll".to_string()
}

fn default_fusion_directory() -> String {
    "{zappDir}/fusions/{fusionId}".to_string()
}

impl FuseConfig {
    pub fn with_fusions(fusions: Vec<FusionConfig>) -> Self {
        Self {
            fusions,
            ..Self::default()
        }
    }

    /// Case-insensitive lookup by fusion id.
    pub fn find(&self, fusion_id: &str) -> Option<&FusionConfig> {
        self.fusions
            .iter()
            .find(|fusion| same_id(&fusion.id, fusion_id))
    }

    /// Ids of every fusion that declares `package_id`.
    pub fn affected_by(&self, package_id: &str) -> BTreeSet<String> {
        self.fusions
            .iter()
            .filter(|fusion| fusion.references(package_id))
            .map(|fusion| fusion.id.clone())
            .collect()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        EntryPattern::new(&self.entry_pattern)?;

        if !self.fusion_directory.contains(FUSION_ID_PLACEHOLDER) {
            anyhow::bail!(
                "fuse.fusion_directory '{}' must contain {}",
                self.fusion_directory,
                FUSION_ID_PLACEHOLDER
            );
        }

        let mut seen = HashSet::new();
        for fusion in &self.fusions {
            if fusion.id.trim().is_empty() {
                anyhow::bail!("Fusion id must not be empty");
            }
            if !is_path_segment(&fusion.id) {
                anyhow::bail!(
                    "Fusion id '{}' must be a single path segment",
                    fusion.id
                );
            }
            if !seen.insert(fold_id(&fusion.id)) {
                anyhow::bail!("Duplicate fusion id '{}'", fusion.id);
            }
            if fusion.package_ids.iter().any(|id| id.trim().is_empty()) {
                anyhow::bail!("Fusion '{}' declares an empty package id", fusion.id);
            }
        }
        Ok(())
    }
}

/// One deployable fusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionConfig {
    pub id: String,

    /// Packages merged into the fusion, in precedence order
    #[serde(default)]
    pub package_ids: Vec<String>,

    /// Operator-defined values consumed by entry filters
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl FusionConfig {
    pub fn new<I, S>(id: impl Into<String>, package_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            package_ids: package_ids.into_iter().map(Into::into).collect(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn references(&self, package_id: &str) -> bool {
        self.package_ids
            .iter()
            .any(|id| same_id(id, package_id))
    }
}

/// Deadlines, in seconds, for blocking collaborator calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_sync_secs")]
    pub sync: u64,
    #[serde(default = "default_load_secs")]
    pub load: u64,
    #[serde(default = "default_extract_secs")]
    pub extract: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            sync: default_sync_secs(),
            load: default_load_secs(),
            extract: default_extract_secs(),
        }
    }
}

fn default_sync_secs() -> u64 {
    30
}

fn default_load_secs() -> u64 {
    120
}

fn default_extract_secs() -> u64 {
    300
}

impl TimeoutConfig {
    pub fn sync(&self) -> Duration {
        Duration::from_secs(self.sync)
    }

    pub fn load(&self) -> Duration {
        Duration::from_secs(self.load)
    }

    pub fn extract(&self) -> Duration {
        Duration::from_secs(self.extract)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.sync == 0 || self.load == 0 || self.extract == 0 {
            anyhow::bail!("timeouts must be greater than zero seconds");
        }
        Ok(())
    }
}

/// What `extract_batch` does after one fusion fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchPolicy {
    /// Attempt every fusion, concurrently, and AND the results.
    #[default]
    AttemptAll,
    /// Attempt fusions in order and stop at the first one that does not succeed.
    StopAtFirstFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub policy: BatchPolicy,

    /// Upper bound on concurrently running builds under `attempt-all`
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            policy: BatchPolicy::default(),
            max_parallel: default_max_parallel(),
        }
    }
}

fn default_max_parallel() -> usize {
    4
}
