//! Host runtime: the default entries every fusion starts from.
//!
//! Default entries are the two synthesized descriptors followed by the host's
//! own runtime files. The listing is taken once per build.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;

use crate::config::FusionConfig;
use crate::fuse::EntryPattern;
use crate::types::{PackageEntry, PackageVersion};

pub const FUSION_DESCRIPTOR: &str = "zapp.fusion.json";
pub const LAUNCH_DESCRIPTOR: &str = "zapp.launch.json";

pub trait HostRuntime: Send + Sync {
    /// Snapshot of the host's runtime files, excluding its primary binary.
    fn runtime_files(&self) -> anyhow::Result<Vec<PackageEntry>>;

    /// File name of the host's primary binary, used as the launch entry point.
    fn primary_binary(&self) -> &str {
        "zapp"
    }

    fn descriptors(
        &self,
        fusion: &FusionConfig,
        versions: &[PackageVersion],
    ) -> anyhow::Result<Vec<PackageEntry>> {
        standard_descriptors(fusion, versions, self.primary_binary())
    }

    fn default_entries(
        &self,
        fusion: &FusionConfig,
        versions: &[PackageVersion],
    ) -> anyhow::Result<Vec<PackageEntry>> {
        let mut entries = self.descriptors(fusion, versions)?;
        entries.extend(self.runtime_files()?);
        Ok(entries)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FusionDescriptor<'a> {
    fusion_id: &'a str,
    packages: Vec<DescriptorPackage<'a>>,
    metadata: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DescriptorPackage<'a> {
    package_id: &'a str,
    deploy_version: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LaunchDescriptor<'a> {
    fusion_id: &'a str,
    entry_point: &'a str,
    arguments: Vec<&'a str>,
}

/// The fusion metadata and process-launch descriptors.
pub fn standard_descriptors(
    fusion: &FusionConfig,
    versions: &[PackageVersion],
    entry_point: &str,
) -> anyhow::Result<Vec<PackageEntry>> {
    let fusion_descriptor = FusionDescriptor {
        fusion_id: &fusion.id,
        packages: versions
            .iter()
            .map(|version| DescriptorPackage {
                package_id: version.package_id(),
                deploy_version: version.deploy_version(),
            })
            .collect(),
        metadata: &fusion.metadata,
    };
    let launch_descriptor = LaunchDescriptor {
        fusion_id: &fusion.id,
        entry_point,
        arguments: vec!["run", fusion.id.as_str()],
    };

    Ok(vec![
        PackageEntry::from_bytes(
            FUSION_DESCRIPTOR,
            serde_json::to_vec_pretty(&fusion_descriptor)
                .context("Failed to serialize fusion descriptor")?,
        ),
        PackageEntry::from_bytes(
            LAUNCH_DESCRIPTOR,
            serde_json::to_vec_pretty(&launch_descriptor)
                .context("Failed to serialize launch descriptor")?,
        ),
    ])
}

/// Host runtime read from the directory the host binary lives in.
#[derive(Debug, Clone)]
pub struct DirectoryHost {
    dir: PathBuf,
    primary_binary: String,
    pattern: EntryPattern,
}

impl DirectoryHost {
    pub fn new(
        dir: impl Into<PathBuf>,
        primary_binary: impl Into<String>,
        pattern: EntryPattern,
    ) -> Self {
        Self {
            dir: dir.into(),
            primary_binary: primary_binary.into(),
            pattern,
        }
    }

    /// The running executable's directory; the executable itself is excluded.
    pub fn current(pattern: EntryPattern) -> anyhow::Result<Self> {
        let exe = std::env::current_exe().context("Failed to locate the host executable")?;
        let dir = exe
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Host executable has no parent directory"))?;
        let name = exe
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow::anyhow!("Host executable has no UTF-8 file name"))?;
        Ok(Self::new(dir, name, pattern))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl HostRuntime for DirectoryHost {
    fn runtime_files(&self) -> anyhow::Result<Vec<PackageEntry>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read host directory: {}", self.dir.display()))?
        {
            let entry = entry.with_context(|| {
                format!("Failed to list host directory: {}", self.dir.display())
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string)
            else {
                continue;
            };
            if name == self.primary_binary || !self.pattern.matches(&name) {
                continue;
            }
            files.push(PackageEntry::from_file(name, path));
        }
        files.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(files)
    }

    fn primary_binary(&self) -> &str {
        &self.primary_binary
    }
}
