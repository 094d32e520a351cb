//! Unpack a fusion archive into its target directory.

use std::collections::HashMap;
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::blocking::Cancellation;
use crate::config::paths::is_path_segment;
use crate::config::{FuseConfig, FusionConfig, PathResolver};
use crate::fuse::FinishedArchive;

/// Marker written next to the extracted files.
pub const EXTRACTION_RECORD: &str = ".zapp-extracted.json";

pub trait ArchiveExtractor: Send + Sync {
    /// Publish `archive` as the content of `fusion`.
    ///
    /// Directories come from the `fuse` snapshot of the current build.
    /// Nothing may become visible unless `cancellation.try_commit()`
    /// returned true.
    fn extract(
        &self,
        fuse: &FuseConfig,
        fusion: &FusionConfig,
        archive: &FinishedArchive,
        cancellation: &Cancellation,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub fusion_id: String,
    pub digest: String,
    pub entries: usize,
    pub extracted_at: chrono::DateTime<chrono::Utc>,
}

impl ExtractionRecord {
    pub fn read(fusion_dir: &Path) -> anyhow::Result<Self> {
        let path = fusion_dir.join(EXTRACTION_RECORD);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read extraction record: {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse extraction record: {}", path.display()))
    }
}

/// Extracts into a fresh staging directory under the fuse root, then swaps
/// it into place. The root and fusion directories must share a filesystem.
///
/// Extractions of the same fusion directory through one extractor (or its
/// clones) run one at a time.
#[derive(Debug, Clone)]
pub struct DirectoryExtractor {
    resolver: PathResolver,
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl DirectoryExtractor {
    pub fn new(resolver: PathResolver) -> Self {
        Self {
            resolver,
            locks: Arc::default(),
        }
    }

    pub fn fusion_directory(&self, fuse: &FuseConfig, fusion_id: &str) -> PathBuf {
        self.resolver.fusion_directory(fuse, fusion_id)
    }

    fn fusion_lock(&self, target: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(target.to_path_buf()).or_default().clone()
    }

    fn stage(
        &self,
        archive: &FinishedArchive,
        staging: &Path,
        cancellation: &Cancellation,
    ) -> anyhow::Result<()> {
        let mut zip = archive.open_zip()?;
        for i in 0..zip.len() {
            if cancellation.is_cancelled() {
                anyhow::bail!("Extraction of fusion '{}' was cancelled", archive.fusion_id());
            }
            let mut file = zip
                .by_index(i)
                .with_context(|| format!("Failed to read archive entry {}", i))?;

            let outpath = match file.enclosed_name() {
                Some(path) => staging.join(path),
                None => anyhow::bail!("Archive entry escapes the fusion directory: {}", file.name()),
            };

            if file.is_dir() {
                std::fs::create_dir_all(&outpath).with_context(|| {
                    format!("Failed to create directory: {}", outpath.display())
                })?;
                continue;
            }

            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create parent directory: {}", parent.display())
                })?;
            }

            let mut buffer = Vec::new();
            file.read_to_end(&mut buffer)
                .with_context(|| format!("Failed to read archive entry: {}", file.name()))?;
            let mut outfile = std::fs::File::create(&outpath)
                .with_context(|| format!("Failed to create file: {}", outpath.display()))?;
            outfile
                .write_all(&buffer)
                .with_context(|| format!("Failed to write file: {}", outpath.display()))?;
        }

        let record = ExtractionRecord {
            fusion_id: archive.fusion_id().to_string(),
            digest: archive.digest().to_string(),
            entries: archive.entry_names().len(),
            extracted_at: chrono::Utc::now(),
        };
        let record_path = staging.join(EXTRACTION_RECORD);
        std::fs::write(
            &record_path,
            serde_json::to_vec_pretty(&record).context("Failed to serialize extraction record")?,
        )
        .with_context(|| format!("Failed to write {}", record_path.display()))?;

        Ok(())
    }
}

impl ArchiveExtractor for DirectoryExtractor {
    fn extract(
        &self,
        fuse: &FuseConfig,
        fusion: &FusionConfig,
        archive: &FinishedArchive,
        cancellation: &Cancellation,
    ) -> anyhow::Result<()> {
        if !is_path_segment(&fusion.id) {
            anyhow::bail!("Fusion id '{}' is not a single path segment", fusion.id);
        }
        let root = self.resolver.root_directory(fuse);
        let target = self.fusion_directory(fuse, &fusion.id);

        let lock = self.fusion_lock(&target);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create fuse root: {}", root.display()))?;
        // Removed on drop unless the swap moved it away.
        let staging = tempfile::Builder::new()
            .prefix(&format!(".staging-{}-", fusion.id))
            .tempdir_in(&root)
            .with_context(|| format!("Failed to create staging directory in {}", root.display()))?;

        self.stage(archive, staging.path(), cancellation)?;

        if !cancellation.try_commit() {
            anyhow::bail!("Extraction of fusion '{}' was cancelled", fusion.id);
        }
        swap_into_place(staging.path(), &target)?;

        debug!(fusion_id = %fusion.id, path = %target.display(), "fusion directory replaced");
        Ok(())
    }
}

/// Replace `target` with `staging`. The previous fusion is moved aside first
/// and restored if the replacement fails.
fn swap_into_place(staging: &Path, target: &Path) -> anyhow::Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create fusion parent directory: {}", parent.display())
        })?;
    }

    let retired = if target.exists() {
        let mut name = OsString::from(staging.as_os_str());
        name.push(".previous");
        let retired = PathBuf::from(name);
        std::fs::rename(target, &retired).with_context(|| {
            format!("Failed to move previous fusion aside: {}", target.display())
        })?;
        Some(retired)
    } else {
        None
    };

    if let Err(e) = std::fs::rename(staging, target) {
        if let Some(retired) = &retired
            && let Err(restore) = std::fs::rename(retired, target)
        {
            warn!(
                path = %retired.display(),
                error = %restore,
                "failed to restore previous fusion"
            );
        }
        return Err(e).with_context(|| {
            format!("Failed to move {} to {}", staging.display(), target.display())
        });
    }

    if let Some(retired) = retired
        && let Err(e) = std::fs::remove_dir_all(&retired)
    {
        warn!(path = %retired.display(), error = %e, "failed to remove previous fusion");
    }
    Ok(())
}
