//! Fusion archive construction.
//!
//! An [`ArchiveWriter`] is the scope owning the in-memory zip for one build:
//! it is opened, filled, and either finished into a read-only
//! [`FinishedArchive`] or dropped, which discards the partial archive.

use std::fmt;
use std::io::{Cursor, Write};
use std::sync::Arc;

use anyhow::Context;
use tracing::debug;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::config::FusionConfig;
use crate::error::FuseError;
use crate::types::PackageEntry;

use super::FilterPipeline;

/// A completed fusion archive. Cheap to clone; the bytes are shared.
#[derive(Debug, Clone)]
pub struct FinishedArchive {
    fusion_id: String,
    bytes: Arc<[u8]>,
    entry_names: Vec<String>,
    digest: String,
}

impl FinishedArchive {
    pub fn fusion_id(&self) -> &str {
        &self.fusion_id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.bytes[..])
    }

    pub fn open_zip(&self) -> anyhow::Result<zip::ZipArchive<Cursor<&[u8]>>> {
        zip::ZipArchive::new(self.reader()).context("Failed to read fusion archive")
    }

    /// Entry names in the order they were written.
    pub fn entry_names(&self) -> &[String] {
        &self.entry_names
    }

    /// blake3 hex digest of the archive bytes.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

pub struct ArchiveWriter {
    fusion_id: String,
    zip: Option<ZipWriter<Cursor<Vec<u8>>>>,
    entry_names: Vec<String>,
}

impl ArchiveWriter {
    pub fn open(fusion_id: impl Into<String>) -> Self {
        Self {
            fusion_id: fusion_id.into(),
            zip: Some(ZipWriter::new(Cursor::new(Vec::new()))),
            entry_names: Vec::new(),
        }
    }

    pub fn append(&mut self, entry: &PackageEntry) -> anyhow::Result<()> {
        let zip = self
            .zip
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Archive for '{}' is already closed", self.fusion_id))?;

        zip.start_file(entry.name(), entry_options())
            .with_context(|| format!("Failed to start archive entry: {}", entry.name()))?;
        let mut reader = entry
            .open()
            .with_context(|| format!("Failed to read entry content: {}", entry.name()))?;
        std::io::copy(&mut reader, zip)
            .with_context(|| format!("Failed to write archive entry: {}", entry.name()))?;
        zip.flush()?;

        self.entry_names.push(entry.name().to_string());
        Ok(())
    }

    pub fn finish(mut self) -> anyhow::Result<FinishedArchive> {
        let zip = self
            .zip
            .take()
            .ok_or_else(|| anyhow::anyhow!("Archive for '{}' is already closed", self.fusion_id))?;
        let bytes = zip
            .finish()
            .context("Failed to finalize fusion archive")?
            .into_inner();
        let digest = blake3::hash(&bytes).to_hex().to_string();

        Ok(FinishedArchive {
            fusion_id: std::mem::take(&mut self.fusion_id),
            bytes: Arc::from(bytes),
            entry_names: std::mem::take(&mut self.entry_names),
            digest,
        })
    }
}

impl fmt::Debug for ArchiveWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveWriter")
            .field("fusion_id", &self.fusion_id)
            .field("open", &self.zip.is_some())
            .field("entry_names", &self.entry_names)
            .finish()
    }
}

impl Drop for ArchiveWriter {
    fn drop(&mut self) {
        if self.zip.take().is_some() {
            debug!(
                fusion_id = %self.fusion_id,
                entries = self.entry_names.len(),
                "discarding unfinished fusion archive"
            );
        }
    }
}

// Fixed timestamps keep archives identical for identical inputs.
fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
}

/// Runs the decoration pipeline over composed entries and writes them into
/// a fresh archive.
#[derive(Debug, Clone, Copy)]
pub struct FusionBuilder<'a> {
    pipeline: &'a FilterPipeline,
}

impl<'a> FusionBuilder<'a> {
    pub fn new(pipeline: &'a FilterPipeline) -> Self {
        Self { pipeline }
    }

    /// Decorate, then write.
    pub fn build(
        &self,
        fusion: &FusionConfig,
        entries: Vec<PackageEntry>,
    ) -> Result<FinishedArchive, FuseError> {
        let entries = self.decorate(fusion, entries)?;
        self.write(fusion, &entries)
    }

    /// Run every entry through the filter pipeline. The first rejection
    /// fails the build.
    pub fn decorate(
        &self,
        fusion: &FusionConfig,
        mut entries: Vec<PackageEntry>,
    ) -> Result<Vec<PackageEntry>, FuseError> {
        for entry in &mut entries {
            self.pipeline.apply(fusion, entry)?;
        }
        Ok(entries)
    }

    pub fn write(
        &self,
        fusion: &FusionConfig,
        entries: &[PackageEntry],
    ) -> Result<FinishedArchive, FuseError> {
        let mut archive = ArchiveWriter::open(&fusion.id);

        for entry in entries {
            archive
                .append(entry)
                .map_err(|source| archive_error(fusion, source))?;
            debug!(fusion_id = %fusion.id, entry = entry.name(), "added entry to fusion archive");
        }

        archive.finish().map_err(|source| archive_error(fusion, source))
    }
}

fn archive_error(fusion: &FusionConfig, source: anyhow::Error) -> FuseError {
    FuseError::ArchiveBuild {
        fusion_id: fusion.id.clone(),
        source,
    }
}
