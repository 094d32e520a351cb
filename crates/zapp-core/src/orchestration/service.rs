//! The fusion orchestrator: the entry point for every fusion operation.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::blocking::{run_blocking, run_cancellable};
use crate::config::{BatchConfig, ConfigSource, FuseConfig, FusionConfig, TimeoutConfig};
use crate::deploy::ArchiveExtractor;
use crate::error::{FuseError, require_id};
use crate::fuse::{EntryFilter, EntryPattern, FilterPipeline, FusionBuilder, compose};
use crate::host::HostRuntime;
use crate::package::{PackageLoader, PackageStore, Readiness};
use crate::types::PackageVersion;
use crate::version::{SyncSource, VersionResolver};

/// The external collaborators a build talks to.
#[derive(Clone)]
pub struct FuseServices {
    pub config: Arc<dyn ConfigSource>,
    pub sync: Arc<dyn SyncSource>,
    pub store: Arc<dyn PackageStore>,
    pub host: Arc<dyn HostRuntime>,
    pub extractor: Arc<dyn ArchiveExtractor>,
}

/// Outcome of one fusion build that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FusionBuildResult {
    Extracted { digest: String, entries: usize },
    /// The sync source has no version yet for these packages.
    VersionsUnresolved { unknown: Vec<String> },
    /// These versions are resolved but not deployed locally yet.
    PackagesNotDeployed { pending: Vec<PackageVersion> },
}

impl FusionBuildResult {
    pub fn is_success(&self) -> bool {
        matches!(self, FusionBuildResult::Extracted { .. })
    }

    /// Gating outcomes: retry once sync and deployment catch up.
    pub fn is_not_ready(&self) -> bool {
        !self.is_success()
    }
}

/// Stages of a single build, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Resolving,
    Gating,
    Loading,
    Composing,
    Decorating,
    Building,
    Extracting,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::Resolving => "resolving",
            BuildStage::Gating => "gating",
            BuildStage::Loading => "loading",
            BuildStage::Composing => "composing",
            BuildStage::Decorating => "decorating",
            BuildStage::Building => "building",
            BuildStage::Extracting => "extracting",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct FusionOrchestrator {
    config: Arc<dyn ConfigSource>,
    resolver: VersionResolver,
    loader: PackageLoader,
    host: Arc<dyn HostRuntime>,
    extractor: Arc<dyn ArchiveExtractor>,
    filters: FilterPipeline,
    timeouts: TimeoutConfig,
    pub(super) batch: BatchConfig,
}

impl FusionOrchestrator {
    pub fn new(services: FuseServices) -> Self {
        Self {
            config: services.config,
            resolver: VersionResolver::new(services.sync),
            loader: PackageLoader::new(services.store),
            host: services.host,
            extractor: services.extractor,
            filters: FilterPipeline::new(),
            timeouts: TimeoutConfig::default(),
            batch: BatchConfig::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    /// Filters run in the order they are added.
    pub fn with_filter(mut self, filter: impl EntryFilter + 'static) -> Self {
        self.filters.register(filter);
        self
    }

    pub fn filters(&self) -> &FilterPipeline {
        &self.filters
    }

    /// Build and extract one fusion.
    ///
    /// `Ok(false)` means a package version is unresolved or not deployed yet.
    pub async fn extract_fusion(&self, fusion_id: &str) -> Result<bool, FuseError> {
        Ok(self.build_fusion(fusion_id).await?.is_success())
    }

    pub async fn build_fusion(&self, fusion_id: &str) -> Result<FusionBuildResult, FuseError> {
        let fusion_id = require_id(fusion_id, "fusion id")?;
        let fuse = self.fuse_config()?;
        let fusion = Arc::new(find_fusion(&fuse, fusion_id)?.clone());
        let pattern = EntryPattern::new(&fuse.entry_pattern).map_err(FuseError::Config)?;
        let id = fusion.id.clone();

        debug!(fusion_id = %id, stage = %BuildStage::Resolving, "fusion build stage");
        let versions = self.resolve(&fusion).await?;

        debug!(fusion_id = %id, stage = %BuildStage::Gating, "fusion build stage");
        let loader = self.loader.clone();
        let gated = versions.clone();
        let readiness = run_blocking(
            format!("deployment check for fusion '{}'", id),
            self.timeouts.sync(),
            move || Ok(loader.check(&gated)),
        )
        .await?;

        match readiness {
            Readiness::Ready => {}
            Readiness::VersionsUnresolved { unknown } => {
                warn!(
                    fusion_id = %id,
                    packages = ?unknown,
                    "fusion '{}' skipped: package versions are not resolved yet",
                    id
                );
                return Ok(FusionBuildResult::VersionsUnresolved { unknown });
            }
            Readiness::NotDeployed { pending } => {
                let pending_names: Vec<String> = pending.iter().map(ToString::to_string).collect();
                warn!(
                    fusion_id = %id,
                    packages = ?pending_names,
                    "fusion '{}' skipped: packages are not deployed yet",
                    id
                );
                return Ok(FusionBuildResult::PackagesNotDeployed { pending });
            }
        }

        debug!(fusion_id = %id, stage = %BuildStage::Loading, "fusion build stage");
        let packages = self.loader.load_all(&versions, self.timeouts.load()).await?;

        debug!(fusion_id = %id, stage = %BuildStage::Composing, "fusion build stage");
        let host = self.host.clone();
        let filters = self.filters.clone();
        let building = fusion.clone();
        let archive = run_blocking(
            format!("build of fusion '{}'", id),
            self.timeouts.load(),
            move || {
                let defaults = host
                    .default_entries(&building, &versions)
                    .map_err(|source| FuseError::ArchiveBuild {
                        fusion_id: building.id.clone(),
                        source,
                    })?;
                let entries = compose(defaults, packages, &pattern);

                let builder = FusionBuilder::new(&filters);
                debug!(
                    fusion_id = %building.id,
                    stage = %BuildStage::Decorating,
                    "fusion build stage"
                );
                let entries = builder.decorate(&building, entries)?;

                debug!(
                    fusion_id = %building.id,
                    stage = %BuildStage::Building,
                    "fusion build stage"
                );
                builder.write(&building, &entries)
            },
        )
        .await?;

        debug!(fusion_id = %id, stage = %BuildStage::Extracting, "fusion build stage");
        let extractor = self.extractor.clone();
        let extracting = fusion.clone();
        let handed_off = archive.clone();
        run_cancellable(
            format!("extraction of fusion '{}'", id),
            self.timeouts.extract(),
            move |cancellation| {
                extractor
                    .extract(&fuse, &extracting, &handed_off, cancellation)
                    .map_err(|source| FuseError::Extraction {
                        fusion_id: extracting.id.clone(),
                        source,
                    })
            },
        )
        .await?;

        info!(
            fusion_id = %id,
            digest = archive.digest(),
            entries = archive.entry_names().len(),
            "fusion extracted"
        );
        Ok(FusionBuildResult::Extracted {
            digest: archive.digest().to_string(),
            entries: archive.entry_names().len(),
        })
    }

    /// Ids of every configured fusion that declares `package_id`.
    pub fn affected_fusions(&self, package_id: &str) -> Result<BTreeSet<String>, FuseError> {
        let package_id = require_id(package_id, "package id")?;
        Ok(self.fuse_config()?.affected_by(package_id))
    }

    /// Resolved versions for a fusion, without gating or loading.
    pub async fn package_versions(
        &self,
        fusion_id: &str,
    ) -> Result<Vec<PackageVersion>, FuseError> {
        let fusion_id = require_id(fusion_id, "fusion id")?;
        let fuse = self.fuse_config()?;
        let fusion = find_fusion(&fuse, fusion_id)?.clone();
        self.resolve(&fusion).await
    }

    async fn resolve(&self, fusion: &FusionConfig) -> Result<Vec<PackageVersion>, FuseError> {
        let resolver = self.resolver.clone();
        let owned = fusion.clone();
        run_blocking(
            format!("version sync for fusion '{}'", fusion.id),
            self.timeouts.sync(),
            move || resolver.resolve(&owned),
        )
        .await
    }

    fn fuse_config(&self) -> Result<Arc<FuseConfig>, FuseError> {
        self.config.fuse_config().map_err(FuseError::Config)
    }
}

fn find_fusion<'a>(fuse: &'a FuseConfig, fusion_id: &str) -> Result<&'a FusionConfig, FuseError> {
    fuse.find(fusion_id)
        .ok_or_else(|| FuseError::FusionNotFound(fusion_id.to_string()))
}

impl fmt::Debug for FusionOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FusionOrchestrator")
            .field("filters", &self.filters)
            .field("timeouts", &self.timeouts)
            .field("batch", &self.batch)
            .finish_non_exhaustive()
    }
}
