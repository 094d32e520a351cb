//! Adapter over the package store.
//!
//! [`PackageLoader::check`] is the gate: it never loads anything. Loads only
//! happen through [`PackageLoader::load_all`], after the gate passed for every
//! package of the fusion.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::blocking::run_blocking;
use crate::error::FuseError;
use crate::types::{Package, PackageVersion};

pub trait PackageStore: Send + Sync {
    fn load_package(&self, version: &PackageVersion) -> anyhow::Result<Package>;

    /// Whether `version` is already present locally.
    fn is_deployed(&self, version: &PackageVersion) -> bool;
}

/// Result of the deployability gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Package ids the sync source has no version for.
    VersionsUnresolved { unknown: Vec<String> },
    /// Resolved versions the store does not have yet.
    NotDeployed { pending: Vec<PackageVersion> },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

#[derive(Clone)]
pub struct PackageLoader {
    store: Arc<dyn PackageStore>,
}

impl PackageLoader {
    pub fn new(store: Arc<dyn PackageStore>) -> Self {
        Self { store }
    }

    /// Unknown versions are reported without asking the store anything.
    pub fn check(&self, versions: &[PackageVersion]) -> Readiness {
        let unknown: Vec<String> = versions
            .iter()
            .filter(|version| version.is_unknown())
            .map(|version| version.package_id().to_string())
            .collect();
        if !unknown.is_empty() {
            return Readiness::VersionsUnresolved { unknown };
        }

        let pending: Vec<PackageVersion> = versions
            .iter()
            .filter(|version| !self.store.is_deployed(version))
            .cloned()
            .collect();
        if !pending.is_empty() {
            return Readiness::NotDeployed { pending };
        }

        Readiness::Ready
    }

    pub fn ensure_deployable(&self, versions: &[PackageVersion]) -> bool {
        self.check(versions).is_ready()
    }

    pub fn load(&self, version: &PackageVersion) -> Result<Package, FuseError> {
        if version.is_unknown() {
            return Err(FuseError::PackageLoad {
                version: version.clone(),
                source: anyhow::anyhow!("version is not resolved"),
            });
        }
        self.store
            .load_package(version)
            .map_err(|source| FuseError::PackageLoad {
                version: version.clone(),
                source,
            })
    }

    /// Load every package in order, each under its own deadline. The first
    /// failure aborts the whole set.
    pub async fn load_all(
        &self,
        versions: &[PackageVersion],
        deadline: Duration,
    ) -> Result<Vec<Package>, FuseError> {
        let mut packages = Vec::with_capacity(versions.len());
        for version in versions {
            let loader = self.clone();
            let owned = version.clone();
            let package = run_blocking(format!("load of package {}", version), deadline, move || {
                loader.load(&owned)
            })
            .await?;
            packages.push(package);
        }
        Ok(packages)
    }
}

impl fmt::Debug for PackageLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageLoader").finish_non_exhaustive()
    }
}
