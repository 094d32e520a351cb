//! Resolve the deploy version of every package a fusion declares.

use std::fmt;
use std::sync::Arc;

use crate::config::FusionConfig;
use crate::error::{FuseError, require_id};
use crate::types::PackageVersion;

/// The authority for "which version of package X should run now".
pub trait SyncSource: Send + Sync {
    /// `Ok(None)` means the version is not known yet.
    fn sync(&self, package_id: &str) -> anyhow::Result<Option<String>>;
}

/// Queries the sync source once per package on every call; nothing is cached.
#[derive(Clone)]
pub struct VersionResolver {
    sync: Arc<dyn SyncSource>,
}

impl VersionResolver {
    pub fn new(sync: Arc<dyn SyncSource>) -> Self {
        Self { sync }
    }

    /// One [`PackageVersion`] per declared package, in declaration order.
    pub fn resolve(&self, fusion: &FusionConfig) -> Result<Vec<PackageVersion>, FuseError> {
        fusion
            .package_ids
            .iter()
            .map(|package_id| self.resolve_package(package_id))
            .collect()
    }

    pub fn resolve_package(&self, package_id: &str) -> Result<PackageVersion, FuseError> {
        let package_id = require_id(package_id, "package id")?;
        let version = self
            .sync
            .sync(package_id)
            .map_err(|source| FuseError::Sync {
                package_id: package_id.to_string(),
                source,
            })?;
        Ok(PackageVersion::new(package_id, version))
    }
}

impl fmt::Debug for VersionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapSync {
        versions: HashMap<String, String>,
        queries: Mutex<Vec<String>>,
    }

    impl SyncSource for MapSync {
        fn sync(&self, package_id: &str) -> anyhow::Result<Option<String>> {
            self.queries.lock().unwrap().push(package_id.to_string());
            if package_id == "broken" {
                anyhow::bail!("sync backend unavailable");
            }
            Ok(self.versions.get(package_id).cloned())
        }
    }

    fn resolver(versions: &[(&str, &str)]) -> (Arc<MapSync>, VersionResolver) {
        let sync = Arc::new(MapSync {
            versions: versions
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..MapSync::default()
        });
        (sync.clone(), VersionResolver::new(sync))
    }

    #[test]
    fn resolves_in_declaration_order() {
        let (sync, resolver) = resolver(&[("core", "2.0.0"), ("plugin", "1.1.0")]);
        let fusion = FusionConfig::new("web", ["plugin", "core", "extra"]);

        let versions = resolver.resolve(&fusion).unwrap();

        assert_eq!(
            versions,
            vec![
                PackageVersion::new("plugin", Some("1.1.0")),
                PackageVersion::new("core", Some("2.0.0")),
                PackageVersion::unknown("extra"),
            ]
        );
        assert_eq!(*sync.queries.lock().unwrap(), vec!["plugin", "core", "extra"]);
    }

    #[test]
    fn every_call_queries_again() {
        let (sync, resolver) = resolver(&[("core", "2.0.0")]);
        let fusion = FusionConfig::new("web", ["core"]);

        resolver.resolve(&fusion).unwrap();
        resolver.resolve(&fusion).unwrap();

        assert_eq!(sync.queries.lock().unwrap().len(), 2);
    }

    #[test]
    fn empty_package_id_fails_before_querying() {
        let (sync, resolver) = resolver(&[]);

        let err = resolver.resolve_package("").unwrap_err();

        assert!(matches!(err, FuseError::InvalidArgument("package id")));
        assert!(sync.queries.lock().unwrap().is_empty());
    }

    #[test]
    fn sync_failure_is_not_an_unknown_version() {
        let (_sync, resolver) = resolver(&[]);

        let err = resolver.resolve_package("broken").unwrap_err();

        assert!(matches!(err, FuseError::Sync { ref package_id, .. } if package_id == "broken"));
    }

    #[test]
    fn empty_fusion_resolves_to_nothing() {
        let (_sync, resolver) = resolver(&[]);
        let fusion = FusionConfig::new("bare", Vec::<String>::new());
        assert!(resolver.resolve(&fusion).unwrap().is_empty());
    }
}
