//! In-memory collaborators that count every call made to them.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use zapp_core::config::{FuseConfig, FusionConfig};
use zapp_core::deploy::{ArchiveExtractor, Cancellation};
use zapp_core::fuse::FinishedArchive;
use zapp_core::host::HostRuntime;
use zapp_core::orchestration::{FuseServices, FusionOrchestrator};
use zapp_core::package::PackageStore;
use zapp_core::types::{Package, PackageEntry, PackageVersion};
use zapp_core::version::SyncSource;

#[derive(Default)]
pub struct FakeSync {
    versions: HashMap<String, String>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    pub queries: Mutex<Vec<String>>,
}

impl FakeSync {
    pub fn new<'a>(versions: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            versions: versions
                .into_iter()
                .map(|(id, version)| (id.to_string(), version.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing(mut self, package_id: &str) -> Self {
        self.failing.insert(package_id.to_string());
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

impl SyncSource for FakeSync {
    fn sync(&self, package_id: &str) -> anyhow::Result<Option<String>> {
        self.queries.lock().unwrap().push(package_id.to_string());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.failing.contains(package_id) {
            anyhow::bail!("sync service unavailable");
        }
        Ok(self.versions.get(package_id).cloned())
    }
}

#[derive(Default)]
pub struct FakeStore {
    packages: HashMap<PackageVersion, Vec<(String, Vec<u8>)>>,
    undeployed: HashSet<PackageVersion>,
    broken: HashSet<String>,
    delay: Option<Duration>,
    pub deployed_queries: Mutex<Vec<PackageVersion>>,
    pub loads: Mutex<Vec<PackageVersion>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A deployed package whose entries carry `"<package>:<name>"` as content.
    pub fn with_package(mut self, package_id: &str, version: &str, names: &[&str]) -> Self {
        let entries = names
            .iter()
            .map(|name| (name.to_string(), format!("{}:{}", package_id, name).into_bytes()))
            .collect();
        self.packages
            .insert(PackageVersion::new(package_id, Some(version)), entries);
        self
    }

    /// Known to the store but not deployed yet.
    pub fn pending(mut self, package_id: &str, version: &str) -> Self {
        self.undeployed
            .insert(PackageVersion::new(package_id, Some(version)));
        self
    }

    /// Deployed, but every load fails.
    pub fn broken(mut self, package_id: &str) -> Self {
        self.broken.insert(package_id.to_string());
        self
    }

    /// Every load takes `delay`.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn deployed_query_ids(&self) -> Vec<String> {
        self.deployed_queries
            .lock()
            .unwrap()
            .iter()
            .map(|version| version.package_id().to_string())
            .collect()
    }

    pub fn load_count(&self) -> usize {
        self.loads.lock().unwrap().len()
    }
}

impl PackageStore for FakeStore {
    fn load_package(&self, version: &PackageVersion) -> anyhow::Result<Package> {
        self.loads.lock().unwrap().push(version.clone());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.broken.contains(version.package_id()) {
            anyhow::bail!("package archive is corrupt");
        }
        let entries = self
            .packages
            .get(version)
            .ok_or_else(|| anyhow::anyhow!("no such package {}", version))?
            .iter()
            .map(|(name, bytes)| PackageEntry::from_bytes(name.clone(), bytes.clone()))
            .collect();
        Ok(Package::new(version.clone(), entries))
    }

    fn is_deployed(&self, version: &PackageVersion) -> bool {
        self.deployed_queries.lock().unwrap().push(version.clone());
        if self.undeployed.contains(version) {
            return false;
        }
        self.packages.contains_key(version) || self.broken.contains(version.package_id())
    }
}

/// Host whose runtime files carry `"host:<name>"` unless given explicit content.
#[derive(Default)]
pub struct FakeHost {
    files: Vec<(String, String)>,
}

impl FakeHost {
    pub fn new(files: &[&str]) -> Self {
        Self {
            files: files
                .iter()
                .map(|name| (name.to_string(), format!("host:{}", name)))
                .collect(),
        }
    }

    pub fn with_file(mut self, name: &str, content: &str) -> Self {
        self.files.push((name.to_string(), content.to_string()));
        self
    }
}

impl HostRuntime for FakeHost {
    fn runtime_files(&self) -> anyhow::Result<Vec<PackageEntry>> {
        Ok(self
            .files
            .iter()
            .map(|(name, content)| PackageEntry::from_bytes(name.clone(), content.clone()))
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct ExtractedFusion {
    pub fusion_id: String,
    pub digest: String,
    pub entry_names: Vec<String>,
    pub contents: BTreeMap<String, Vec<u8>>,
}

impl ExtractedFusion {
    pub fn content(&self, name: &str) -> String {
        String::from_utf8(self.contents[name].clone()).unwrap()
    }
}

#[derive(Default)]
pub struct RecordingExtractor {
    failing: HashSet<String>,
    delay: Option<Duration>,
    pub extractions: Mutex<Vec<ExtractedFusion>>,
}

impl RecordingExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, fusion_id: &str) -> Self {
        self.failing.insert(fusion_id.to_string());
        self
    }

    /// Every extraction takes `delay` before it commits.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn count(&self) -> usize {
        self.extractions.lock().unwrap().len()
    }

    pub fn extracted(&self) -> Vec<ExtractedFusion> {
        self.extractions.lock().unwrap().clone()
    }

    pub fn extracted_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .extracted()
            .into_iter()
            .map(|fusion| fusion.fusion_id)
            .collect();
        ids.sort();
        ids
    }
}

impl ArchiveExtractor for RecordingExtractor {
    fn extract(
        &self,
        _fuse: &FuseConfig,
        fusion: &FusionConfig,
        archive: &FinishedArchive,
        cancellation: &Cancellation,
    ) -> anyhow::Result<()> {
        if self.failing.contains(&fusion.id) {
            anyhow::bail!("disk full");
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let mut zip = archive.open_zip()?;
        let mut contents = BTreeMap::new();
        for index in 0..zip.len() {
            let mut file = zip.by_index(index)?;
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)?;
            contents.insert(file.name().to_string(), bytes);
        }
        if !cancellation.try_commit() {
            anyhow::bail!("extraction cancelled");
        }
        self.extractions.lock().unwrap().push(ExtractedFusion {
            fusion_id: fusion.id.clone(),
            digest: archive.digest().to_string(),
            entry_names: archive.entry_names().to_vec(),
            contents,
        });
        Ok(())
    }
}

/// Collaborators plus the orchestrator wired over them.
pub struct Harness {
    pub sync: Arc<FakeSync>,
    pub store: Arc<FakeStore>,
    pub extractor: Arc<RecordingExtractor>,
    pub orchestrator: FusionOrchestrator,
}

impl Harness {
    pub fn new(
        config: FuseConfig,
        sync: FakeSync,
        store: FakeStore,
        host: FakeHost,
        extractor: RecordingExtractor,
    ) -> Self {
        let sync = Arc::new(sync);
        let store = Arc::new(store);
        let extractor = Arc::new(extractor);
        let orchestrator = FusionOrchestrator::new(FuseServices {
            config: Arc::new(config),
            sync: sync.clone(),
            store: store.clone(),
            host: Arc::new(host),
            extractor: extractor.clone(),
        });
        Self {
            sync,
            store,
            extractor,
            orchestrator,
        }
    }
}

pub fn fuse_config(fusions: Vec<FusionConfig>) -> FuseConfig {
    FuseConfig::with_fusions(fusions)
}
