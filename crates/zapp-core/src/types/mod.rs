//! Shared value types flowing through a fusion build.

use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// The version of one package that should currently run.
///
/// An empty or absent `deploy_version` means the sync source does not know
/// the version yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageVersion {
    package_id: String,
    deploy_version: Option<String>,
}

impl PackageVersion {
    pub fn new(package_id: impl Into<String>, deploy_version: Option<impl Into<String>>) -> Self {
        let deploy_version = deploy_version
            .map(Into::into)
            .filter(|version: &String| !version.trim().is_empty());
        Self {
            package_id: package_id.into(),
            deploy_version,
        }
    }

    pub fn unknown(package_id: impl Into<String>) -> Self {
        Self::new(package_id, None::<String>)
    }

    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    pub fn deploy_version(&self) -> Option<&str> {
        self.deploy_version.as_deref()
    }

    pub fn is_unknown(&self) -> bool {
        self.deploy_version.is_none()
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.deploy_version {
            Some(version) => write!(f, "{}@{}", self.package_id, version),
            None => write!(f, "{}@unknown", self.package_id),
        }
    }
}

/// Where an entry's bytes come from. File-backed content is only read when
/// the entry is written into an archive.
#[derive(Debug, Clone)]
pub enum EntryContent {
    Bytes(Arc<[u8]>),
    File(PathBuf),
}

/// A named payload bound for a fusion archive.
///
/// The name is the archive-relative path and the deduplication key; it is
/// fixed at construction. Filters may only swap the content.
#[derive(Debug, Clone)]
pub struct PackageEntry {
    name: String,
    content: EntryContent,
}

impl PackageEntry {
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: EntryContent::Bytes(Arc::from(bytes.into())),
        }
    }

    pub fn from_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            content: EntryContent::File(path.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &EntryContent {
        &self.content
    }

    /// Path on disk for file-backed entries.
    pub fn source_path(&self) -> Option<&Path> {
        match &self.content {
            EntryContent::File(path) => Some(path),
            EntryContent::Bytes(_) => None,
        }
    }

    pub fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        match &self.content {
            EntryContent::Bytes(bytes) => Ok(Box::new(io::Cursor::new(&bytes[..]))),
            EntryContent::File(path) => Ok(Box::new(std::fs::File::open(path)?)),
        }
    }

    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        match &self.content {
            EntryContent::Bytes(bytes) => Ok(bytes.to_vec()),
            EntryContent::File(path) => std::fs::read(path),
        }
    }

    pub fn replace_content(&mut self, bytes: impl Into<Vec<u8>>) {
        self.content = EntryContent::Bytes(Arc::from(bytes.into()));
    }
}

/// A loaded package: its resolved version and file entries in store order.
#[derive(Debug, Clone)]
pub struct Package {
    pub version: PackageVersion,
    pub entries: Vec<PackageEntry>,
}

impl Package {
    pub fn new(version: PackageVersion, entries: Vec<PackageEntry>) -> Self {
        Self { version, entries }
    }
}

/// Fusion and package ids compare case-insensitively under full Unicode
/// lowercasing. Two ids are the same iff their folds are equal.
pub fn fold_id(id: &str) -> String {
    id.to_lowercase()
}

pub fn same_id(a: &str, b: &str) -> bool {
    a == b || fold_id(a) == fold_id(b)
}
