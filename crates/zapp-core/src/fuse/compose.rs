//! Entry composition: host defaults first, then matching package entries,
//! deduplicated by name with the first occurrence winning.

use std::collections::HashSet;

use tracing::debug;
use wax::{CandidatePath, Glob, Pattern};

use crate::types::{Package, PackageEntry};

/// Glob deciding which package entries are pulled into a fusion.
///
/// Matched against the full archive-relative name with `/` separators, so
/// `*.dll` only selects top-level files and `**/*.dll` selects nested ones.
#[derive(Debug, Clone)]
pub struct EntryPattern {
    raw: String,
    glob: Glob<'static>,
}

impl EntryPattern {
    pub fn new(pattern: &str) -> anyhow::Result<Self> {
        let glob = Glob::new(pattern)
            .map_err(|e| anyhow::anyhow!("Invalid entry pattern '{}': {}", pattern, e))?
            .into_owned();
        Ok(Self {
            raw: pattern.to_string(),
            glob,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, name: &str) -> bool {
        let normalized = name.replace('\\', "/");
        self.glob.is_match(CandidatePath::from(normalized.as_str()))
    }
}

/// Merge default entries with the pattern-matching entries of `packages`.
///
/// Order is defaults, then each package in the given order; within a source
/// the original order is kept. A name seen before is dropped, so defaults
/// shadow packages, earlier packages shadow later ones, and among colliding
/// defaults the first one listed wins.
pub fn compose(
    default_entries: Vec<PackageEntry>,
    packages: Vec<Package>,
    pattern: &EntryPattern,
) -> Vec<PackageEntry> {
    let defaults = default_entries
        .into_iter()
        .map(|entry| (String::from("host"), entry));
    let from_packages = packages.into_iter().flat_map(move |package| {
        let source = package.version.to_string();
        package
            .entries
            .into_iter()
            .filter(move |entry| pattern.matches(entry.name()))
            .map(move |entry| (source.clone(), entry))
    });

    let mut seen = HashSet::new();
    let mut composed = Vec::new();
    for (source, entry) in defaults.chain(from_packages) {
        if seen.insert(entry.name().to_string()) {
            composed.push(entry);
        } else {
            debug!(entry = entry.name(), %source, "entry shadowed by an earlier source");
        }
    }
    composed
}
