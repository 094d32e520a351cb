//! Package store over a local directory tree:
//! `<root>/<packageId>/<version>/...`

use std::path::{Component, Path, PathBuf};

use anyhow::Context;

use crate::types::{Package, PackageEntry, PackageVersion};

use super::PackageStore;

#[derive(Debug, Clone)]
pub struct DirectoryPackageStore {
    root: PathBuf,
}

impl DirectoryPackageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn package_dir(&self, version: &PackageVersion) -> anyhow::Result<PathBuf> {
        let deploy_version = version
            .deploy_version()
            .ok_or_else(|| anyhow::anyhow!("Package {} has no resolved version", version))?;
        ensure_single_component(version.package_id())?;
        ensure_single_component(deploy_version)?;
        Ok(self.root.join(version.package_id()).join(deploy_version))
    }
}

impl PackageStore for DirectoryPackageStore {
    fn load_package(&self, version: &PackageVersion) -> anyhow::Result<Package> {
        let dir = self.package_dir(version)?;
        if !dir.is_dir() {
            anyhow::bail!("Package directory not found: {}", dir.display());
        }

        let mut files = Vec::new();
        collect_files(&dir, &mut files)?;

        let entries = files
            .into_iter()
            .map(|path| {
                let name = entry_name(&dir, &path)?;
                Ok(PackageEntry::from_file(name, path))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Package::new(version.clone(), entries))
    }

    fn is_deployed(&self, version: &PackageVersion) -> bool {
        self.package_dir(version)
            .map(|dir| dir.is_dir())
            .unwrap_or(false)
    }
}

fn ensure_single_component(value: &str) -> anyhow::Result<()> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => anyhow::bail!("Invalid package path segment: '{}'", value),
    }
}

/// Recursive listing sorted by file name at every level.
fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    let mut children = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("Failed to list directory: {}", dir.display()))?;
    children.sort();

    for path in children {
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

fn entry_name(root: &Path, path: &Path) -> anyhow::Result<String> {
    let relative = path
        .strip_prefix(root)
        .with_context(|| format!("File outside package directory: {}", path.display()))?;
    let parts = relative
        .components()
        .map(|component| match component {
            Component::Normal(part) => part
                .to_str()
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("Non UTF-8 file name: {}", path.display())),
            _ => Err(anyhow::anyhow!("Unexpected path component in {}", path.display())),
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed(root: &Path, files: &[&str]) {
        for file in files {
            let path = root.join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, file.as_bytes()).unwrap();
        }
    }

    #[test]
    fn deployed_means_version_directory_exists() {
        let temp = TempDir::new().unwrap();
        seed(temp.path(), &["core/2.0.0/a.dll"]);
        let store = DirectoryPackageStore::new(temp.path());

        assert!(store.is_deployed(&PackageVersion::new("core", Some("2.0.0"))));
        assert!(!store.is_deployed(&PackageVersion::new("core", Some("3.0.0"))));
        assert!(!store.is_deployed(&PackageVersion::unknown("core")));
    }

    #[test]
    fn load_lists_files_recursively_in_sorted_order() {
        let temp = TempDir::new().unwrap();
        seed(
            temp.path(),
            &["core/2.0.0/b.dll", "core/2.0.0/a.dll", "core/2.0.0/lib/c.dll"],
        );
        let store = DirectoryPackageStore::new(temp.path());

        let package = store
            .load_package(&PackageVersion::new("core", Some("2.0.0")))
            .unwrap();

        let names: Vec<&str> = package.entries.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["a.dll", "b.dll", "lib/c.dll"]);
        assert_eq!(
            package.entries[2].read_all().unwrap(),
            b"core/2.0.0/lib/c.dll"
        );
    }

    #[test]
    fn missing_version_fails_to_load() {
        let temp = TempDir::new().unwrap();
        let store = DirectoryPackageStore::new(temp.path());

        assert!(
            store
                .load_package(&PackageVersion::new("core", Some("9.9.9")))
                .is_err()
        );
    }

    #[test]
    fn traversal_in_ids_is_rejected() {
        let temp = TempDir::new().unwrap();
        let store = DirectoryPackageStore::new(temp.path().join("packages"));
        seed(temp.path(), &["secret/1/a.dll"]);

        let sneaky = PackageVersion::new("..", Some("secret"));
        assert!(store.package_dir(&sneaky).is_err());
        assert!(!store.is_deployed(&sneaky));
        assert!(
            store
                .package_dir(&PackageVersion::new("core", Some("1/../../x")))
                .is_err()
        );
    }
}
