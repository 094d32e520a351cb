//! Placeholder resolution for configured directory patterns.

use std::path::{Component, Path, PathBuf};

use super::FuseConfig;

pub const ZAPP_DIR_PLACEHOLDER: &str = "{zappDir}";
pub const FUSION_ID_PLACEHOLDER: &str = "{fusionId}";

/// Turns `{zappDir}`/`{fusionId}` patterns into concrete paths.
#[derive(Debug, Clone)]
pub struct PathResolver {
    zapp_dir: PathBuf,
}

impl PathResolver {
    pub fn new(zapp_dir: impl Into<PathBuf>) -> Self {
        Self {
            zapp_dir: zapp_dir.into(),
        }
    }

    pub fn zapp_dir(&self) -> &Path {
        &self.zapp_dir
    }

    pub fn resolve(&self, pattern: &str) -> PathBuf {
        let zapp_dir = self.zapp_dir.to_string_lossy();
        PathBuf::from(pattern.replace(ZAPP_DIR_PLACEHOLDER, &zapp_dir))
    }

    pub fn root_directory(&self, fuse: &FuseConfig) -> PathBuf {
        self.resolve(&fuse.root_directory)
    }

    pub fn fusion_directory(&self, fuse: &FuseConfig, fusion_id: &str) -> PathBuf {
        self.resolve(&fuse.fusion_directory.replace(FUSION_ID_PLACEHOLDER, fusion_id))
    }
}

/// True if `id` names exactly one directory below its parent once substituted
/// into a path pattern.
pub fn is_path_segment(id: &str) -> bool {
    if id.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
