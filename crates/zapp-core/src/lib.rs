//! Zapp Core Library
//!
//! The fusion build pipeline of the zapp deployment agent: resolves the
//! versions a fusion should run, gates on local deployment, composes and
//! decorates package entries into a single archive, and extracts it.

pub(crate) mod blocking;
pub mod config;
pub mod deploy;
pub mod error;
pub mod fuse;
pub mod host;
pub mod orchestration;
pub mod package;
pub mod types;
pub mod version;

pub use error::{FailureClass, FuseError, Result};

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{
        BatchConfig, BatchPolicy, ConfigSource, ConfigStore, FuseConfig, FusionConfig,
        PathResolver, TimeoutConfig, ZappConfig,
    };

    // Pipeline
    pub use crate::fuse::{
        DenyListFilter, EntryFilter, EntryPattern, FilterPipeline, FinishedArchive,
        PlaceholderFilter,
    };

    // Collaborators
    pub use crate::deploy::{ArchiveExtractor, Cancellation, DirectoryExtractor};
    pub use crate::host::{DirectoryHost, HostRuntime};
    pub use crate::package::{DirectoryPackageStore, PackageStore};
    pub use crate::version::{SyncSource, VersionFileSync};

    // Orchestration
    pub use crate::orchestration::{
        BatchReport, FuseServices, FusionBuildResult, FusionOrchestrator,
    };

    // Errors and values
    pub use crate::error::{FailureClass, FuseError};
    pub use crate::types::{Package, PackageEntry, PackageVersion};
}
