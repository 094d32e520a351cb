//! Version resolution against a sync source.

pub mod resolver;
pub mod sync_file;

pub use resolver::{SyncSource, VersionResolver};
pub use sync_file::VersionFileSync;
