//! Package loading and the deployability gate.

pub mod directory;
pub mod loader;

pub use directory::DirectoryPackageStore;
pub use loader::{PackageLoader, PackageStore, Readiness};
