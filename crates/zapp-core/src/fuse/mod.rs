//! The fusion build pipeline: composition, decoration and archiving.

pub mod builder;
pub mod compose;
pub mod filter;

pub use builder::{ArchiveWriter, FinishedArchive, FusionBuilder};
pub use compose::{EntryPattern, compose};
pub use filter::{DenyListFilter, EntryFilter, FilterPipeline, PlaceholderFilter};
