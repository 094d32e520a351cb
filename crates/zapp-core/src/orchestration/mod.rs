//! Public coordination of fusion builds.

mod batch;
mod service;

pub use batch::{BatchOutcome, BatchReport};
pub use service::{BuildStage, FuseServices, FusionBuildResult, FusionOrchestrator};
