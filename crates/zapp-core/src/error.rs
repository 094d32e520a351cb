//! Error taxonomy for fusion builds.
//!
//! "Not ready yet" outcomes (unresolved versions, packages still deploying)
//! are not errors and never appear here; they are reported through
//! [`FusionBuildResult`](crate::orchestration::FusionBuildResult).

use std::time::Duration;

use thiserror::Error;

use crate::types::PackageVersion;

pub type Result<T, E = FuseError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum FuseError {
    #[error("{0} must not be empty")]
    InvalidArgument(&'static str),

    #[error("fusion '{0}' is not configured")]
    FusionNotFound(String),

    #[error("failed to read fuse configuration")]
    Config(#[source] anyhow::Error),

    #[error("sync source failed for package '{package_id}'")]
    Sync {
        package_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to load package {version}")]
    PackageLoad {
        version: PackageVersion,
        #[source]
        source: anyhow::Error,
    },

    #[error("filter '{filter}' rejected entry '{entry}'")]
    Filter {
        filter: String,
        entry: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to build archive for fusion '{fusion_id}'")]
    ArchiveBuild {
        fusion_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to extract fusion '{fusion_id}'")]
    Extraction {
        fusion_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{operation} timed out after {}s", limit.as_secs_f64())]
    Timeout { operation: String, limit: Duration },

    #[error("worker for {operation} did not complete: {message}")]
    Task { operation: String, message: String },
}

/// How an administrative surface should report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The caller supplied a missing or empty identifier.
    BadRequest,
    /// The requested fusion has no configuration.
    NotFound,
    /// Loading, building or extracting failed on our side.
    ServerError,
}

impl FuseError {
    pub fn class(&self) -> FailureClass {
        match self {
            FuseError::InvalidArgument(_) => FailureClass::BadRequest,
            FuseError::FusionNotFound(_) => FailureClass::NotFound,
            FuseError::Config(_)
            | FuseError::Sync { .. }
            | FuseError::PackageLoad { .. }
            | FuseError::Filter { .. }
            | FuseError::ArchiveBuild { .. }
            | FuseError::Extraction { .. }
            | FuseError::Timeout { .. }
            | FuseError::Task { .. } => FailureClass::ServerError,
        }
    }
}

/// Reject empty identifiers before any I/O happens.
pub(crate) fn require_id<'a>(value: &'a str, what: &'static str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FuseError::InvalidArgument(what));
    }
    Ok(trimmed)
}
