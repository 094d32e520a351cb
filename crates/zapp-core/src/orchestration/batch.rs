//! Batch extraction across several fusions.
//!
//! A failing fusion never aborts its siblings: its error is recorded in the
//! report and counts as `false` in the aggregate.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::BatchPolicy;
use crate::error::FuseError;
use crate::types::fold_id;

use super::{FusionBuildResult, FusionOrchestrator};

#[derive(Debug)]
pub struct BatchOutcome {
    pub fusion_id: String,
    pub result: Result<FusionBuildResult, FuseError>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(&self.result, Ok(result) if result.is_success())
    }
}

/// Per-fusion results, in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<BatchOutcome>,
    /// Ids never attempted because an earlier fusion stopped the batch.
    pub skipped: Vec<String>,
}

impl BatchReport {
    /// True when every id was attempted and extracted. An empty batch succeeds.
    pub fn all_succeeded(&self) -> bool {
        self.skipped.is_empty() && self.outcomes.iter().all(BatchOutcome::succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.succeeded())
    }
}

impl FusionOrchestrator {
    /// Logical AND of [`extract_fusion`](Self::extract_fusion) over `fusion_ids`.
    pub async fn extract_batch<I, S>(&self, fusion_ids: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extract_batch_report(fusion_ids).await.all_succeeded()
    }

    pub async fn extract_batch_report<I, S>(&self, fusion_ids: I) -> BatchReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids = dedupe(fusion_ids);
        if ids.is_empty() {
            return BatchReport::default();
        }

        let report = match self.batch.policy {
            BatchPolicy::AttemptAll => self.attempt_all(ids).await,
            BatchPolicy::StopAtFirstFailure => self.stop_at_first_failure(ids).await,
        };

        info!(
            attempted = report.outcomes.len(),
            failed = report.failures().count(),
            skipped = report.skipped.len(),
            "fusion batch finished"
        );
        report
    }

    async fn attempt_all(&self, ids: Vec<String>) -> BatchReport {
        let semaphore = Arc::new(Semaphore::new(self.batch.max_parallel.max(1)));
        let mut join_set = JoinSet::new();

        for (index, fusion_id) in ids.iter().enumerate() {
            let orchestrator = self.clone();
            let fusion_id = fusion_id.clone();
            let semaphore = semaphore.clone();

            join_set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => orchestrator.build_fusion(&fusion_id).await,
                    Err(closed) => Err(FuseError::Task {
                        operation: format!("batch build of fusion '{}'", fusion_id),
                        message: closed.to_string(),
                    }),
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<Result<FusionBuildResult, FuseError>>> =
            ids.iter().map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(join) => error!(error = %join, "fusion batch worker did not complete"),
            }
        }

        let outcomes = ids
            .into_iter()
            .zip(slots)
            .map(|(fusion_id, slot)| {
                let result = slot.unwrap_or_else(|| {
                    Err(FuseError::Task {
                        operation: format!("batch build of fusion '{}'", fusion_id),
                        message: "worker panicked".to_string(),
                    })
                });
                log_failure(&fusion_id, &result);
                BatchOutcome { fusion_id, result }
            })
            .collect();

        BatchReport {
            outcomes,
            skipped: Vec::new(),
        }
    }

    async fn stop_at_first_failure(&self, ids: Vec<String>) -> BatchReport {
        let mut report = BatchReport::default();
        let mut remaining = ids.into_iter();

        for fusion_id in remaining.by_ref() {
            let result = self.build_fusion(&fusion_id).await;
            log_failure(&fusion_id, &result);
            let outcome = BatchOutcome { fusion_id, result };
            let stop = !outcome.succeeded();
            report.outcomes.push(outcome);
            if stop {
                break;
            }
        }

        report.skipped = remaining.collect();
        report
    }
}

fn log_failure(fusion_id: &str, result: &Result<FusionBuildResult, FuseError>) {
    if let Err(err) = result {
        error!(fusion_id, error = ?err, "fusion build failed");
    }
}

/// Trimmed ids with case-insensitive duplicates removed; the
/// first spelling wins.
fn dedupe<I, S>(fusion_ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    fusion_ids
        .into_iter()
        .map(|id| id.as_ref().trim().to_string())
        .filter(|id| seen.insert(fold_id(id)))
        .collect()
}
