//! Deadlined execution of blocking collaborator calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use crate::error::FuseError;

const RUNNING: u8 = 0;
const COMMITTED: u8 = 1;
const CANCELLED: u8 = 2;

/// Shared between a deadlined caller and its worker.
///
/// The worker must win [`Cancellation::try_commit`] before it makes any
/// effect visible. Once the caller has reported a timeout the commit is
/// refused, and once the worker has committed the caller waits for it
/// instead of reporting a timeout.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    state: Arc<AtomicU8>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    /// Claim the right to publish the work's result.
    pub fn try_commit(&self) -> bool {
        match self
            .state
            .compare_exchange(RUNNING, COMMITTED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(state) => state == COMMITTED,
        }
    }

    /// False if the worker already committed.
    pub(crate) fn cancel(&self) -> bool {
        match self
            .state
            .compare_exchange(RUNNING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(state) => state == CANCELLED,
        }
    }
}

/// Run `work` on the blocking pool and give up after `limit`.
///
/// The worker runs inside the caller's span. On timeout the worker thread is
/// left to finish on its own; its result is discarded. Only use this for work
/// without side effects.
pub(crate) async fn run_blocking<T, F>(
    operation: String,
    limit: Duration,
    work: F,
) -> Result<T, FuseError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, FuseError> + Send + 'static,
{
    let span = tracing::Span::current();
    let task = tokio::task::spawn_blocking(move || span.in_scope(work));
    match tokio::time::timeout(limit, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(FuseError::Task {
            operation,
            message: join.to_string(),
        }),
        Err(_) => Err(FuseError::Timeout { operation, limit }),
    }
}

/// Like [`run_blocking`], for work that publishes an effect.
///
/// The worker receives a [`Cancellation`]. A timeout is only reported if the
/// worker has not committed yet; a worker that committed in time is awaited
/// to completion.
pub(crate) async fn run_cancellable<T, F>(
    operation: String,
    limit: Duration,
    work: F,
) -> Result<T, FuseError>
where
    T: Send + 'static,
    F: FnOnce(&Cancellation) -> Result<T, FuseError> + Send + 'static,
{
    let cancellation = Cancellation::new();
    let worker = cancellation.clone();
    let span = tracing::Span::current();
    let mut task = tokio::task::spawn_blocking(move || span.in_scope(|| work(&worker)));

    let joined = match tokio::time::timeout(limit, &mut task).await {
        Ok(joined) => joined,
        Err(_) if cancellation.cancel() => {
            return Err(FuseError::Timeout { operation, limit });
        }
        Err(_) => task.await,
    };

    joined.unwrap_or_else(|join| {
        Err(FuseError::Task {
            operation,
            message: join.to_string(),
        })
    })
}
