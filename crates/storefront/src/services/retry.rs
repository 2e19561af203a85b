//! Bounded retry for best-effort remote writes.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::warn;

use crate::db::RepositoryError;

/// Attempts per mirrored write.
pub const MAX_ATTEMPTS: u32 = 3;

/// Delay before the second attempt; doubles after each failure.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(50);

fn backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(INITIAL_BACKOFF)
        .with_max_times(MAX_ATTEMPTS as usize - 1)
}

/// Run `op` up to [`MAX_ATTEMPTS`] times with exponential backoff.
///
/// # Errors
///
/// Returns the final `RepositoryError` after exhausting the attempts.
pub async fn with_retry<F, Fut, T>(what: &str, op: F) -> Result<T, RepositoryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RepositoryError>>,
{
    op.retry(backoff())
        .notify(|e: &RepositoryError, delay: Duration| {
            warn!(what, error = %e, delay_ms = delay.as_millis(), "Remote write failed, retrying");
        })
        .await
}
