//! Fold retry logic
//!
//! Retries an operation with exponential backoff while it fails with a
//! transient error (`Error::is_retryable`). Validation and internal errors
//! are returned immediately.

use riverstat_common::Result;
use std::time::{Duration, Instant};

const MAX_BACKOFF: Duration = Duration::from_millis(1000);

/// Run `operation` up to `max_attempts` times.
///
/// **Backoff Strategy:**
/// - Initial delay: `initial_backoff`
/// - Max delay: 1000ms
/// - Multiplier: 2.0
///
/// Each attempt must be a complete read-modify-write so that a retry never
/// applies the event twice.
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    max_attempts: u32,
    initial_backoff: Duration,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    let mut backoff = initial_backoff.min(MAX_BACKOFF);

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(operation = operation_name, attempt, "Retrying fold");
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Fold succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                if attempt >= max_attempts {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        error = %err,
                        "Fold failed: retries exhausted"
                    );
                    return Err(err);
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Transient fold failure, will retry after backoff"
                );

                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}
