//! Write retry with exponential backoff
//!
//! SQLite serializes writers; under concurrent committee cycles a write
//! can transiently fail with "database is locked". Lock errors are
//! retried with exponential backoff up to a total time budget; any other
//! error fails immediately.

use std::time::{Duration, Instant};

use crate::error::{Result, SyncError};

/// Retry a store write until it succeeds or `max_wait_ms` elapses.
///
/// Backoff starts at 10ms and doubles up to 1s per attempt.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Store write succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                let is_lock_error = match &err {
                    SyncError::Database(db_err) => {
                        db_err.to_string().contains("database is locked")
                    }
                    _ => false,
                };

                if !is_lock_error {
                    return Err(err);
                }

                let elapsed = start_time.elapsed();
                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        max_wait_ms,
                        "Store write failed: retry budget exhausted"
                    );
                    return Err(SyncError::StoreWrite(format!(
                        "{}: database locked after {} attempts ({} ms elapsed, max {} ms)",
                        operation_name,
                        attempt,
                        elapsed.as_millis(),
                        max_wait_ms
                    )));
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    "Database locked, retrying after backoff"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(1000);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn succeeds_first_attempt() {
        let result = retry_on_lock("test_op", 5000, || async { Ok::<i32, SyncError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn non_lock_error_fails_immediately() {
        let mut attempts = 0;
        let result = retry_on_lock("test_op", 5000, || {
            attempts += 1;
            async move { Err::<i32, SyncError>(SyncError::Internal("boom".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn lock_error_exhausts_budget_as_store_write_failure() {
        let result = retry_on_lock("test_op", 30, || async {
            Err::<i32, SyncError>(SyncError::Database(sqlx::Error::Protocol(
                "database is locked".into(),
            )))
        })
        .await;

        match result {
            Err(SyncError::StoreWrite(msg)) => assert!(msg.contains("test_op")),
            other => panic!("expected StoreWrite, got {:?}", other.err()),
        }
    }
}
