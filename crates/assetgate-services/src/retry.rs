use std::future::Future;
use std::time::Duration;

use assetgate_storage::{StorageError, StorageResult};

/// Run an idempotent provider read, retrying transient failures with
/// exponential backoff. Session-creating calls must not go through here.
pub async fn retry_read<T, F, Fut>(
    operation: &str,
    attempts: u32,
    base_backoff: Duration,
    mut call: F,
) -> StorageResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                let backoff = base_backoff.saturating_mul(1 << (attempt - 1).min(16));
                tracing::warn!(
                    operation = %operation,
                    attempt,
                    max_attempts = attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Provider read failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetgate_core::ProviderName;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_read("head", 3, Duration::from_millis(1), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StorageError::provider_status(ProviderName::R2, 503, "SlowDown"))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_after_last_attempt() {
        let calls = AtomicU32::new(0);
        let result: StorageResult<()> = retry_read("head", 2, Duration::from_millis(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::provider_call(ProviderName::Gcs, "connection reset"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_returned_immediately() {
        let calls = AtomicU32::new(0);
        let result: StorageResult<()> = retry_read("head", 5, Duration::from_millis(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::NotFound("a.png".to_string()))
        })
        .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: StorageResult<()> = retry_read("head", 5, Duration::from_millis(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::provider_status(ProviderName::R2, 403, "AccessDenied"))
        })
        .await;
        assert!(matches!(
            result,
            Err(StorageError::ProviderCall {
                status: Some(403),
                ..
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
