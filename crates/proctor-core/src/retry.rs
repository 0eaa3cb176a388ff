//! Exponential backoff for relay attempts.
//!
//! Only transport failures (timeouts, connection failures) are retried.
//! Backend status errors and unparseable bodies are returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::relay::RelayError;

/// Delay before the first retry; doubles each attempt (200ms, 400ms, 800ms, ...).
pub(crate) const BASE_DELAY_MS: u64 = 200;

/// Upper bound on a single backoff sleep.
const MAX_DELAY_MS: u64 = 5_000;

/// Run `f` once, then up to `retries` more times while it fails transiently.
pub(crate) async fn retry_transient<F, Fut, T>(retries: u32, f: F) -> Result<T, RelayError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, RelayError>>,
{
    for attempt in 0..retries {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                let delay = backoff(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries = retries,
                    error = %err,
                    "relay attempt failed, retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
    f().await
}

fn backoff(attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    Duration::from_millis(BASE_DELAY_MS.saturating_mul(factor).min(MAX_DELAY_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff(0), Duration::from_millis(200));
        assert_eq!(backoff(1), Duration::from_millis(400));
        assert_eq!(backoff(2), Duration::from_millis(800));
        assert_eq!(backoff(40), Duration::from_millis(MAX_DELAY_MS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_exhaust_all_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry_transient(3, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(RelayError::ConnectionFailed)
        })
        .await;

        assert_eq!(result.unwrap_err(), RelayError::ConnectionFailed);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry_transient(3, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(RelayError::BackendError(502))
        })
        .await;

        assert_eq!(result.unwrap_err(), RelayError::BackendError(502));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_transient(2, move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RelayError::Timeout)
            } else {
                Ok("ok")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_retries_is_single_attempt() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let _: Result<(), _> = retry_transient(0, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(RelayError::Timeout)
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
