//! Retry loop shared by the fetcher and the stage runner.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use super::config::RetryConfig;

/// The last error once retrying stopped.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub error: E,
    pub attempts: u32,
}

/// Runs `operation` until it succeeds, fails with an error `is_retryable`
/// rejects, or `max_attempts` is reached.
///
/// `operation` receives the 1-based attempt number. `on_retry` is called
/// before each backoff sleep with the failed attempt number and the delay.
/// Returns the value together with the number of attempts it took.
pub async fn retry_with_backoff<T, E, F, Fut, C, L>(
    policy: &RetryConfig,
    mut operation: F,
    mut is_retryable: C,
    mut on_retry: L,
) -> Result<(T, u32), Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: FnMut(&E) -> bool,
    L: FnMut(u32, Duration, &E),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(error) => {
                if attempt >= max_attempts || !is_retryable(&error) {
                    return Err(Exhausted {
                        error,
                        attempts: attempt,
                    });
                }
                let delay = policy.delay_for(attempt);
                on_retry(attempt, delay, &error);
                if !delay.is_zero() {
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let mut retries = Vec::new();

        let result = retry_with_backoff(
            &RetryConfig::immediate(3),
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err("flaky")
                    } else {
                        Ok(attempt)
                    }
                }
            },
            |_| true,
            |attempt, _, _| retries.push(attempt),
        )
        .await
        .unwrap();

        assert_eq!(result, (3, 3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_stops_at_max_attempts() {
        let err = retry_with_backoff(
            &RetryConfig::immediate(3),
            |_| async { Err::<(), _>("down") },
            |_| true,
            |_, _, _| {},
        )
        .await
        .unwrap_err();

        assert_eq!(err.attempts, 3);
        assert_eq!(err.error, "down");
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = retry_with_backoff(
            &RetryConfig::immediate(5),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("bad request") }
            },
            |_| false,
            |_, _, _| {},
        )
        .await
        .unwrap_err();

        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backoff_sleeps_between_attempts() {
        let policy = RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 10,
            max_delay_ms: 1_000,
            backoff_multiplier: 2.0,
        };
        let mut delays = Vec::new();
        let start = std::time::Instant::now();

        let _ = retry_with_backoff(
            &policy,
            |_| async { Err::<(), _>("down") },
            |_| true,
            |_, delay, _| delays.push(delay),
        )
        .await;

        assert_eq!(
            delays,
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
