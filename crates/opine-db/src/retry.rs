//! Retry policy for transient database failures.
//!
//! Up to three attempts with exponential backoff (50ms base, doubling,
//! ±20% jitter). Only errors classified retryable by the taxonomy are
//! retried; constraint violations and logical errors surface immediately.

use std::future::Future;
use std::time::Duration;

use opine_error::Result;
use rand::Rng;
use tracing::warn;

/// Maximum attempts per operation.
const MAX_ATTEMPTS: u32 = 3;

/// Base delay before the first retry.
const BASE_DELAY_MS: u64 = 50;

/// Jitter fraction applied to each delay.
const JITTER_FRACTION: f64 = 0.2;

/// Run `f`, retrying transient failures.
///
/// `f` is invoked fresh on each attempt so it re-acquires its connection.
///
/// # Errors
///
/// Returns the last error once attempts are exhausted, or immediately for
/// non-retryable errors.
pub async fn with_retry<T, F, Fut>(operation: &str, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                let delay = backoff_delay(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient database error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
            Err(e) => return Err(e),
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let base_ms = BASE_DELAY_MS.saturating_mul(2_u64.saturating_pow(exponent)) as f64;
    let spread = base_ms * JITTER_FRACTION;
    let jittered = rand::thread_rng().gen_range((base_ms - spread)..=(base_ms + spread));
    Duration::from_millis(jittered.max(1.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opine_error::OpineError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_success_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, OpineError>(42)
        })
        .await
        .expect("result");
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(OpineError::ConnectionPool {
                    message: "pool timed out".to_string(),
                })
            } else {
                Ok(7)
            }
        })
        .await
        .expect("result");
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry("test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(OpineError::ConnectionPool {
                message: "still down".to_string(),
            })
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_logical_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry("test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(OpineError::validation("bad input"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_grows() {
        // Jitter is ±20%, so compare against the loose bounds.
        let first = backoff_delay(1).as_millis();
        let second = backoff_delay(2).as_millis();
        let third = backoff_delay(3).as_millis();
        assert!((40..=60).contains(&first));
        assert!((80..=120).contains(&second));
        assert!((160..=240).contains(&third));
    }
}
