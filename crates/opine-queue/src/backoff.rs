//! Backoff calculation for job retries.

use std::time::Duration;

use rand::Rng;

/// Initial retry delay in milliseconds.
const INITIAL_DELAY_MS: u64 = 1_000;

/// Maximum retry delay (one visibility timeout).
const MAX_DELAY_MS: u64 = 120_000;

/// Calculate exponential backoff: `initial * 2^(attempt-1)`, capped.
///
/// With the defaults:
/// - Attempt 1: 1s
/// - Attempt 2: 2s
/// - Attempt 3: 4s
/// - Attempt 4: 8s
/// - Attempt 5: 16s
#[must_use]
pub fn retry_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(63);
    let delay_ms = INITIAL_DELAY_MS.saturating_mul(2_u64.saturating_pow(exponent));
    Duration::from_millis(delay_ms.min(MAX_DELAY_MS))
}

/// Apply ±`fraction` multiplicative jitter to a delay.
///
/// Jitter spreads simultaneous retries so a recovering backend is not hit
/// by a synchronised herd.
#[must_use]
pub fn with_jitter(delay: Duration, fraction: f64) -> Duration {
    let base = delay.as_secs_f64();
    let spread = base * fraction;
    let jittered = rand::thread_rng().gen_range((base - spread)..=(base + spread));
    Duration::from_secs_f64(jittered.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_doubles() {
        assert_eq!(retry_delay(1), Duration::from_millis(1_000));
        assert_eq!(retry_delay(2), Duration::from_millis(2_000));
        assert_eq!(retry_delay(3), Duration::from_millis(4_000));
        assert_eq!(retry_delay(5), Duration::from_millis(16_000));
    }

    #[test]
    fn test_retry_delay_caps() {
        assert_eq!(retry_delay(20), Duration::from_millis(MAX_DELAY_MS));
        assert_eq!(retry_delay(100), Duration::from_millis(MAX_DELAY_MS));
    }

    #[test]
    fn test_jitter_bounds() {
        let base = Duration::from_millis(1_000);
        for _ in 0..100 {
            let jittered = with_jitter(base, 0.2);
            assert!(jittered >= Duration::from_millis(800));
            assert!(jittered <= Duration::from_millis(1_200));
        }
    }
}
