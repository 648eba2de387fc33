//! Rate limiting: in-process token buckets keyed by client IP, or by the
//! authenticated subject when a valid token is presented.
//!
//! Three tiers beyond the general one: analytics, admin (per subject), and
//! upload. Bucket capacity equals the per-minute limit; authenticated
//! subjects get the configured burst on top. State is process-local; a
//! multi-process deployment has per-process budgets.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use opine_core::config::RateLimitTiers;
use opine_error::OpineError;
use parking_lot::Mutex;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// Rate-limit tier of a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Everything without a more specific tier.
    General,
    /// Analytics rollups.
    Analytics,
    /// Admin surface.
    Admin,
    /// Upload endpoints.
    Upload,
}

impl Tier {
    /// Classify a request path.
    #[must_use]
    pub fn for_path(path: &str) -> Self {
        if path.starts_with("/ingest/upload") {
            Self::Upload
        } else if path.starts_with("/admin") {
            Self::Admin
        } else if path.starts_with("/analytics") || path.starts_with("/api/export") {
            Self::Analytics
        } else {
            Self::General
        }
    }
}

/// Token bucket with steady refill.
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec,
            last_refill: Instant::now(),
        }
    }

    fn try_consume(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn remaining(&self) -> u64 {
        self.tokens.max(0.0) as u64
    }

    /// Seconds until at least one token is available.
    fn retry_after_secs(&self) -> u64 {
        if self.tokens >= 1.0 {
            0
        } else {
            ((1.0 - self.tokens) / self.refill_per_sec).ceil() as u64
        }
    }
}

/// The decision attached to a checked request.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Per-minute limit of the tier.
    pub limit: u32,
    /// Whole tokens left after this request.
    pub remaining: u64,
    /// Seconds until a token is available again.
    pub reset_secs: u64,
}

/// Process-local limiter over all tiers.
pub struct RateLimiter {
    tiers: RateLimitTiers,
    buckets: Mutex<HashMap<(Tier, String), TokenBucket>>,
}

impl RateLimiter {
    /// Create the limiter from configured tiers.
    #[must_use]
    pub fn new(tiers: RateLimitTiers) -> Self {
        Self {
            tiers,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn limit_for(&self, tier: Tier) -> u32 {
        match tier {
            Tier::General => self.tiers.general_per_min,
            Tier::Analytics => self.tiers.analytics_per_min,
            Tier::Admin => self.tiers.admin_per_min,
            Tier::Upload => self.tiers.upload_per_min,
        }
    }

    /// Check one request against its tier bucket.
    ///
    /// `per_subject` buckets (authenticated callers) get the configured
    /// burst on top of the steady limit.
    pub fn check(&self, tier: Tier, key: &str, per_subject: bool) -> RateLimitDecision {
        let limit = self.limit_for(tier);
        let capacity = if per_subject {
            f64::from(limit) + f64::from(self.tiers.burst)
        } else {
            f64::from(limit)
        };
        let refill = f64::from(limit) / 60.0;

        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry((tier, key.to_string()))
            .or_insert_with(|| TokenBucket::new(capacity, refill));
        let allowed = bucket.try_consume();

        RateLimitDecision {
            allowed,
            limit,
            remaining: bucket.remaining(),
            reset_secs: bucket.retry_after_secs(),
        }
    }

    /// Drop buckets that refilled completely (periodic housekeeping).
    pub fn sweep(&self) {
        let mut buckets = self.buckets.lock();
        buckets.retain(|_, bucket| {
            let idle = bucket.last_refill.elapsed().as_secs_f64();
            bucket.tokens + idle * bucket.refill_per_sec < bucket.capacity
        });
    }
}

/// Rate limiting middleware.
///
/// Applies `X-RateLimit-*` headers on every response and answers 429 with
/// `Retry-After` when the tier bucket is empty.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let tier = Tier::for_path(request.uri().path());

    // Keyed by the authenticated subject when a valid token is presented,
    // by client IP otherwise.
    let subject = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .and_then(|token| state.tokens.verify(token).ok())
        .map(|claims| claims.sub);
    let per_subject = subject.is_some();
    let key = subject.unwrap_or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string())
    });

    let decision = state.limiter.check(tier, &key, per_subject);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        warn!(key = %key, ?tier, "rate limit exceeded");
        ApiError(OpineError::RateLimited {
            retry_after_secs: decision.reset_secs.max(1),
        })
        .into_response()
    };

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("X-RateLimit-Limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.reset_secs.to_string()) {
        headers.insert("X-RateLimit-Reset", value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiers() -> RateLimitTiers {
        RateLimitTiers::default()
    }

    #[test]
    fn test_tier_classification() {
        assert_eq!(Tier::for_path("/health"), Tier::General);
        assert_eq!(Tier::for_path("/analytics/summary"), Tier::Analytics);
        assert_eq!(Tier::for_path("/api/export/export.csv"), Tier::Analytics);
        assert_eq!(Tier::for_path("/admin/relabel-topic"), Tier::Admin);
        assert_eq!(Tier::for_path("/ingest/upload/csv"), Tier::Upload);
        assert_eq!(Tier::for_path("/ingest/feedback"), Tier::General);
    }

    #[test]
    fn test_sixty_first_request_is_denied() {
        let limiter = RateLimiter::new(tiers());
        for i in 0..60 {
            let decision = limiter.check(Tier::General, "10.0.0.1", false);
            assert!(decision.allowed, "request {i} should pass");
        }
        let decision = limiter.check(Tier::General, "10.0.0.1", false);
        assert!(!decision.allowed);
        assert!(decision.reset_secs >= 1);
    }

    #[test]
    fn test_keys_are_isolated() {
        let limiter = RateLimiter::new(tiers());
        for _ in 0..60 {
            assert!(limiter.check(Tier::General, "10.0.0.1", false).allowed);
        }
        assert!(!limiter.check(Tier::General, "10.0.0.1", false).allowed);
        assert!(limiter.check(Tier::General, "10.0.0.2", false).allowed);
    }

    #[test]
    fn test_tiers_are_isolated() {
        let limiter = RateLimiter::new(tiers());
        for _ in 0..30 {
            assert!(limiter.check(Tier::Analytics, "10.0.0.1", false).allowed);
        }
        assert!(!limiter.check(Tier::Analytics, "10.0.0.1", false).allowed);
        // The same IP still has a general budget.
        assert!(limiter.check(Tier::General, "10.0.0.1", false).allowed);
    }

    #[test]
    fn test_subject_gets_burst_headroom() {
        let limiter = RateLimiter::new(tiers());
        // Admin tier: 10/min plus burst 10 for authenticated subjects.
        for i in 0..20 {
            let decision = limiter.check(Tier::Admin, "admin", true);
            assert!(decision.allowed, "request {i} should pass");
        }
        assert!(!limiter.check(Tier::Admin, "admin", true).allowed);
    }

    #[test]
    fn test_remaining_decreases() {
        let limiter = RateLimiter::new(tiers());
        let first = limiter.check(Tier::Upload, "10.0.0.9", false);
        let second = limiter.check(Tier::Upload, "10.0.0.9", false);
        assert!(first.remaining > second.remaining);
        assert_eq!(first.limit, 5);
    }

    #[test]
    fn test_sweep_drops_full_buckets() {
        let limiter = RateLimiter::new(tiers());
        let _ = limiter.check(Tier::General, "10.0.0.1", false);
        // One token consumed: the bucket survives an immediate sweep only
        // if it has not refilled yet; either way sweep must not panic.
        limiter.sweep();
    }
}
