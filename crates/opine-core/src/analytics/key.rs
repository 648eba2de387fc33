//! Cache key derivation and TTL policy for analytics responses.
//!
//! Keys are structured as `analytics:<endpoint>:<stable-param-hash>` so that
//! admin mutations can invalidate everything under the `analytics:` prefix
//! in one pass.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use super::params::DateRange;

/// Prefix shared by every analytics cache entry.
pub const ANALYTICS_KEY_PREFIX: &str = "analytics:";

/// Default TTL for rollups over a window that includes today.
const TTL_DEFAULT_SECS: u64 = 300;

/// Short TTL for the recency-sensitive summaries.
const TTL_RECENT_SECS: u64 = 60;

/// Long TTL for fully-historical rollups.
const TTL_HISTORICAL_SECS: u64 = 900;

/// Rollup endpoint tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Sentiment counts per period.
    SentimentTrends,
    /// Total volume per period.
    VolumeTrends,
    /// Per-day rollup from the materialised view.
    DailyAggregates,
    /// Per-customer statistics.
    Customers,
    /// Per-source statistics.
    Sources,
    /// Toxicity threshold counts.
    Toxicity,
    /// Compact summary.
    Summary,
    /// Topic rollup with deltas.
    Topics,
    /// Example feedback lookup.
    Examples,
    /// Dashboard composite.
    DashboardSummary,
    /// Cached QA query suggestions.
    Suggestions,
}

impl Endpoint {
    /// Tag used inside cache keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SentimentTrends => "sentiment-trends",
            Self::VolumeTrends => "volume-trends",
            Self::DailyAggregates => "daily-aggregates",
            Self::Customers => "customers",
            Self::Sources => "sources",
            Self::Toxicity => "toxicity",
            Self::Summary => "summary",
            Self::Topics => "topics",
            Self::Examples => "examples",
            Self::DashboardSummary => "dashboard-summary",
            Self::Suggestions => "suggestions",
        }
    }

    /// Whether this endpoint serves a recency-sensitive summary.
    const fn is_recent_summary(self) -> bool {
        matches!(self, Self::Summary | Self::DashboardSummary)
    }
}

/// Derive the cache key for an endpoint and canonical parameter string.
#[must_use]
pub fn cache_key(endpoint: Endpoint, canonical_params: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_params.as_bytes());
    let digest = hasher.finalize();

    use std::fmt::Write as _;
    let mut key = String::with_capacity(ANALYTICS_KEY_PREFIX.len() + 24 + 64);
    key.push_str(ANALYTICS_KEY_PREFIX);
    key.push_str(endpoint.as_str());
    key.push(':');
    for b in digest {
        let _ = write!(key, "{b:02x}");
    }
    key
}

/// TTL for an endpoint given its resolved window.
///
/// Recency-sensitive summaries refresh fast; fully-historical windows are
/// effectively immutable and cache long.
#[must_use]
pub fn ttl_secs(endpoint: Endpoint, range: Option<DateRange>, today: NaiveDate) -> u64 {
    if endpoint.is_recent_summary() {
        return TTL_RECENT_SECS;
    }
    match range {
        Some(r) if r.is_fully_past(today) => TTL_HISTORICAL_SECS,
        _ => TTL_DEFAULT_SECS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().expect("date literal")
    }

    #[test]
    fn test_key_shape() {
        let key = cache_key(Endpoint::Summary, "end=2024-01-14&start=2024-01-01");
        assert!(key.starts_with("analytics:summary:"));
        let hash = key.rsplit(':').next().expect("hash segment");
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_identical_params_identical_key() {
        let a = cache_key(Endpoint::Topics, "end=2024-01-14&start=2024-01-01");
        let b = cache_key(Endpoint::Topics, "end=2024-01-14&start=2024-01-01");
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_endpoint_different_key() {
        let params = "end=2024-01-14&start=2024-01-01";
        assert_ne!(
            cache_key(Endpoint::Topics, params),
            cache_key(Endpoint::Sources, params)
        );
    }

    #[test]
    fn test_ttl_policy() {
        let today = d("2024-03-15");
        let past = DateRange {
            start: d("2024-01-01"),
            end:   d("2024-01-31"),
        };
        let current = DateRange {
            start: d("2024-03-02"),
            end:   today,
        };

        assert_eq!(ttl_secs(Endpoint::Summary, Some(current), today), 60);
        assert_eq!(ttl_secs(Endpoint::DashboardSummary, Some(past), today), 60);
        assert_eq!(ttl_secs(Endpoint::Topics, Some(past), today), 900);
        assert_eq!(ttl_secs(Endpoint::Topics, Some(current), today), 300);
        assert_eq!(ttl_secs(Endpoint::Examples, None, today), 300);
    }
}
