//! Parameter schemas for the rollup endpoints.
//!
//! Decoding is declarative: each struct resolves optional query inputs into
//! a fully-defaulted value and exposes a canonical string form used for
//! cache keying. Validation failures carry the offending parameter name.

use chrono::{Duration, NaiveDate};
use opine_error::{OpineError, Result};
use serde::{Deserialize, Serialize};

use crate::model::Sentiment;

/// Default lookback window when no dates are supplied.
const DEFAULT_WINDOW_DAYS: i64 = 14;

/// Maximum page size for daily aggregates (one year).
pub const MAX_DAILY_PAGE_SIZE: u32 = 365;

/// Maximum examples per request.
pub const MAX_EXAMPLES_LIMIT: u32 = 50;

/// Grouping granularity for trend rollups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    /// One point per day.
    Day,
    /// One point per ISO week.
    Week,
    /// One point per calendar month.
    Month,
}

impl GroupBy {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// Parse from a query parameter, defaulting to day.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Validation` for unknown values.
    pub fn parse(s: Option<&str>) -> Result<Self> {
        match s {
            None | Some("day") => Ok(Self::Day),
            Some("week") => Ok(Self::Week),
            Some("month") => Ok(Self::Month),
            Some(other) => Err(OpineError::validation_field(
                format!("group_by must be day, week, or month, got {other}"),
                "group_by",
            )),
        }
    }

    /// PostgreSQL `date_trunc` unit for this granularity.
    #[must_use]
    pub const fn trunc_unit(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

/// Resolved inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First day of the window.
    pub start: NaiveDate,
    /// Last day of the window (inclusive).
    pub end: NaiveDate,
}

impl DateRange {
    /// Resolve optional bounds against `today`, defaulting to the last
    /// fourteen days.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Validation` when start is after end or the span
    /// exceeds five years.
    pub fn resolve(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Self> {
        let end = end.unwrap_or(today);
        let start = start.unwrap_or(end - Duration::days(DEFAULT_WINDOW_DAYS - 1));
        if start > end {
            return Err(OpineError::validation_field(
                format!("start_date {start} is after end_date {end}"),
                "start_date",
            ));
        }
        if (end - start).num_days() > 366 * 5 {
            return Err(OpineError::validation_field(
                "date range exceeds five years",
                "start_date",
            ));
        }
        Ok(Self { start, end })
    }

    /// Whether the whole window is strictly before `today`.
    ///
    /// Historical windows get the long cache TTL because their rollups can
    /// no longer change through ingest.
    #[must_use]
    pub fn is_fully_past(&self, today: NaiveDate) -> bool {
        self.end < today
    }

    /// Number of days covered (inclusive).
    #[must_use]
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// The window of equal length immediately preceding this one.
    ///
    /// Used by the topics rollup for delta-vs-prior-window.
    #[must_use]
    pub fn prior_window(&self) -> Self {
        let len = Duration::days(self.days());
        Self {
            start: self.start - len,
            end:   self.end - len,
        }
    }

    fn canonical(&self) -> String {
        format!("end={}&start={}", self.end, self.start)
    }
}

/// Parameters for sentiment-trend and volume-trend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrendParams {
    /// Grouping granularity.
    pub group_by: GroupBy,
    /// Date window.
    pub range: DateRange,
}

impl TrendParams {
    /// Canonical string form for cache keying.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}&group_by={}", self.range.canonical(), self.group_by.as_str())
    }
}

/// Parameters for the daily-aggregate rollup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DailyAggregateParams {
    /// Date window.
    pub range: DateRange,
    /// 1-based page number.
    pub page: u32,
    /// Page size, capped at [`MAX_DAILY_PAGE_SIZE`].
    pub page_size: u32,
}

impl DailyAggregateParams {
    /// Resolve pagination inputs.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Validation` for a zero page or an over-cap page
    /// size.
    pub fn new(range: DateRange, page: Option<u32>, page_size: Option<u32>) -> Result<Self> {
        let page = page.unwrap_or(1);
        let page_size = page_size.unwrap_or(30);
        if page == 0 {
            return Err(OpineError::validation_field("page must be >= 1", "page"));
        }
        if page_size == 0 || page_size > MAX_DAILY_PAGE_SIZE {
            return Err(OpineError::validation_field(
                format!("page_size must be 1..={MAX_DAILY_PAGE_SIZE}"),
                "page_size",
            ));
        }
        Ok(Self {
            range,
            page,
            page_size,
        })
    }

    /// Canonical string form for cache keying.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!(
            "{}&page={}&page_size={}",
            self.range.canonical(),
            self.page,
            self.page_size
        )
    }
}

/// Parameters for per-customer statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CustomerStatsParams {
    /// Minimum feedback count for a customer to appear.
    pub min_feedback_count: u32,
    /// Date window.
    pub range: DateRange,
}

impl CustomerStatsParams {
    /// Canonical string form for cache keying.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!(
            "{}&min_feedback_count={}",
            self.range.canonical(),
            self.min_feedback_count
        )
    }
}

/// Parameters for per-source statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SourceStatsParams {
    /// Date window.
    pub range: DateRange,
}

impl SourceStatsParams {
    /// Canonical string form for cache keying.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.range.canonical()
    }
}

/// Parameters for the toxicity rollup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ToxicityParams {
    /// Score threshold in [0, 1].
    pub threshold: f64,
    /// Date window.
    pub range: DateRange,
}

impl ToxicityParams {
    /// Resolve the threshold input.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Validation` for thresholds outside [0, 1].
    pub fn new(threshold: Option<f64>, range: DateRange) -> Result<Self> {
        let threshold = threshold.unwrap_or(0.5);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(OpineError::validation_field(
                format!("threshold must be within 0.0..=1.0, got {threshold}"),
                "threshold",
            ));
        }
        Ok(Self { threshold, range })
    }

    /// Canonical string form for cache keying.
    #[must_use]
    pub fn canonical(&self) -> String {
        // Fixed precision keeps 0.5 and 0.50 on one cache entry.
        format!("{}&threshold={:.4}", self.range.canonical(), self.threshold)
    }
}

/// Parameters for the summary rollup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SummaryParams {
    /// Date window.
    pub range: DateRange,
}

impl SummaryParams {
    /// Canonical string form for cache keying.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.range.canonical()
    }
}

/// Parameters for the topics rollup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TopicsParams {
    /// Date window.
    pub range: DateRange,
}

impl TopicsParams {
    /// Canonical string form for cache keying.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.range.canonical()
    }
}

/// Parameters for the examples lookup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExamplesParams {
    /// Restrict to one topic.
    pub topic_id: Option<i64>,
    /// Restrict to one sentiment class.
    pub sentiment: Option<Sentiment>,
    /// Maximum rows, 1..=50.
    pub limit: u32,
}

impl ExamplesParams {
    /// Resolve the limit input.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Validation` for limits outside 1..=50.
    pub fn new(topic_id: Option<i64>, sentiment: Option<Sentiment>, limit: Option<u32>) -> Result<Self> {
        let limit = limit.unwrap_or(10);
        if limit == 0 || limit > MAX_EXAMPLES_LIMIT {
            return Err(OpineError::validation_field(
                format!("limit must be 1..={MAX_EXAMPLES_LIMIT}"),
                "limit",
            ));
        }
        Ok(Self {
            topic_id,
            sentiment,
            limit,
        })
    }

    /// Canonical string form for cache keying.
    #[must_use]
    pub fn canonical(&self) -> String {
        let sentiment = self
            .sentiment
            .map_or_else(|| "any".to_string(), |s| s.as_i16().to_string());
        let topic = self
            .topic_id
            .map_or_else(|| "any".to_string(), |t| t.to_string());
        format!("limit={}&sentiment={sentiment}&topic_id={topic}", self.limit)
    }
}

/// Parameters for the dashboard composite.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DashboardParams {
    /// Date window.
    pub range: DateRange,
}

impl DashboardParams {
    /// Canonical string form for cache keying.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.range.canonical()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().expect("date literal")
    }

    #[test]
    fn test_range_defaults_to_last_fourteen_days() {
        let today = d("2024-03-15");
        let range = DateRange::resolve(None, None, today).expect("resolve");
        assert_eq!(range.end, today);
        assert_eq!(range.start, d("2024-03-02"));
        assert_eq!(range.days(), 14);
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        let today = d("2024-03-15");
        let err = DateRange::resolve(Some(d("2024-03-10")), Some(d("2024-03-01")), today);
        assert!(err.is_err());
    }

    #[test]
    fn test_range_historical_classification() {
        let today = d("2024-03-15");
        let past = DateRange::resolve(Some(d("2024-01-01")), Some(d("2024-01-31")), today)
            .expect("resolve");
        assert!(past.is_fully_past(today));

        let current = DateRange::resolve(None, None, today).expect("resolve");
        assert!(!current.is_fully_past(today));
    }

    #[test]
    fn test_prior_window() {
        let range = DateRange {
            start: d("2024-03-08"),
            end:   d("2024-03-14"),
        };
        let prior = range.prior_window();
        assert_eq!(prior.start, d("2024-03-01"));
        assert_eq!(prior.end, d("2024-03-07"));
        assert_eq!(prior.days(), range.days());
    }

    #[test]
    fn test_group_by_parse() {
        assert_eq!(GroupBy::parse(None).expect("default"), GroupBy::Day);
        assert_eq!(GroupBy::parse(Some("week")).expect("week"), GroupBy::Week);
        assert!(GroupBy::parse(Some("year")).is_err());
    }

    #[test]
    fn test_canonical_form_is_deterministic() {
        let range = DateRange {
            start: d("2024-01-01"),
            end:   d("2024-01-14"),
        };
        let params = TrendParams {
            group_by: GroupBy::Day,
            range,
        };
        assert_eq!(params.canonical(), "end=2024-01-14&start=2024-01-01&group_by=day");
        assert_eq!(params.canonical(), params.canonical());
    }

    #[test]
    fn test_daily_page_size_cap() {
        let range = DateRange {
            start: d("2024-01-01"),
            end:   d("2024-01-14"),
        };
        assert!(DailyAggregateParams::new(range, None, Some(366)).is_err());
        assert!(DailyAggregateParams::new(range, Some(0), None).is_err());
        let params = DailyAggregateParams::new(range, None, None).expect("defaults");
        assert_eq!(params.page, 1);
        assert_eq!(params.page_size, 30);
    }

    #[test]
    fn test_toxicity_threshold_bounds() {
        let range = DateRange {
            start: d("2024-01-01"),
            end:   d("2024-01-14"),
        };
        assert!(ToxicityParams::new(Some(1.5), range).is_err());
        assert!(ToxicityParams::new(Some(-0.1), range).is_err());
        let params = ToxicityParams::new(None, range).expect("default");
        assert!((params.threshold - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_examples_limit_bounds() {
        assert!(ExamplesParams::new(None, None, Some(51)).is_err());
        assert!(ExamplesParams::new(None, None, Some(0)).is_err());
        let params = ExamplesParams::new(Some(3), Some(Sentiment::Negative), None).expect("ok");
        assert_eq!(params.limit, 10);
        assert_eq!(params.canonical(), "limit=10&sentiment=-1&topic_id=3");
    }
}
