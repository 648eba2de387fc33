//! Analytics engine: parameterised read-only rollups with cache-through.
//!
//! Every endpoint follows the same discipline:
//! 1. derive a stable key from the endpoint tag and canonical parameters;
//! 2. cache-read; a hit within TTL returns the stored bytes verbatim;
//! 3. on miss, run the whitelisted statement, serialise the response, and
//!    write it through with the endpoint's TTL.
//!
//! Responses are cached and replayed as exact bytes, which is what makes
//! identical requests byte-identical within the TTL window.

mod source;

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use opine_cache::Cache;
use opine_core::analytics::{
    cache_key, ttl_secs, CustomerStatsParams, DailyAggregateParams, DashboardParams, DashboardSummary,
    DateRange, Endpoint, ExamplesParams, SourceStatsParams, SummaryParams, TopicRow, TopicsParams,
    ToxicityParams, TrendParams,
};
use opine_error::Result;
use serde::Serialize;
use tracing::debug;

pub use source::RollupSource;

/// The cache-through rollup engine.
#[derive(Clone)]
pub struct AnalyticsEngine {
    source: Arc<dyn RollupSource>,
    cache: Arc<dyn Cache>,
}

impl AnalyticsEngine {
    /// Assemble the engine from a rollup source and a cache.
    #[must_use]
    pub fn new(source: Arc<dyn RollupSource>, cache: Arc<dyn Cache>) -> Self {
        Self { source, cache }
    }

    /// Today's date, the anchor for default windows and TTL class.
    #[must_use]
    pub fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    async fn cached<T, F, Fut>(
        &self,
        endpoint: Endpoint,
        canonical: &str,
        range: Option<DateRange>,
        compute: F,
    ) -> Result<Vec<u8>>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let key = cache_key(endpoint, canonical);
        if let Some(hit) = self.cache.get(&key).await {
            debug!(endpoint = endpoint.as_str(), "analytics cache hit");
            return Ok(hit);
        }

        let response = compute().await?;
        let bytes = serde_json::to_vec(&response)?;
        let ttl = ttl_secs(endpoint, range, Self::today());
        self.cache
            .set_ttl(&key, &bytes, Duration::from_secs(ttl))
            .await;
        debug!(endpoint = endpoint.as_str(), ttl, "analytics cache fill");
        Ok(bytes)
    }

    /// Sentiment-trend rollup.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn sentiment_trends(&self, params: TrendParams) -> Result<Vec<u8>> {
        self.cached(
            Endpoint::SentimentTrends,
            &params.canonical(),
            Some(params.range),
            || self.source.sentiment_trend(params.group_by, params.range),
        )
        .await
    }

    /// Volume-trend rollup.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn volume_trends(&self, params: TrendParams) -> Result<Vec<u8>> {
        self.cached(
            Endpoint::VolumeTrends,
            &params.canonical(),
            Some(params.range),
            || self.source.volume_trend(params.group_by, params.range),
        )
        .await
    }

    /// Daily aggregates from the materialised view.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn daily_aggregates(&self, params: DailyAggregateParams) -> Result<Vec<u8>> {
        self.cached(
            Endpoint::DailyAggregates,
            &params.canonical(),
            Some(params.range),
            || self.source.daily_aggregates(params),
        )
        .await
    }

    /// Per-customer statistics.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn customers(&self, params: CustomerStatsParams) -> Result<Vec<u8>> {
        self.cached(
            Endpoint::Customers,
            &params.canonical(),
            Some(params.range),
            || self.source.customer_stats(params),
        )
        .await
    }

    /// Per-source statistics.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn sources(&self, params: SourceStatsParams) -> Result<Vec<u8>> {
        self.cached(
            Endpoint::Sources,
            &params.canonical(),
            Some(params.range),
            || self.source.source_stats(params.range),
        )
        .await
    }

    /// Toxicity rollup.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn toxicity(&self, params: ToxicityParams) -> Result<Vec<u8>> {
        self.cached(
            Endpoint::Toxicity,
            &params.canonical(),
            Some(params.range),
            || self.source.toxicity_stats(params),
        )
        .await
    }

    /// Compact summary.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn summary(&self, params: SummaryParams) -> Result<Vec<u8>> {
        self.cached(
            Endpoint::Summary,
            &params.canonical(),
            Some(params.range),
            || self.source.summary(params.range),
        )
        .await
    }

    /// Topics rollup with delta-vs-prior-window.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn topics(&self, params: TopicsParams) -> Result<Vec<u8>> {
        self.cached(
            Endpoint::Topics,
            &params.canonical(),
            Some(params.range),
            || async {
                let current = self.source.topic_counts(params.range).await?;
                let prior = self.source.topic_counts(params.range.prior_window()).await?;
                Ok(merge_topic_deltas(current, &prior))
            },
        )
        .await
    }

    /// Example feedback lookup.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn examples(&self, params: ExamplesParams) -> Result<Vec<u8>> {
        self.cached(Endpoint::Examples, &params.canonical(), None, || {
            self.source.examples(params)
        })
        .await
    }

    /// Dashboard composite.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn dashboard_summary(&self, params: DashboardParams) -> Result<Vec<u8>> {
        self.cached(
            Endpoint::DashboardSummary,
            &params.canonical(),
            Some(params.range),
            || async {
                let summary = self.source.summary(params.range).await?;
                let topic_count = self.source.active_topic_count(params.range).await?;
                let mut topics = self.source.topic_counts(params.range).await?;
                // Worst sentiment first; untouched topics sort last.
                topics.sort_by(|a, b| {
                    let a_key = a.avg_sentiment.unwrap_or(f64::MAX);
                    let b_key = b.avg_sentiment.unwrap_or(f64::MAX);
                    a_key.partial_cmp(&b_key).unwrap_or(std::cmp::Ordering::Equal)
                });
                topics.truncate(5);
                Ok(DashboardSummary {
                    total_feedback: summary.total_feedback,
                    negative_percentage: summary.negative_percentage,
                    topic_count,
                    series: summary.series,
                    top_negative_topics: topics,
                })
            },
        )
        .await
    }
}

/// Attach delta-vs-prior to current-window topic rows.
fn merge_topic_deltas(mut current: Vec<TopicRow>, prior: &[TopicRow]) -> Vec<TopicRow> {
    for row in &mut current {
        let prior_count = prior
            .iter()
            .find(|p| p.id == row.id)
            .map_or(0, |p| p.feedback_count);
        row.delta_vs_prior = row.feedback_count - prior_count;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use opine_core::analytics::{
        CustomerStatsRow, DailyAggregateRow, ExampleRow, GroupBy, Page, SentimentTrendPoint,
        SourceStatsRow, SummaryResponse, ToxicityStats, VolumePoint,
    };
    use parking_lot::Mutex;

    /// Source stub counting queries and serving canned rows.
    #[derive(Default)]
    struct StubSource {
        query_count: Mutex<u32>,
        topic_rows: Mutex<Vec<Vec<TopicRow>>>,
    }

    impl StubSource {
        fn queries(&self) -> u32 {
            *self.query_count.lock()
        }

        fn bump(&self) {
            *self.query_count.lock() += 1;
        }
    }

    #[async_trait]
    impl RollupSource for StubSource {
        async fn sentiment_trend(
            &self,
            _group_by: GroupBy,
            range: DateRange,
        ) -> Result<Vec<SentimentTrendPoint>> {
            self.bump();
            Ok(vec![SentimentTrendPoint {
                period:         range.start,
                positive_count: 3,
                negative_count: 1,
                neutral_count:  2,
            }])
        }

        async fn volume_trend(
            &self,
            _group_by: GroupBy,
            range: DateRange,
        ) -> Result<Vec<VolumePoint>> {
            self.bump();
            Ok(vec![VolumePoint {
                period: range.start,
                total:  6,
            }])
        }

        async fn daily_aggregates(
            &self,
            params: DailyAggregateParams,
        ) -> Result<Page<DailyAggregateRow>> {
            self.bump();
            Ok(Page {
                items:     vec![],
                page:      params.page,
                page_size: params.page_size,
                total:     0,
            })
        }

        async fn customer_stats(
            &self,
            _params: CustomerStatsParams,
        ) -> Result<Vec<CustomerStatsRow>> {
            self.bump();
            Ok(vec![])
        }

        async fn source_stats(&self, _range: DateRange) -> Result<Vec<SourceStatsRow>> {
            self.bump();
            Ok(vec![])
        }

        async fn toxicity_stats(&self, params: ToxicityParams) -> Result<ToxicityStats> {
            self.bump();
            Ok(ToxicityStats {
                above_threshold: 0,
                mean_toxicity:   None,
                threshold:       params.threshold,
            })
        }

        async fn summary(&self, _range: DateRange) -> Result<SummaryResponse> {
            self.bump();
            Ok(SummaryResponse {
                total_feedback:      10,
                negative_percentage: 20.0,
                series:              vec![],
            })
        }

        async fn topic_counts(&self, _range: DateRange) -> Result<Vec<TopicRow>> {
            self.bump();
            let mut queued = self.topic_rows.lock();
            if queued.is_empty() {
                Ok(vec![])
            } else {
                Ok(queued.remove(0))
            }
        }

        async fn active_topic_count(&self, _range: DateRange) -> Result<i64> {
            self.bump();
            Ok(2)
        }

        async fn examples(&self, _params: ExamplesParams) -> Result<Vec<ExampleRow>> {
            self.bump();
            Ok(vec![])
        }
    }

    fn engine_with(source: Arc<StubSource>) -> AnalyticsEngine {
        AnalyticsEngine::new(source, Arc::new(opine_cache::MemoryCache::new()))
    }

    fn range() -> DateRange {
        DateRange {
            start: "2024-01-01".parse().expect("date"),
            end:   "2024-01-14".parse().expect("date"),
        }
    }

    #[tokio::test]
    async fn test_identical_params_are_byte_identical_within_ttl() {
        let source = Arc::new(StubSource::default());
        let engine = engine_with(Arc::clone(&source));
        let params = TrendParams {
            group_by: GroupBy::Day,
            range:    range(),
        };

        let first = engine.sentiment_trends(params).await.expect("first");
        let second = engine.sentiment_trends(params).await.expect("second");

        assert_eq!(first, second);
        // Second call was a cache hit; the source ran once.
        assert_eq!(source.queries(), 1);
    }

    #[tokio::test]
    async fn test_different_params_miss_separately() {
        let source = Arc::new(StubSource::default());
        let engine = engine_with(Arc::clone(&source));

        let day = TrendParams {
            group_by: GroupBy::Day,
            range:    range(),
        };
        let week = TrendParams {
            group_by: GroupBy::Week,
            range:    range(),
        };
        engine.volume_trends(day).await.expect("day");
        engine.volume_trends(week).await.expect("week");

        assert_eq!(source.queries(), 2);
    }

    #[tokio::test]
    async fn test_topics_delta_vs_prior_window() {
        let source = Arc::new(StubSource::default());
        let topic = |id: i64, count: i64| TopicRow {
            id,
            label: format!("topic-{id}"),
            feedback_count: count,
            avg_sentiment: Some(0.0),
            delta_vs_prior: 0,
        };
        // First call serves the current window, second the prior window.
        *source.topic_rows.lock() = vec![
            vec![topic(1, 10), topic(2, 4)],
            vec![topic(1, 7)],
        ];

        let engine = engine_with(Arc::clone(&source));
        let bytes = engine
            .topics(TopicsParams { range: range() })
            .await
            .expect("topics");
        let rows: Vec<TopicRow> = serde_json::from_slice(&bytes).expect("rows");

        assert_eq!(rows[0].delta_vs_prior, 3); // 10 - 7
        assert_eq!(rows[1].delta_vs_prior, 4); // 4 - 0 (new topic)
    }

    #[tokio::test]
    async fn test_dashboard_sorts_most_negative_first() {
        let source = Arc::new(StubSource::default());
        let topic = |id: i64, sentiment: f64| TopicRow {
            id,
            label: format!("topic-{id}"),
            feedback_count: 5,
            avg_sentiment: Some(sentiment),
            delta_vs_prior: 0,
        };
        *source.topic_rows.lock() = vec![vec![topic(1, 0.5), topic(2, -0.8), topic(3, -0.1)]];

        let engine = engine_with(Arc::clone(&source));
        let bytes = engine
            .dashboard_summary(DashboardParams { range: range() })
            .await
            .expect("dashboard");
        let dashboard: DashboardSummary = serde_json::from_slice(&bytes).expect("dashboard");

        assert_eq!(dashboard.topic_count, 2);
        assert_eq!(dashboard.top_negative_topics[0].id, 2);
        assert_eq!(dashboard.top_negative_topics[1].id, 3);
        assert_eq!(dashboard.top_negative_topics[2].id, 1);
    }

    #[test]
    fn test_merge_topic_deltas_empty_prior() {
        let current = vec![TopicRow {
            id: 1,
            label: "a".to_string(),
            feedback_count: 3,
            avg_sentiment: None,
            delta_vs_prior: 0,
        }];
        let merged = merge_topic_deltas(current, &[]);
        assert_eq!(merged[0].delta_vs_prior, 3);
    }
}
