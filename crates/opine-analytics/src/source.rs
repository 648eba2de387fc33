//! The rollup source seam.
//!
//! The engine talks to this trait so the caching discipline is testable
//! without a database; production wires in the read-only statement surface
//! from `opine-db`.

use async_trait::async_trait;
use opine_core::analytics::{
    CustomerStatsParams, CustomerStatsRow, DailyAggregateParams, DailyAggregateRow, DateRange,
    ExampleRow, ExamplesParams, GroupBy, Page, SentimentTrendPoint, SourceStatsRow,
    SummaryResponse, TopicRow, ToxicityParams, ToxicityStats, VolumePoint,
};
use opine_error::Result;

/// Read-only rollup queries the engine may run.
#[async_trait]
pub trait RollupSource: Send + Sync {
    /// Sentiment counts per period.
    async fn sentiment_trend(
        &self,
        group_by: GroupBy,
        range: DateRange,
    ) -> Result<Vec<SentimentTrendPoint>>;

    /// Total volume per period.
    async fn volume_trend(&self, group_by: GroupBy, range: DateRange) -> Result<Vec<VolumePoint>>;

    /// Paginated per-day rollup from the materialised view.
    async fn daily_aggregates(
        &self,
        params: DailyAggregateParams,
    ) -> Result<Page<DailyAggregateRow>>;

    /// Per-customer statistics.
    async fn customer_stats(&self, params: CustomerStatsParams) -> Result<Vec<CustomerStatsRow>>;

    /// Per-source statistics.
    async fn source_stats(&self, range: DateRange) -> Result<Vec<SourceStatsRow>>;

    /// Toxicity rollup.
    async fn toxicity_stats(&self, params: ToxicityParams) -> Result<ToxicityStats>;

    /// Compact summary.
    async fn summary(&self, range: DateRange) -> Result<SummaryResponse>;

    /// Per-topic counts for one window (deltas computed by the engine).
    async fn topic_counts(&self, range: DateRange) -> Result<Vec<TopicRow>>;

    /// Topics with at least one annotated feedback in the window.
    async fn active_topic_count(&self, range: DateRange) -> Result<i64>;

    /// Example feedback lookup.
    async fn examples(&self, params: ExamplesParams) -> Result<Vec<ExampleRow>>;
}

#[async_trait]
impl RollupSource for opine_db::analytics::AnalyticsStore {
    async fn sentiment_trend(
        &self,
        group_by: GroupBy,
        range: DateRange,
    ) -> Result<Vec<SentimentTrendPoint>> {
        Self::sentiment_trend(self, group_by, range).await
    }

    async fn volume_trend(&self, group_by: GroupBy, range: DateRange) -> Result<Vec<VolumePoint>> {
        Self::volume_trend(self, group_by, range).await
    }

    async fn daily_aggregates(
        &self,
        params: DailyAggregateParams,
    ) -> Result<Page<DailyAggregateRow>> {
        Self::daily_aggregates(self, params).await
    }

    async fn customer_stats(&self, params: CustomerStatsParams) -> Result<Vec<CustomerStatsRow>> {
        Self::customer_stats(self, params).await
    }

    async fn source_stats(&self, range: DateRange) -> Result<Vec<SourceStatsRow>> {
        Self::source_stats(self, range).await
    }

    async fn toxicity_stats(&self, params: ToxicityParams) -> Result<ToxicityStats> {
        Self::toxicity_stats(self, params).await
    }

    async fn summary(&self, range: DateRange) -> Result<SummaryResponse> {
        Self::summary(self, range).await
    }

    async fn topic_counts(&self, range: DateRange) -> Result<Vec<TopicRow>> {
        Self::topic_counts(self, range).await
    }

    async fn active_topic_count(&self, range: DateRange) -> Result<i64> {
        Self::active_topic_count(self, range).await
    }

    async fn examples(&self, params: ExamplesParams) -> Result<Vec<ExampleRow>> {
        Self::examples(self, params).await
    }
}
