//! Read-only analytics statements.
//!
//! This module is the whitelist of §-shaped rollup queries: every statement
//! the analytics engine can run is a fixed SQL constant here, executed
//! inside a `READ ONLY` transaction. Nothing else reaches the database
//! through this surface, and no caller supplies SQL text.

use deadpool_postgres::Pool;
use opine_core::analytics::{
    CustomerStatsParams, DailyAggregateParams, DailyAggregateRow, DateRange, ExampleRow,
    ExamplesParams, GroupBy, Page, SentimentTrendPoint, SourceStatsRow, SummaryResponse,
    TopicRow, ToxicityParams, ToxicityStats, VolumePoint,
};
use opine_error::Result;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

use crate::error::{classify_pg_error, classify_pool_error};
use crate::retry::with_retry;

/// Read-only analytics query surface.
#[derive(Clone)]
pub struct AnalyticsStore {
    pool: Pool,
}

impl AnalyticsStore {
    /// Create a store over the pool.
    #[must_use]
    pub const fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Run one whitelisted statement inside a read-only transaction.
    async fn run(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>> {
        let mut client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
        let tx = client
            .build_transaction()
            .read_only(true)
            .start()
            .await
            .map_err(|e| classify_pg_error(&e))?;
        let rows = tx.query(sql, params).await.map_err(|e| classify_pg_error(&e))?;
        tx.commit().await.map_err(|e| classify_pg_error(&e))?;
        Ok(rows)
    }

    /// Sentiment counts per period.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn sentiment_trend(
        &self,
        group_by: GroupBy,
        range: DateRange,
    ) -> Result<Vec<SentimentTrendPoint>> {
        // The trunc unit comes from the GroupBy enum, never from user text.
        let sql = format!(
            r"
            SELECT date_trunc('{unit}', f.created_at)::date AS period,
                   COUNT(*) FILTER (WHERE a.sentiment = 1) AS positive_count,
                   COUNT(*) FILTER (WHERE a.sentiment = -1) AS negative_count,
                   COUNT(*) FILTER (WHERE a.sentiment = 0) AS neutral_count
            FROM feedback f
            JOIN annotations a ON a.feedback_id = f.id
            WHERE f.created_at::date BETWEEN $1 AND $2
            GROUP BY 1
            ORDER BY 1
            ",
            unit = group_by.trunc_unit()
        );
        with_retry("analytics.sentiment_trend", || async {
            let rows = self.run(&sql, &[&range.start, &range.end]).await?;
            Ok(rows
                .iter()
                .map(|r| SentimentTrendPoint {
                    period:         r.get("period"),
                    positive_count: r.get("positive_count"),
                    negative_count: r.get("negative_count"),
                    neutral_count:  r.get("neutral_count"),
                })
                .collect())
        })
        .await
    }

    /// Total volume per period.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn volume_trend(
        &self,
        group_by: GroupBy,
        range: DateRange,
    ) -> Result<Vec<VolumePoint>> {
        let sql = format!(
            r"
            SELECT date_trunc('{unit}', created_at)::date AS period, COUNT(*) AS total
            FROM feedback
            WHERE created_at::date BETWEEN $1 AND $2
            GROUP BY 1
            ORDER BY 1
            ",
            unit = group_by.trunc_unit()
        );
        with_retry("analytics.volume_trend", || async {
            let rows = self.run(&sql, &[&range.start, &range.end]).await?;
            Ok(rows
                .iter()
                .map(|r| VolumePoint {
                    period: r.get("period"),
                    total:  r.get("total"),
                })
                .collect())
        })
        .await
    }

    /// Paginated per-day rollup from the materialised view.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn daily_aggregates(
        &self,
        params: DailyAggregateParams,
    ) -> Result<Page<DailyAggregateRow>> {
        const SQL: &str = r"
            SELECT day, total_feedback, positive_feedback, negative_feedback,
                   neutral_feedback, avg_sentiment, unique_customers, top_sources
            FROM daily_feedback_aggregates
            WHERE day BETWEEN $1 AND $2
            ORDER BY day DESC
            LIMIT $3 OFFSET $4
        ";
        const COUNT_SQL: &str = r"
            SELECT COUNT(*) FROM daily_feedback_aggregates WHERE day BETWEEN $1 AND $2
        ";
        with_retry("analytics.daily_aggregates", || async {
            let limit = i64::from(params.page_size);
            let offset = i64::from(params.page - 1) * limit;
            let rows = self
                .run(SQL, &[&params.range.start, &params.range.end, &limit, &offset])
                .await?;
            let total_rows = self
                .run(COUNT_SQL, &[&params.range.start, &params.range.end])
                .await?;
            let total: i64 = total_rows[0].get(0);
            Ok(Page {
                items: rows.iter().map(row_to_daily).collect(),
                page: params.page,
                page_size: params.page_size,
                total: total.max(0) as u64,
            })
        })
        .await
    }

    /// Per-customer statistics above a minimum feedback count.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn customer_stats(
        &self,
        params: CustomerStatsParams,
    ) -> Result<Vec<opine_core::analytics::CustomerStatsRow>> {
        const SQL: &str = r"
            SELECT f.customer_id, COUNT(*) AS feedback_count,
                   AVG(a.sentiment)::float8 AS avg_sentiment
            FROM feedback f
            LEFT JOIN annotations a ON a.feedback_id = f.id
            WHERE f.customer_id IS NOT NULL
              AND f.created_at::date BETWEEN $1 AND $2
            GROUP BY f.customer_id
            HAVING COUNT(*) >= $3
            ORDER BY feedback_count DESC, f.customer_id
            LIMIT 100
        ";
        with_retry("analytics.customer_stats", || async {
            let min = i64::from(params.min_feedback_count);
            let rows = self
                .run(SQL, &[&params.range.start, &params.range.end, &min])
                .await?;
            Ok(rows
                .iter()
                .map(|r| opine_core::analytics::CustomerStatsRow {
                    customer_id:    r.get("customer_id"),
                    feedback_count: r.get("feedback_count"),
                    avg_sentiment:  r.get("avg_sentiment"),
                })
                .collect())
        })
        .await
    }

    /// Per-source statistics with sentiment mix.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn source_stats(&self, range: DateRange) -> Result<Vec<SourceStatsRow>> {
        const SQL: &str = r"
            SELECT f.source, COUNT(*) AS feedback_count,
                   COUNT(*) FILTER (WHERE a.sentiment = 1) AS positive_count,
                   COUNT(*) FILTER (WHERE a.sentiment = -1) AS negative_count,
                   COUNT(*) FILTER (WHERE a.sentiment = 0) AS neutral_count
            FROM feedback f
            LEFT JOIN annotations a ON a.feedback_id = f.id
            WHERE f.created_at::date BETWEEN $1 AND $2
            GROUP BY f.source
            ORDER BY feedback_count DESC, f.source
        ";
        with_retry("analytics.source_stats", || async {
            let rows = self.run(SQL, &[&range.start, &range.end]).await?;
            Ok(rows
                .iter()
                .map(|r| SourceStatsRow {
                    source:         r.get("source"),
                    feedback_count: r.get("feedback_count"),
                    positive_count: r.get("positive_count"),
                    negative_count: r.get("negative_count"),
                    neutral_count:  r.get("neutral_count"),
                })
                .collect())
        })
        .await
    }

    /// Toxicity count above a threshold plus the mean.
    ///
    /// NULL toxicity rows (annotated before a toxicity model existed) are
    /// skipped by both aggregates.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn toxicity_stats(&self, params: ToxicityParams) -> Result<ToxicityStats> {
        const SQL: &str = r"
            SELECT COUNT(*) FILTER (WHERE a.toxicity >= $3) AS above_threshold,
                   AVG(a.toxicity)::float8 AS mean_toxicity
            FROM annotations a
            JOIN feedback f ON f.id = a.feedback_id
            WHERE f.created_at::date BETWEEN $1 AND $2
        ";
        with_retry("analytics.toxicity_stats", || async {
            let rows = self
                .run(SQL, &[&params.range.start, &params.range.end, &params.threshold])
                .await?;
            let row = &rows[0];
            Ok(ToxicityStats {
                above_threshold: row.get("above_threshold"),
                mean_toxicity:   row.get("mean_toxicity"),
                threshold:       params.threshold,
            })
        })
        .await
    }

    /// Compact summary: totals, negative share, and a trailing 14-day
    /// series ending at the window's end.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn summary(&self, range: DateRange) -> Result<SummaryResponse> {
        const TOTALS_SQL: &str = r"
            SELECT COUNT(*) AS total,
                   COUNT(a.id) AS annotated,
                   COUNT(a.id) FILTER (WHERE a.sentiment = -1) AS negative
            FROM feedback f
            LEFT JOIN annotations a ON a.feedback_id = f.id
            WHERE f.created_at::date BETWEEN $1 AND $2
        ";
        const SERIES_SQL: &str = r"
            SELECT created_at::date AS period, COUNT(*) AS total
            FROM feedback
            WHERE created_at::date BETWEEN $1 AND $2
            GROUP BY 1
            ORDER BY 1
        ";
        with_retry("analytics.summary", || async {
            let totals = self.run(TOTALS_SQL, &[&range.start, &range.end]).await?;
            let row = &totals[0];
            let total: i64 = row.get("total");
            let annotated: i64 = row.get("annotated");
            let negative: i64 = row.get("negative");

            let series_start = range.end - chrono::Duration::days(13);
            let series_rows = self.run(SERIES_SQL, &[&series_start, &range.end]).await?;

            Ok(SummaryResponse {
                total_feedback:      total,
                negative_percentage: percentage(negative, annotated),
                series:              series_rows
                    .iter()
                    .map(|r| VolumePoint {
                        period: r.get("period"),
                        total:  r.get("total"),
                    })
                    .collect(),
            })
        })
        .await
    }

    /// Per-topic counts and mean sentiment for a window.
    ///
    /// The caller diffs two windows for delta-vs-prior.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn topic_counts(&self, range: DateRange) -> Result<Vec<TopicRow>> {
        const SQL: &str = r"
            SELECT t.id, t.label, COUNT(a.id) AS feedback_count,
                   AVG(a.sentiment)::float8 AS avg_sentiment
            FROM topics t
            JOIN annotations a ON a.topic_id = t.id
            JOIN feedback f ON f.id = a.feedback_id
            WHERE f.created_at::date BETWEEN $1 AND $2
            GROUP BY t.id, t.label
            ORDER BY feedback_count DESC, t.id
        ";
        with_retry("analytics.topic_counts", || async {
            let rows = self.run(SQL, &[&range.start, &range.end]).await?;
            Ok(rows
                .iter()
                .map(|r| TopicRow {
                    id:             r.get("id"),
                    label:          r.get("label"),
                    feedback_count: r.get("feedback_count"),
                    avg_sentiment:  r.get("avg_sentiment"),
                    delta_vs_prior: 0,
                })
                .collect())
        })
        .await
    }

    /// Topics with at least one annotated feedback in the window.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn active_topic_count(&self, range: DateRange) -> Result<i64> {
        const SQL: &str = r"
            SELECT COUNT(DISTINCT a.topic_id)
            FROM annotations a
            JOIN feedback f ON f.id = a.feedback_id
            WHERE a.topic_id IS NOT NULL
              AND f.created_at::date BETWEEN $1 AND $2
        ";
        with_retry("analytics.active_topic_count", || async {
            let rows = self.run(SQL, &[&range.start, &range.end]).await?;
            Ok(rows[0].get(0))
        })
        .await
    }

    /// Example feedback joined with annotations, newest first.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn examples(&self, params: ExamplesParams) -> Result<Vec<ExampleRow>> {
        const SQL: &str = r"
            SELECT f.id, f.body, f.source, f.customer_id, f.metadata, f.created_at,
                   a.sentiment, a.topic_id
            FROM feedback f
            LEFT JOIN annotations a ON a.feedback_id = f.id
            WHERE ($1::bigint IS NULL OR a.topic_id = $1)
              AND ($2::smallint IS NULL OR a.sentiment = $2)
            ORDER BY f.created_at DESC
            LIMIT $3
        ";
        with_retry("analytics.examples", || async {
            let sentiment = params.sentiment.map(|s| s.as_i16());
            let limit = i64::from(params.limit);
            let rows = self.run(SQL, &[&params.topic_id, &sentiment, &limit]).await?;
            Ok(rows
                .iter()
                .map(|r| ExampleRow {
                    id:          r.get("id"),
                    body:        r.get("body"),
                    source:      r.get("source"),
                    customer_id: r.get("customer_id"),
                    sentiment:   r.get("sentiment"),
                    topic_id:    r.get("topic_id"),
                    metadata:    r.get("metadata"),
                    created_at:  r.get("created_at"),
                })
                .collect())
        })
        .await
    }

    /// Feedback under one topic, paginated (admin surface).
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn feedback_for_topic(
        &self,
        topic_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<Page<ExampleRow>> {
        const SQL: &str = r"
            SELECT f.id, f.body, f.source, f.customer_id, f.metadata, f.created_at,
                   a.sentiment, a.topic_id
            FROM feedback f
            JOIN annotations a ON a.feedback_id = f.id
            WHERE a.topic_id = $1
            ORDER BY f.created_at DESC
            LIMIT $2 OFFSET $3
        ";
        const COUNT_SQL: &str = "SELECT COUNT(*) FROM annotations WHERE topic_id = $1";
        with_retry("analytics.feedback_for_topic", || async {
            let limit = i64::from(page_size);
            let offset = i64::from(page - 1) * limit;
            let rows = self.run(SQL, &[&topic_id, &limit, &offset]).await?;
            let total: i64 = self.run(COUNT_SQL, &[&topic_id]).await?[0].get(0);
            Ok(Page {
                items: rows
                    .iter()
                    .map(|r| ExampleRow {
                        id:          r.get("id"),
                        body:        r.get("body"),
                        source:      r.get("source"),
                        customer_id: r.get("customer_id"),
                        sentiment:   r.get("sentiment"),
                        topic_id:    r.get("topic_id"),
                        metadata:    r.get("metadata"),
                        created_at:  r.get("created_at"),
                    })
                    .collect(),
                page,
                page_size,
                total: total.max(0) as u64,
            })
        })
        .await
    }
}

fn row_to_daily(row: &Row) -> DailyAggregateRow {
    DailyAggregateRow {
        day:               row.get("day"),
        total_feedback:    row.get("total_feedback"),
        positive_feedback: row.get("positive_feedback"),
        negative_feedback: row.get("negative_feedback"),
        neutral_feedback:  row.get("neutral_feedback"),
        avg_sentiment:     row.get("avg_sentiment"),
        unique_customers:  row.get("unique_customers"),
        top_sources:       row.get("top_sources"),
    }
}

fn percentage(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        assert!((percentage(1, 4) - 25.0).abs() < f64::EPSILON);
        assert!((percentage(0, 10)).abs() < f64::EPSILON);
        assert!((percentage(3, 0)).abs() < f64::EPSILON);
    }
}
