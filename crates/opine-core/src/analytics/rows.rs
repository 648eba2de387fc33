//! Concrete row types, one per rollup shape, plus the shared page envelope.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Common envelope for paginated responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Rows for this page.
    pub items: Vec<T>,
    /// 1-based page number.
    pub page: u32,
    /// Requested page size.
    pub page_size: u32,
    /// Total matching rows.
    pub total: u64,
}

/// One point of the sentiment-trend series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentTrendPoint {
    /// Period label (truncated date).
    pub period: NaiveDate,
    /// Positive count.
    pub positive_count: i64,
    /// Negative count.
    pub negative_count: i64,
    /// Neutral count.
    pub neutral_count: i64,
}

/// One point of the volume-trend series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumePoint {
    /// Period label (truncated date).
    pub period: NaiveDate,
    /// Total feedback in the period.
    pub total: i64,
}

/// One row of the daily materialised view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyAggregateRow {
    /// Aggregated day.
    pub day: NaiveDate,
    /// Total feedback.
    pub total_feedback: i64,
    /// Positive feedback.
    pub positive_feedback: i64,
    /// Negative feedback.
    pub negative_feedback: i64,
    /// Neutral feedback.
    pub neutral_feedback: i64,
    /// Mean sentiment over annotated rows, if any were annotated.
    pub avg_sentiment: Option<f64>,
    /// Distinct customers.
    pub unique_customers: i64,
    /// Highest-volume sources, most active first.
    pub top_sources: Vec<String>,
}

/// Per-customer statistics row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerStatsRow {
    /// Customer identifier.
    pub customer_id: String,
    /// Feedback count in the window.
    pub feedback_count: i64,
    /// Mean sentiment over annotated rows.
    pub avg_sentiment: Option<f64>,
}

/// Per-source statistics row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStatsRow {
    /// Source tag.
    pub source: String,
    /// Feedback count in the window.
    pub feedback_count: i64,
    /// Positive count.
    pub positive_count: i64,
    /// Negative count.
    pub negative_count: i64,
    /// Neutral count.
    pub neutral_count: i64,
}

/// Toxicity rollup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToxicityStats {
    /// Rows scoring at or above the threshold.
    pub above_threshold: i64,
    /// Mean toxicity over scored rows.
    pub mean_toxicity: Option<f64>,
    /// Threshold the count was taken against.
    pub threshold: f64,
}

/// Compact summary response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    /// Total feedback in the window.
    pub total_feedback: i64,
    /// Share of annotated feedback classified negative, in percent.
    pub negative_percentage: f64,
    /// Daily series over the trailing fourteen days.
    pub series: Vec<VolumePoint>,
}

/// One row of the topics rollup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRow {
    /// Topic identifier.
    pub id: i64,
    /// Topic label.
    pub label: String,
    /// Feedback count in the window.
    pub feedback_count: i64,
    /// Mean sentiment in the window.
    pub avg_sentiment: Option<f64>,
    /// Count delta versus the equal-length prior window.
    pub delta_vs_prior: i64,
}

/// One example feedback row joined with its annotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleRow {
    /// Feedback identifier.
    pub id: Uuid,
    /// Feedback body.
    pub body: String,
    /// Source tag.
    pub source: String,
    /// Customer identifier, if any.
    pub customer_id: Option<String>,
    /// Sentiment class, if annotated.
    pub sentiment: Option<i16>,
    /// Topic, if clustered.
    pub topic_id: Option<i64>,
    /// Metadata as stored.
    pub metadata: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Dashboard composite response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSummary {
    /// Total feedback in the window.
    pub total_feedback: i64,
    /// Share of annotated feedback classified negative, in percent.
    pub negative_percentage: f64,
    /// Topics with at least one feedback in the window.
    pub topic_count: i64,
    /// Daily series over the trailing fourteen days.
    pub series: Vec<VolumePoint>,
    /// Most negative topics, worst first.
    pub top_negative_topics: Vec<TopicRow>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_envelope_serialization() {
        let page = Page {
            items:     vec![VolumePoint {
                period: "2024-01-01".parse().expect("date"),
                total:  12,
            }],
            page:      1,
            page_size: 30,
            total:     1,
        };
        let json = serde_json::to_string(&page).expect("serialize");
        assert!(json.contains("\"page\":1"));
        assert!(json.contains("\"total\":1"));
    }

    #[test]
    fn test_summary_roundtrip() {
        let summary = SummaryResponse {
            total_feedback:      42,
            negative_percentage: 16.7,
            series:              vec![],
        };
        let json = serde_json::to_string(&summary).expect("serialize");
        let back: SummaryResponse = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.total_feedback, 42);
    }
}
