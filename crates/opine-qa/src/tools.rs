//! The facade's tool set: a small finite variant set with typed inputs.
//!
//! Anything outside these variants fails to parse, which is the whitelist:
//! the model cannot reach arbitrary SQL or arbitrary endpoints through the
//! agent loop.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use opine_analytics::AnalyticsEngine;
use opine_core::analytics::{
    DateRange, ExamplesParams, GroupBy, SummaryParams, TopicsParams, ToxicityParams, TrendParams,
};
use opine_core::Sentiment;
use opine_db::feedback::FeedbackRepo;
use opine_error::{OpineError, Result};
use opine_vector::{VectorFilter, VectorIndex};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

/// Maximum examples the vector tool may return.
pub const MAX_VECTOR_EXAMPLES: usize = 10;

/// Whitelisted analytics rollups the agent may query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "rollup", rename_all = "kebab-case")]
pub enum AnalyticsQuery {
    /// Compact summary for a window.
    Summary {
        /// Inclusive start date.
        start_date: Option<NaiveDate>,
        /// Inclusive end date.
        end_date: Option<NaiveDate>,
    },
    /// Topic rollup for a window.
    Topics {
        /// Inclusive start date.
        start_date: Option<NaiveDate>,
        /// Inclusive end date.
        end_date: Option<NaiveDate>,
    },
    /// Sentiment trend for a window.
    SentimentTrends {
        /// Grouping granularity: day, week, or month.
        group_by: Option<String>,
        /// Inclusive start date.
        start_date: Option<NaiveDate>,
        /// Inclusive end date.
        end_date: Option<NaiveDate>,
    },
    /// Per-source statistics for a window.
    Sources {
        /// Inclusive start date.
        start_date: Option<NaiveDate>,
        /// Inclusive end date.
        end_date: Option<NaiveDate>,
    },
    /// Toxicity rollup for a window.
    Toxicity {
        /// Score threshold in [0, 1].
        threshold: Option<f64>,
        /// Inclusive start date.
        start_date: Option<NaiveDate>,
        /// Inclusive end date.
        end_date: Option<NaiveDate>,
    },
}

/// A parsed tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "tool", content = "input", rename_all = "kebab-case")]
pub enum ToolCall {
    /// Parameterised read-only rollup.
    AnalyticsSql(AnalyticsQuery),
    /// Semantic example lookup.
    VectorExamples {
        /// Restrict to one topic.
        topic_id: Option<i64>,
        /// Restrict to one sentiment class.
        sentiment: Option<i16>,
        /// Number of examples, clamped to [`MAX_VECTOR_EXAMPLES`].
        k: Option<usize>,
    },
    /// Render a structured weekly-summary report.
    ReportWriter {
        /// Report title.
        title: Option<String>,
        /// Metrics to include, as produced by earlier tool calls.
        metrics: Value,
        /// Free-text highlights.
        highlights: Option<Vec<String>>,
    },
}

impl ToolCall {
    /// Tool name for logs and tool-result framing.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AnalyticsSql(_) => "analytics-sql",
            Self::VectorExamples { .. } => "vector-examples",
            Self::ReportWriter { .. } => "report-writer",
        }
    }
}

/// A tool result fed back into the agent transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Which tool ran.
    pub tool: String,
    /// Tool result payload.
    pub payload: Value,
}

/// The tool surface the agent loop drives.
#[async_trait]
pub trait QaToolbox: Send + Sync {
    /// Execute one tool call.
    ///
    /// # Errors
    ///
    /// Returns validation errors for bad inputs; downstream failures
    /// degrade where the taxonomy allows (vector store down yields an
    /// empty example list with a warning marker).
    async fn execute(&self, call: &ToolCall) -> Result<ToolOutput>;
}

/// Production toolbox over the analytics engine, vector index, and
/// feedback repository.
pub struct LiveToolbox {
    engine: AnalyticsEngine,
    vector: Arc<dyn VectorIndex>,
    feedback: FeedbackRepo,
}

impl LiveToolbox {
    /// Assemble the toolbox.
    #[must_use]
    pub fn new(
        engine: AnalyticsEngine,
        vector: Arc<dyn VectorIndex>,
        feedback: FeedbackRepo,
    ) -> Self {
        Self {
            engine,
            vector,
            feedback,
        }
    }

    async fn run_analytics(&self, query: &AnalyticsQuery) -> Result<Value> {
        let today = AnalyticsEngine::today();
        let bytes = match query {
            AnalyticsQuery::Summary { start_date, end_date } => {
                let range = DateRange::resolve(*start_date, *end_date, today)?;
                self.engine.summary(SummaryParams { range }).await?
            },
            AnalyticsQuery::Topics { start_date, end_date } => {
                let range = DateRange::resolve(*start_date, *end_date, today)?;
                self.engine.topics(TopicsParams { range }).await?
            },
            AnalyticsQuery::SentimentTrends {
                group_by,
                start_date,
                end_date,
            } => {
                let range = DateRange::resolve(*start_date, *end_date, today)?;
                let group_by = GroupBy::parse(group_by.as_deref())?;
                self.engine
                    .sentiment_trends(TrendParams { group_by, range })
                    .await?
            },
            AnalyticsQuery::Sources { start_date, end_date } => {
                let range = DateRange::resolve(*start_date, *end_date, today)?;
                self.engine
                    .sources(opine_core::analytics::SourceStatsParams { range })
                    .await?
            },
            AnalyticsQuery::Toxicity {
                threshold,
                start_date,
                end_date,
            } => {
                let range = DateRange::resolve(*start_date, *end_date, today)?;
                let params = ToxicityParams::new(*threshold, range)?;
                self.engine.toxicity(params).await?
            },
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn run_vector_examples(
        &self,
        topic_id: Option<i64>,
        sentiment: Option<i16>,
        k: usize,
    ) -> Result<Value> {
        let filter = VectorFilter {
            topic_id,
            sentiment,
        };
        let hits = match self.vector.query(None, filter, k).await {
            Ok(hits) => hits,
            Err(e) => {
                // Vector store down: degrade to an empty example list.
                return Ok(json!({ "examples": [], "warning": e.to_string() }));
            },
        };

        let mut examples = Vec::with_capacity(hits.len());
        for hit in hits {
            if let Some(feedback) = self.feedback.get(hit.feedback_id).await? {
                examples.push(json!({
                    "feedback_id": feedback.id,
                    "snippet": snippet(&feedback.body),
                    "body": feedback.body,
                    "source": feedback.source,
                }));
            }
        }

        // Fallback when the vector index has no points yet (e.g. before
        // the first cluster run): recent examples straight from the store.
        if examples.is_empty() {
            let params = ExamplesParams::new(
                topic_id,
                sentiment.map(Sentiment::from_i16).transpose()?,
                Some(k as u32),
            )?;
            let bytes = self.engine.examples(params).await?;
            let rows: Vec<Value> = serde_json::from_slice(&bytes)?;
            for row in rows {
                examples.push(json!({
                    "feedback_id": row["id"],
                    "snippet": row["body"].as_str().map(snippet).unwrap_or_default(),
                    "body": row["body"],
                    "source": row["source"],
                    "topic_id": row["topic_id"],
                }));
            }
        }

        Ok(json!({ "examples": examples }))
    }
}

#[async_trait]
impl QaToolbox for LiveToolbox {
    async fn execute(&self, call: &ToolCall) -> Result<ToolOutput> {
        info!(tool = call.name(), "qa tool invoked");
        let payload = match call {
            ToolCall::AnalyticsSql(query) => self.run_analytics(query).await?,
            ToolCall::VectorExamples {
                topic_id,
                sentiment,
                k,
            } => {
                let k = k.unwrap_or(5).clamp(1, MAX_VECTOR_EXAMPLES);
                self.run_vector_examples(*topic_id, *sentiment, k).await?
            },
            ToolCall::ReportWriter {
                title,
                metrics,
                highlights,
            } => {
                let report = render_report(
                    title.as_deref().unwrap_or("Weekly Feedback Summary"),
                    metrics,
                    highlights.as_deref().unwrap_or(&[]),
                );
                json!({ "report": report })
            },
        };
        Ok(ToolOutput {
            tool: call.name().to_string(),
            payload,
        })
    }
}

/// First ~160 characters of a body, on a char boundary.
fn snippet(body: &str) -> String {
    body.chars().take(160).collect()
}

/// Render the weekly-summary report from supplied metrics.
#[must_use]
pub fn render_report(title: &str, metrics: &Value, highlights: &[String]) -> String {
    let mut out = format!("# {title}\n\n## Metrics\n");
    if let Value::Object(map) = metrics {
        for (key, value) in map {
            out.push_str(&format!("- {key}: {value}\n"));
        }
    } else if !metrics.is_null() {
        out.push_str(&format!("- {metrics}\n"));
    }
    if !highlights.is_empty() {
        out.push_str("\n## Highlights\n");
        for highlight in highlights {
            out.push_str(&format!("- {highlight}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_parses_analytics() {
        let call: ToolCall = serde_json::from_str(
            r#"{"tool":"analytics-sql","input":{"rollup":"summary","start_date":"2024-01-01","end_date":"2024-01-14"}}"#,
        )
        .expect("parse");
        assert_eq!(call.name(), "analytics-sql");
    }

    #[test]
    fn test_tool_call_rejects_unknown_tool() {
        let result: std::result::Result<ToolCall, _> =
            serde_json::from_str(r#"{"tool":"raw-sql","input":{"query":"DROP TABLE feedback"}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_tool_call_rejects_unknown_rollup() {
        let result: std::result::Result<ToolCall, _> = serde_json::from_str(
            r#"{"tool":"analytics-sql","input":{"rollup":"raw","sql":"SELECT 1"}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_vector_examples_parse() {
        let call: ToolCall = serde_json::from_str(
            r#"{"tool":"vector-examples","input":{"topic_id":3,"sentiment":-1,"k":5}}"#,
        )
        .expect("parse");
        assert_eq!(call, ToolCall::VectorExamples {
            topic_id:  Some(3),
            sentiment: Some(-1),
            k:         Some(5),
        });
    }

    #[test]
    fn test_render_report() {
        let report = render_report(
            "Week 12",
            &json!({"total_feedback": 120, "negative_percentage": 22.5}),
            &["Checkout complaints doubled".to_string()],
        );
        assert!(report.starts_with("# Week 12"));
        assert!(report.contains("- total_feedback: 120"));
        assert!(report.contains("Checkout complaints doubled"));
    }

    #[test]
    fn test_snippet_char_boundary() {
        let body = "é".repeat(200);
        let s = snippet(&body);
        assert_eq!(s.chars().count(), 160);
    }
}
