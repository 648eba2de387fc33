//! Grounded question-answering facade.
//!
//! A free-text question is routed through a small finite tool set
//! (`analytics-sql`, `vector-examples`, `report-writer`) by a bounded
//! agent loop. The facade, not the model, owns the grounding invariants:
//! quotes must trace to tool-returned feedback bodies and numeric claims
//! must appear in tool output, or the answer is regenerated once and then
//! returned with a warning.

pub mod agent;
pub mod citations;
pub mod llm;
pub mod suggestions;
pub mod tools;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use agent::{QaAgent, QaRequest};
pub use llm::{HttpLlmClient, LlmClient, LlmMessage};
pub use tools::{LiveToolbox, QaToolbox, ToolCall, ToolOutput};

/// One citation attached to an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// The feedback the claim traces to.
    pub feedback_id: Uuid,
    /// The feedback's topic at answer time, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<i64>,
}

/// The facade's response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaResponse {
    /// Answer text.
    pub answer: String,
    /// Citations for quoted feedback.
    pub citations: Vec<Citation>,
    /// Set when a grounding violation survived regeneration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Caller-supplied filter bundle, rendered verbatim into the prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaFilters {
    /// Inclusive start date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<chrono::NaiveDate>,
    /// Inclusive end date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<chrono::NaiveDate>,
    /// Sentiment class restriction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<i16>,
    /// Topic restriction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_ids: Option<Vec<i64>>,
    /// Source restriction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Customer restriction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    /// Language restriction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl QaFilters {
    /// Render the filters as the descriptive prompt prefix.
    ///
    /// Values appear verbatim; the agent is instructed it may not ignore
    /// them.
    #[must_use]
    pub fn prompt_prefix(&self) -> String {
        let mut parts = Vec::new();
        if let Some(start) = self.start_date {
            parts.push(format!("start_date={start}"));
        }
        if let Some(end) = self.end_date {
            parts.push(format!("end_date={end}"));
        }
        if let Some(sentiment) = self.sentiment {
            parts.push(format!("sentiment={sentiment}"));
        }
        if let Some(topic_ids) = &self.topic_ids {
            let ids: Vec<String> = topic_ids.iter().map(ToString::to_string).collect();
            parts.push(format!("topic_ids={}", ids.join(",")));
        }
        if let Some(source) = &self.source {
            parts.push(format!("source={source}"));
        }
        if let Some(customer_id) = &self.customer_id {
            parts.push(format!("customer_id={customer_id}"));
        }
        if let Some(language) = &self.language {
            parts.push(format!("language={language}"));
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!(
                "The caller restricted this question to: {}. These filters are binding; every tool call must honour them.\n\n",
                parts.join(", ")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filters_render_nothing() {
        assert_eq!(QaFilters::default().prompt_prefix(), "");
    }

    #[test]
    fn test_filters_render_verbatim() {
        let filters = QaFilters {
            sentiment: Some(-1),
            source: Some("app-store".to_string()),
            topic_ids: Some(vec![3, 9]),
            ..QaFilters::default()
        };
        let prefix = filters.prompt_prefix();
        assert!(prefix.contains("sentiment=-1"));
        assert!(prefix.contains("source=app-store"));
        assert!(prefix.contains("topic_ids=3,9"));
        assert!(prefix.contains("binding"));
    }
}
