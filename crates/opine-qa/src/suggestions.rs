//! Query suggestions for the chat surface.
//!
//! A static core plus one suggestion per active topic; the HTTP layer
//! caches the rendered payload through the cache adapter.

use serde::{Deserialize, Serialize};

/// Suggestions payload served to the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestions {
    /// Ready-to-ask questions.
    pub suggestions: Vec<String>,
}

const STATIC_SUGGESTIONS: &[&str] = &[
    "What are the main complaints this week?",
    "Show me examples of negative feedback",
    "How did sentiment trend over the last month?",
    "Which sources produce the most negative feedback?",
    "Summarize this week's feedback as a report",
];

/// Build the suggestions payload from the current topic labels.
#[must_use]
pub fn build_suggestions(topic_labels: &[String]) -> Suggestions {
    let mut suggestions: Vec<String> = STATIC_SUGGESTIONS
        .iter()
        .map(|s| (*s).to_string())
        .collect();
    for label in topic_labels.iter().take(5) {
        if label == "Unassigned" {
            continue;
        }
        suggestions.push(format!("What are customers saying about {label}?"));
    }
    Suggestions { suggestions }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_suggestions_present() {
        let payload = build_suggestions(&[]);
        assert_eq!(payload.suggestions.len(), STATIC_SUGGESTIONS.len());
    }

    #[test]
    fn test_topic_suggestions_appended() {
        let labels = vec!["Unassigned".to_string(), "Slow / Checkout".to_string()];
        let payload = build_suggestions(&labels);
        assert!(payload
            .suggestions
            .iter()
            .any(|s| s.contains("Slow / Checkout")));
        assert!(!payload.suggestions.iter().any(|s| s.contains("Unassigned")));
    }
}
