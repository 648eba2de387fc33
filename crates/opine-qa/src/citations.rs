//! Grounding checks: citations for quotes, tolerance matching for
//! numbers.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

use crate::{Citation, ToolOutput};

/// Minimum quoted-fragment length considered a quote worth grounding.
const MIN_QUOTE_CHARS: usize = 10;

/// Relative tolerance for numeric grounding.
const NUMERIC_TOLERANCE: f64 = 0.01;

/// Everything the tools surfaced during one request, indexed for
/// grounding checks.
#[derive(Debug, Default)]
pub struct GroundingContext {
    /// (feedback id, topic id, body) triples from example tools.
    bodies: Vec<(Uuid, Option<i64>, String)>,
    /// Every numeric value observed in any tool payload.
    numbers: Vec<f64>,
}

impl GroundingContext {
    /// Index one tool output.
    pub fn absorb(&mut self, output: &ToolOutput) {
        collect_numbers(&output.payload, &mut self.numbers);
        if let Some(examples) = output.payload.get("examples").and_then(Value::as_array) {
            for example in examples {
                let id = example
                    .get("feedback_id")
                    .and_then(Value::as_str)
                    .and_then(|s| Uuid::parse_str(s).ok());
                let body = example.get("body").and_then(Value::as_str);
                if let (Some(id), Some(body)) = (id, body) {
                    let topic_id = example.get("topic_id").and_then(Value::as_i64);
                    self.bodies.push((id, topic_id, body.to_string()));
                }
            }
        }
    }

    /// Whether any tool has returned feedback bodies yet.
    #[must_use]
    pub fn has_examples(&self) -> bool {
        !self.bodies.is_empty()
    }

    /// Check an answer against the grounding invariants.
    ///
    /// Citations are derived, not trusted: every quoted fragment that
    /// matches a tool-returned body yields that feedback's citation.
    /// A quoted fragment matching nothing, or a number absent from every
    /// tool result, is a violation.
    #[must_use]
    pub fn check(&self, answer: &str) -> GroundingReport {
        let mut citations = Vec::new();
        let mut violations = Vec::new();
        let mut cited: HashSet<Uuid> = HashSet::new();

        for fragment in quoted_fragments(answer) {
            let mut matched = false;
            for (id, topic_id, body) in &self.bodies {
                if body.contains(&fragment) {
                    matched = true;
                    if cited.insert(*id) {
                        citations.push(Citation {
                            feedback_id: *id,
                            topic_id:    *topic_id,
                        });
                    }
                }
            }
            if !matched {
                violations.push(format!("unattributed quote: \"{fragment}\""));
            }
        }

        for number in numeric_tokens(answer) {
            let grounded = self.numbers.iter().any(|candidate| {
                let tolerance = (candidate.abs() * NUMERIC_TOLERANCE).max(0.01);
                (candidate - number).abs() <= tolerance
            });
            if !grounded {
                violations.push(format!("ungrounded numeric claim: {number}"));
            }
        }

        GroundingReport {
            citations,
            violations,
        }
    }
}

/// Outcome of a grounding check.
#[derive(Debug)]
pub struct GroundingReport {
    /// Citations derived from matched quotes.
    pub citations: Vec<Citation>,
    /// Human-readable violations; empty means the answer passed.
    pub violations: Vec<String>,
}

impl GroundingReport {
    /// Whether the answer satisfied both invariants.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Fragments inside double quotes, long enough to be real quotes.
fn quoted_fragments(answer: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut rest = answer;
    while let Some(open) = rest.find('"') {
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('"') else {
            break;
        };
        let fragment = &after_open[..close];
        if fragment.chars().count() >= MIN_QUOTE_CHARS {
            fragments.push(fragment.to_string());
        }
        rest = &after_open[close + 1..];
    }
    fragments
}

fn number_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("static pattern"))
}

/// Numeric tokens in the answer. Years and small ordinals are not
/// exempted; the tolerance check is what keeps this strict.
fn numeric_tokens(answer: &str) -> Vec<f64> {
    number_regex()
        .find_iter(answer)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect()
}

fn collect_numbers(value: &Value, out: &mut Vec<f64>) {
    match value {
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                out.push(f);
            }
        },
        Value::String(s) => {
            out.extend(
                number_regex()
                    .find_iter(s)
                    .filter_map(|m| m.as_str().parse::<f64>().ok()),
            );
        },
        Value::Array(items) => {
            for item in items {
                collect_numbers(item, out);
            }
        },
        Value::Object(map) => {
            for item in map.values() {
                collect_numbers(item, out);
            }
        },
        Value::Bool(_) | Value::Null => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context_with_example(body: &str) -> (GroundingContext, Uuid) {
        let id = Uuid::new_v4();
        let mut ctx = GroundingContext::default();
        ctx.absorb(&ToolOutput {
            tool:    "vector-examples".to_string(),
            payload: json!({"examples": [{"feedback_id": id.to_string(), "topic_id": 4, "body": body}]}),
        });
        (ctx, id)
    }

    #[test]
    fn test_quote_matched_to_body_is_cited() {
        let (ctx, id) = context_with_example("The checkout flow is painfully slow on mobile");
        let report = ctx.check("One customer said \"checkout flow is painfully slow\" recently.");

        assert!(report.passed());
        assert_eq!(report.citations, vec![Citation {
            feedback_id: id,
            topic_id:    Some(4),
        }]);
    }

    #[test]
    fn test_unattributed_quote_is_violation() {
        let (ctx, _) = context_with_example("The checkout flow is painfully slow on mobile");
        let report = ctx.check("Someone wrote \"the app deleted my whole account\" yesterday.");

        assert!(!report.passed());
        assert!(report.violations[0].contains("unattributed quote"));
    }

    #[test]
    fn test_short_quotes_ignored() {
        let (ctx, _) = context_with_example("irrelevant");
        let report = ctx.check("The \"app\" is fine.");
        assert!(report.passed());
    }

    #[test]
    fn test_numbers_grounded_within_tolerance() {
        let mut ctx = GroundingContext::default();
        ctx.absorb(&ToolOutput {
            tool:    "analytics-sql".to_string(),
            payload: json!({"total_feedback": 1200, "negative_percentage": 22.48}),
        });

        // 22.5 is within 1% of 22.48.
        assert!(ctx.check("We saw 1200 items; 22.5 were negative.").passed());
        assert!(!ctx.check("We saw 9000 items this week.").passed());
    }

    #[test]
    fn test_numbers_in_strings_count_as_grounded() {
        let mut ctx = GroundingContext::default();
        ctx.absorb(&ToolOutput {
            tool:    "report-writer".to_string(),
            payload: json!({"report": "# Summary\n- total: 321\n"}),
        });
        assert!(ctx.check("The report covers 321 responses.").passed());
    }

    #[test]
    fn test_answer_without_quotes_or_numbers_passes() {
        let ctx = GroundingContext::default();
        assert!(ctx.check("Feedback skews positive overall.").passed());
    }
}
