//! The bounded agent loop.
//!
//! The loop is a state machine, not an open-ended conversation: each round
//! the model either emits a tool call (executed, output appended to the
//! transcript) or a final answer. It terminates on a parsed answer, on
//! tool-budget exhaustion, or on the 30-second wall clock. Grounding
//! violations trigger exactly one regeneration before the answer is
//! returned with a warning.

use std::sync::Arc;
use std::time::Duration;

use opine_error::{OpineError, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::citations::GroundingContext;
use crate::llm::{LlmClient, LlmMessage};
use crate::tools::{QaToolbox, ToolCall};
use crate::{QaFilters, QaResponse};

/// Maximum question length in characters.
pub const MAX_QUESTION_CHARS: usize = 1_000;

/// Estimated-token ceiling for the assembled prompt.
pub const MAX_PROMPT_TOKENS: usize = 4_000;

/// Tool rounds before the loop gives up.
pub const MAX_TOOL_ROUNDS: usize = 6;

/// Wall-clock budget for one request.
pub const QA_TIMEOUT: Duration = Duration::from_secs(30);

const SYSTEM_PROMPT: &str = r#"You answer questions about customer feedback using tools. Respond with exactly one JSON object per turn, nothing else.

To call a tool:
  {"tool": "analytics-sql", "input": {"rollup": "summary", "start_date": null, "end_date": null}}
  {"tool": "vector-examples", "input": {"topic_id": null, "sentiment": -1, "k": 5}}
  {"tool": "report-writer", "input": {"metrics": {...}, "highlights": []}}
Available rollups: summary, topics, sentiment-trends, sources, toxicity.

To answer:
  {"answer": "..."}

Rules: quote customer feedback only verbatim from vector-examples output, in double quotes. State numbers only from tool output. Honour the caller's filters in every tool call."#;

/// One QA request.
#[derive(Debug, Clone, Deserialize)]
pub struct QaRequest {
    /// The free-text question.
    pub question: String,
    /// Optional filter bundle.
    #[serde(default)]
    pub filters: Option<QaFilters>,
}

/// What the model said this round.
enum ModelTurn {
    Tool(ToolCall),
    Answer(String),
    /// Unparseable output, kept as answer text.
    Raw(String),
}

/// The grounded QA facade.
pub struct QaAgent {
    llm: Arc<dyn LlmClient>,
    tools: Arc<dyn QaToolbox>,
}

impl QaAgent {
    /// Assemble the agent.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<dyn QaToolbox>) -> Self {
        Self { llm, tools }
    }

    /// Answer one question within the request budget.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::TooLarge` for oversized questions,
    /// `OpineError::Timeout` at the 30-second wall clock, and downstream
    /// errors from tools or the model endpoint.
    pub async fn ask(&self, request: QaRequest) -> Result<QaResponse> {
        if request.question.trim().is_empty() {
            return Err(OpineError::validation_field("question must not be empty", "question"));
        }
        if request.question.chars().count() > MAX_QUESTION_CHARS {
            return Err(OpineError::too_large(format!(
                "question exceeds {MAX_QUESTION_CHARS} characters"
            )));
        }

        tokio::time::timeout(QA_TIMEOUT, self.run(request))
            .await
            .map_err(|_| OpineError::timeout(QA_TIMEOUT.as_millis() as u64, "qa request"))?
    }

    async fn run(&self, request: QaRequest) -> Result<QaResponse> {
        let filters = request.filters.unwrap_or_default();
        let prefix = filters.prompt_prefix();

        let mut transcript = vec![
            LlmMessage::system(SYSTEM_PROMPT),
            LlmMessage::user(format!("{prefix}{}", request.question)),
        ];
        let estimated_tokens = transcript
            .iter()
            .map(|m| m.content.chars().count())
            .sum::<usize>()
            / 4;
        if estimated_tokens > MAX_PROMPT_TOKENS {
            return Err(OpineError::too_large(format!(
                "prompt estimate {estimated_tokens} tokens exceeds {MAX_PROMPT_TOKENS}"
            )));
        }

        let mut grounding = GroundingContext::default();
        let mut regenerated = false;

        for round in 0..=MAX_TOOL_ROUNDS {
            let raw = self.llm.complete(&transcript).await?;
            transcript.push(LlmMessage::assistant(raw.clone()));

            match parse_turn(&raw) {
                ModelTurn::Tool(call) => {
                    if round == MAX_TOOL_ROUNDS {
                        // Budget exhausted mid-plan; answer with what we
                        // have rather than loop forever.
                        return Ok(QaResponse {
                            answer:    "I could not assemble a grounded answer within the tool budget.".to_string(),
                            citations: vec![],
                            warning:   Some("tool budget exhausted".to_string()),
                        });
                    }
                    let output = match self.tools.execute(&call).await {
                        Ok(output) => output,
                        Err(e) if e.is_client_error() => {
                            // Bad tool input: tell the model and continue.
                            transcript.push(LlmMessage::user(format!("tool error: {e}")));
                            continue;
                        },
                        Err(e) => return Err(e),
                    };
                    grounding.absorb(&output);
                    transcript.push(LlmMessage::user(format!(
                        "{} result: {}",
                        output.tool, output.payload
                    )));
                },
                ModelTurn::Answer(answer) | ModelTurn::Raw(answer) => {
                    let report = grounding.check(&answer);
                    if report.passed() {
                        info!(citations = report.citations.len(), "qa answer grounded");
                        return Ok(QaResponse {
                            answer,
                            citations: report.citations,
                            warning: None,
                        });
                    }
                    if regenerated {
                        warn!(violations = ?report.violations, "qa answer kept with warning");
                        return Ok(QaResponse {
                            answer,
                            citations: report.citations,
                            warning: Some(report.violations.join("; ")),
                        });
                    }
                    regenerated = true;
                    transcript.push(LlmMessage::user(format!(
                        "Your answer violated grounding rules: {}. Rewrite it using only quotes and numbers present in tool output.",
                        report.violations.join("; ")
                    )));
                },
            }
        }

        Ok(QaResponse {
            answer:    "I could not assemble a grounded answer within the tool budget.".to_string(),
            citations: vec![],
            warning:   Some("tool budget exhausted".to_string()),
        })
    }
}

fn parse_turn(raw: &str) -> ModelTurn {
    let trimmed = raw.trim();
    // Models sometimes wrap JSON in code fences.
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map_or(trimmed, str::trim);

    if let Ok(call) = serde_json::from_str::<ToolCall>(unfenced) {
        return ModelTurn::Tool(call);
    }
    if let Ok(value) = serde_json::from_str::<Value>(unfenced) {
        if let Some(answer) = value.get("answer").and_then(Value::as_str) {
            return ModelTurn::Answer(answer.to_string());
        }
    }
    ModelTurn::Raw(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::tools::ToolOutput;
    use parking_lot::Mutex;
    use serde_json::json;
    use uuid::Uuid;

    /// LLM stub that replays a script.
    struct ScriptedLlm {
        responses: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().map(|s| (*s).to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _messages: &[LlmMessage]) -> Result<String> {
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                Ok(r#"{"answer": "no further output"}"#.to_string())
            } else {
                Ok(responses.remove(0))
            }
        }
    }

    /// Toolbox stub serving one canned example.
    struct StubToolbox {
        body: String,
        calls: Mutex<Vec<String>>,
    }

    impl StubToolbox {
        fn new(body: &str) -> Arc<Self> {
            Arc::new(Self {
                body:  body.to_string(),
                calls: Mutex::new(vec![]),
            })
        }
    }

    #[async_trait]
    impl QaToolbox for StubToolbox {
        async fn execute(&self, call: &ToolCall) -> Result<ToolOutput> {
            self.calls.lock().push(call.name().to_string());
            Ok(ToolOutput {
                tool:    call.name().to_string(),
                payload: json!({
                    "examples": [{
                        "feedback_id": Uuid::new_v4().to_string(),
                        "topic_id": 2,
                        "body": self.body,
                    }],
                    "total_feedback": 42,
                }),
            })
        }
    }

    fn request(question: &str) -> QaRequest {
        QaRequest {
            question: question.to_string(),
            filters:  Some(QaFilters {
                sentiment: Some(-1),
                ..QaFilters::default()
            }),
        }
    }

    #[tokio::test]
    async fn test_tool_then_grounded_answer() {
        let llm = ScriptedLlm::new(&[
            r#"{"tool": "vector-examples", "input": {"sentiment": -1, "k": 5, "topic_id": null}}"#,
            r#"{"answer": "A customer said \"the checkout flow is painfully slow\" out of 42 responses."}"#,
        ]);
        let tools = StubToolbox::new("I think the checkout flow is painfully slow on mobile");
        let agent = QaAgent::new(llm, Arc::clone(&tools) as Arc<dyn QaToolbox>);

        let response = agent
            .ask(request("Show me examples of negative feedback"))
            .await
            .expect("response");

        assert!(response.warning.is_none());
        assert_eq!(response.citations.len(), 1);
        assert_eq!(tools.calls.lock().as_slice(), ["vector-examples"]);
    }

    #[tokio::test]
    async fn test_ungrounded_answer_regenerates_then_warns() {
        let llm = ScriptedLlm::new(&[
            r#"{"answer": "We received 9999 complaints."}"#,
            r#"{"answer": "We received 9999 complaints, definitely."}"#,
        ]);
        let tools = StubToolbox::new("unused");
        let agent = QaAgent::new(llm, tools);

        let response = agent.ask(request("How many complaints?")).await.expect("response");

        assert!(response.warning.is_some());
        assert!(response.warning.expect("warning").contains("ungrounded numeric claim"));
    }

    #[tokio::test]
    async fn test_question_length_cap() {
        let llm = ScriptedLlm::new(&[]);
        let tools = StubToolbox::new("unused");
        let agent = QaAgent::new(llm, tools);

        let err = agent
            .ask(request(&"x".repeat(MAX_QUESTION_CHARS + 1)))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 413);
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let llm = ScriptedLlm::new(&[]);
        let tools = StubToolbox::new("unused");
        let agent = QaAgent::new(llm, tools);

        assert!(agent.ask(request("   ")).await.is_err());
    }

    #[tokio::test]
    async fn test_tool_budget_exhaustion() {
        let call = r#"{"tool": "vector-examples", "input": {"sentiment": null, "k": 1, "topic_id": null}}"#;
        let responses: Vec<&str> = std::iter::repeat(call).take(MAX_TOOL_ROUNDS + 2).collect();
        let llm = ScriptedLlm::new(&responses);
        let tools = StubToolbox::new("body text here");
        let agent = QaAgent::new(llm, tools);

        let response = agent.ask(request("Loop forever")).await.expect("response");
        assert_eq!(response.warning.as_deref(), Some("tool budget exhausted"));
    }

    #[tokio::test]
    async fn test_unfenced_and_fenced_parse() {
        match parse_turn("```json\n{\"answer\": \"plain\"}\n```") {
            ModelTurn::Answer(answer) => assert_eq!(answer, "plain"),
            _ => panic!("expected answer"),
        }
        match parse_turn("free text, no JSON") {
            ModelTurn::Raw(text) => assert_eq!(text, "free text, no JSON"),
            _ => panic!("expected raw"),
        }
    }
}
