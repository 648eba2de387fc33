//! LLM client interface.
//!
//! The facade orchestrates prompts and validates outputs; the model itself
//! is an external collaborator behind this trait. The HTTP implementation
//! speaks the chat-completions shape.

use async_trait::async_trait;
use opine_error::{OpineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// One turn of the agent transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    /// `system`, `user`, or `assistant`.
    pub role: String,
    /// Message content.
    pub content: String,
}

impl LlmMessage {
    /// Build a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role:    "system".to_string(),
            content: content.into(),
        }
    }

    /// Build a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role:    "user".to_string(),
            content: content.into(),
        }
    }

    /// Build an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role:    "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Chat-completion client.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Produce the next assistant message for a transcript.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Unavailable` for endpoint failures.
    async fn complete(&self, messages: &[LlmMessage]) -> Result<String>;
}

/// HTTP chat-completions client.
#[derive(Clone)]
pub struct HttpLlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

impl HttpLlmClient {
    /// Create a client against the configured endpoint.
    #[must_use]
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: "gpt-4o-mini".to_string(),
        }
    }

    /// Override the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

fn llm_err(e: reqwest::Error) -> OpineError {
    OpineError::unavailable("llm-endpoint", e.to_string())
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, messages: &[LlmMessage]) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut request = self.client.post(&url).json(&json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.1,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response: CompletionResponse = request
            .send()
            .await
            .map_err(llm_err)?
            .error_for_status()
            .map_err(llm_err)?
            .json()
            .await
            .map_err(llm_err)?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| OpineError::unavailable("llm-endpoint", "empty choices"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        assert_eq!(LlmMessage::system("s").role, "system");
        assert_eq!(LlmMessage::user("u").role, "user");
        assert_eq!(LlmMessage::assistant("a").role, "assistant");
    }

    #[test]
    fn test_client_strips_trailing_slash() {
        let client = HttpLlmClient::new("http://llm:8000/", None);
        assert_eq!(client.base_url, "http://llm:8000");
    }
}
