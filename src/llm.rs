//! LLM client abstraction used for intent resolution.
//!
//! [`LlmClient`] is the single seam between the crate and the reasoning
//! backend: one prompt in, one text response out. No streaming, no
//! multi-turn state, no retries. The production implementation is
//! [`AnthropicClient`]; tests use [`MockLlmClient`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when calling the reasoning backend.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The ANTHROPIC_API_KEY environment variable is not set.
    #[error("ANTHROPIC_API_KEY environment variable not set")]
    MissingApiKey,

    /// HTTP or network error occurred.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Failed to parse the API response envelope.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Model returned no text content.
    #[error("Model returned empty response")]
    EmptyResponse,
}

/// The result of a successful completion request.
#[derive(Debug, Clone)]
pub struct Completion {
    /// The generated text from the model.
    pub text: String,
}

/// Generic interface for LLM backends.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion given a system prompt and a user message.
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError>;
}

// ============================================================================
// Anthropic API Implementation
// ============================================================================

/// Default model used when none is configured.
const DEFAULT_MODEL: &str = "claude-haiku-4-5";

/// Client for the Anthropic Messages API.
pub struct AnthropicClient {
    api_key: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: String,
}

impl AnthropicClient {
    /// Create a client by reading `ANTHROPIC_API_KEY` from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::MissingApiKey`] if the variable is not set.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| LlmError::MissingApiKey)?;
        Ok(Self::new(api_key))
    }

    /// Create a client with an explicit API key and the default model.
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 2048,
            client: reqwest::Client::new(),
        }
    }

    /// Override the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError> {
        let request_body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: system.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: user.to_string(),
            }],
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let text = api_response
            .content
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse)?
            .text;

        Ok(Completion { text })
    }
}

// ============================================================================
// Mock Implementation (Test Only)
// ============================================================================

/// Mock LLM client for testing. Returns pre-programmed responses in FIFO order.
#[cfg(test)]
pub struct MockLlmClient {
    pub responses: std::sync::Mutex<std::collections::VecDeque<String>>,
}

#[cfg(test)]
impl MockLlmClient {
    /// Create a mock with a sequence of responses.
    ///
    /// # Panics
    ///
    /// Panics if [`complete`](LlmClient::complete) is called more times than
    /// there are responses.
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _system: &str, _user: &str) -> Result<Completion, LlmError> {
        let text = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("MockLlmClient: no more responses available");

        Ok(Completion { text })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_missing_key() {
        // SAFETY: This test runs serially and no other thread reads
        // ANTHROPIC_API_KEY concurrently.
        unsafe { std::env::remove_var("ANTHROPIC_API_KEY") };

        let result = AnthropicClient::from_env();
        assert!(matches!(result, Err(LlmError::MissingApiKey)));
    }

    #[tokio::test]
    async fn test_mock_returns_responses_in_order() {
        let mock = MockLlmClient::new(vec!["first".to_string(), "second".to_string()]);

        let completion = mock.complete("sys", "user").await.unwrap();
        assert_eq!(completion.text, "first");

        let completion = mock.complete("sys", "user").await.unwrap();
        assert_eq!(completion.text, "second");
    }
}
