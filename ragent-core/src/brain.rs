//! Completion capability abstraction and a scripted test double.
//!
//! Defines the `LlmProvider` trait for model-agnostic text completion, the
//! `Brain` wrapper that turns rendered prompts into provider requests, and a
//! scriptable `MockLlmProvider` for tests and offline runs.

use crate::error::LlmError;
use crate::prompts::RenderedPrompt;
use crate::types::{CompletionRequest, CompletionResponse, Message, TokenUsage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;

    /// Return the provider name used in logs.
    fn provider_name(&self) -> &str {
        "unknown"
    }
}

/// The Brain wraps an LLM provider and adds prompt-to-request construction
/// and usage tracking.
pub struct Brain {
    provider: Arc<dyn LlmProvider>,
    temperature: f32,
    total_usage: Mutex<TokenUsage>,
}

impl Brain {
    pub fn new(provider: Arc<dyn LlmProvider>, temperature: f32) -> Self {
        Self {
            provider,
            temperature,
            total_usage: Mutex::new(TokenUsage::default()),
        }
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Construct the message list for a rendered prompt: optional system
    /// instruction followed by the human input.
    pub fn build_messages(prompt: &RenderedPrompt) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &prompt.system {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(&prompt.human));
        messages
    }

    /// Send a rendered prompt to the provider and return the raw completion text.
    pub async fn complete(&self, prompt: &RenderedPrompt) -> Result<String, LlmError> {
        let request = CompletionRequest {
            messages: Self::build_messages(prompt),
            temperature: self.temperature,
            max_tokens: None,
            model: None,
        };

        debug!(
            provider = self.provider.provider_name(),
            model = self.provider.model_name(),
            "Sending completion request"
        );

        let response = self.provider.complete(request).await?;
        if let Ok(mut usage) = self.total_usage.lock() {
            usage.accumulate(&response.usage);
        }
        Ok(response.message.content)
    }

    /// Total token usage across every call made through this brain.
    pub fn total_usage(&self) -> TokenUsage {
        self.total_usage
            .lock()
            .map(|usage| *usage)
            .unwrap_or_default()
    }
}

/// A mock LLM provider for testing.
///
/// Returns queued responses (or errors) in order and records every request it
/// receives. When the queue is empty it answers with a fixed placeholder text.
pub struct MockLlmProvider {
    model: String,
    responses: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a MockLlmProvider that answers the given texts in order.
    pub fn with_responses<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let provider = Self::new();
        for text in texts {
            provider.queue_response(Self::text_response(text.as_ref()));
        }
        provider
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue an error to be returned by the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }

    /// All requests received so far, in call order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of `complete` calls received so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(MockLlmProvider::text_response(
                    "I'm a mock LLM. No queued responses available.",
                ))
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn prompt(system: Option<&str>, human: &str) -> RenderedPrompt {
        RenderedPrompt {
            name: "test",
            system: system.map(str::to_string),
            human: human.to_string(),
        }
    }

    #[test]
    fn test_build_messages_with_system() {
        let messages = Brain::build_messages(&prompt(Some("be brief"), "hello"));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "be brief");
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "hello");
    }

    #[test]
    fn test_build_messages_human_only() {
        let messages = Brain::build_messages(&prompt(None, "classify this"));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_brain_complete_returns_raw_text_and_tracks_usage() {
        let provider = Arc::new(MockLlmProvider::with_responses(["  SEARCH \n"]));
        let brain = Brain::new(provider.clone(), 0.0);

        let text = brain.complete(&prompt(None, "q")).await.unwrap();
        assert_eq!(text, "  SEARCH \n");
        assert_eq!(brain.total_usage().total(), 150);

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, 0.0);
    }

    #[tokio::test]
    async fn test_brain_propagates_provider_error() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_error(LlmError::AuthFailed {
            provider: "mock".into(),
        });
        let brain = Brain::new(provider, 0.0);

        let err = brain.complete(&prompt(None, "q")).await.unwrap_err();
        assert!(matches!(err, LlmError::AuthFailed { .. }));
        assert_eq!(brain.total_usage().total(), 0);
    }

    #[tokio::test]
    async fn test_mock_provider_falls_back_when_queue_empty() {
        let provider = MockLlmProvider::new();
        let response = provider
            .complete(CompletionRequest::default())
            .await
            .unwrap();
        assert!(response.text().contains("mock LLM"));
        assert_eq!(provider.call_count(), 1);
    }
}
