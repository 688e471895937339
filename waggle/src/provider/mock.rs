//! Scripted provider for tests.
//!
//! Returns a queue of predefined results in order and records every request
//! it receives, so tests can assert on both sides of the exchange.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::LlmError;
use crate::message::ToolCall;

use super::{ChatRequest, ChatResponse, Provider};

type Scripted = Result<ChatResponse, LlmError>;

/// A provider that replays a scripted sequence of results.
///
/// When the script runs out, further calls return a plain text response, so
/// loops under test always terminate.
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    script: Arc<Mutex<Vec<Scripted>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockProvider {
    /// An empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a content-only assistant response.
    #[must_use]
    pub fn text(self, content: impl Into<String>) -> Self {
        self.push(Ok(
            ChatResponse::from_text(content, "mock-model").with_usage(10, 5)
        ));
        self
    }

    /// Queue a content-only response with explicit token usage.
    #[must_use]
    pub fn text_with_usage(self, content: impl Into<String>, input: u64, output: u64) -> Self {
        self.push(Ok(
            ChatResponse::from_text(content, "mock-model").with_usage(input, output)
        ));
        self
    }

    /// Queue an assistant turn requesting the given tool calls.
    #[must_use]
    pub fn tool_calls(self, calls: Vec<(&str, &str, Value)>) -> Self {
        let tool_calls = calls
            .into_iter()
            .map(|(id, name, arguments)| ToolCall::new(id, name, arguments))
            .collect();
        self.push(Ok(ChatResponse {
            content: None,
            tool_calls,
            input_tokens: 20,
            output_tokens: 10,
            cached_tokens: 0,
            model_id: "mock-model".into(),
        }));
        self
    }

    /// Queue an HTTP error.
    #[must_use]
    pub fn http_error(self, status: u16, message: impl Into<String>) -> Self {
        self.push(Err(LlmError::Http {
            status,
            message: message.into(),
        }));
        self
    }

    /// Queue an arbitrary result.
    pub fn push(&self, result: Scripted) {
        if let Ok(mut script) = self.script.lock() {
            script.push(result);
        }
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Number of calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|requests| requests.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| {
                if script.is_empty() {
                    None
                } else {
                    Some(script.remove(0))
                }
            });
        next.unwrap_or_else(|| {
            Ok(ChatResponse::from_text("(script exhausted)", "mock-model").with_usage(1, 1))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_replays_in_order() {
        let provider = MockProvider::new().text("first").http_error(500, "boom");
        let request = ChatRequest {
            model: "mock-model".into(),
            messages: vec![],
            tools: vec![],
            parameters: crate::provider::SamplingParams::default(),
        };

        let first = provider.chat(&request).await.expect("first");
        assert_eq!(first.content.expect("content").text(), "first");

        let second = provider.chat(&request).await.unwrap_err();
        assert_eq!(second.status(), Some(500));

        let third = provider.chat(&request).await.expect("fallback");
        assert_eq!(third.content.expect("content").text(), "(script exhausted)");
        assert_eq!(provider.call_count(), 3);
    }
}
