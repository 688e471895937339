//! LLM provider abstraction.
//!
//! A [`Provider`] turns a conversation plus tool definitions into one
//! assistant message. The wire protocol is provider-specific; the runtime
//! only sees [`ChatResponse`] values and [`crate::error::LlmError`] failures
//! classified by the retry layer.

mod http;
mod mock;
mod retry;

pub use http::{HttpProvider, HttpProviderConfig};
pub use mock::MockProvider;
pub use retry::{RetryPolicy, chat_with_retry};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LlmError;
use crate::message::{Content, Message, ToolCall};
use crate::tool::ToolDefinition;

/// Sampling parameters forwarded to the provider.
///
/// The chat loop applies model-class filtering before a request is built:
/// reasoning models get `reasoning_effort` and no `temperature`, everything
/// else gets plain sampling parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Completion token budget.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    /// Effort level for reasoning models (`low`, `medium`, `high`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    /// Additional provider-specific parameters, merged into the request body.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl SamplingParams {
    /// Parameters with only a temperature set.
    #[must_use]
    pub fn temperature(value: f64) -> Self {
        Self {
            temperature: Some(value),
            ..Self::default()
        }
    }
}

/// One request to a provider.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model id.
    pub model: String,
    /// Full conversation, oldest first.
    pub messages: Vec<Message>,
    /// Tools the model may call.
    pub tools: Vec<ToolDefinition>,
    /// Sampling parameters, already model-class filtered.
    pub parameters: SamplingParams,
}

/// The assistant message a provider produced, plus usage accounting.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Text content; absent for pure tool-call turns.
    pub content: Option<Content>,
    /// Requested tool calls, in provider order.
    pub tool_calls: Vec<ToolCall>,
    /// Prompt tokens for this request (running conversation total).
    pub input_tokens: u64,
    /// Completion tokens for this response.
    pub output_tokens: u64,
    /// Cached prompt tokens, when reported.
    pub cached_tokens: u64,
    /// Model that answered.
    pub model_id: String,
}

impl ChatResponse {
    /// A text-only response, for tests and synthesized messages.
    #[must_use]
    pub fn from_text(content: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            content: Some(Content::Text(content.into())),
            tool_calls: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
            cached_tokens: 0,
            model_id: model_id.into(),
        }
    }

    /// Set token usage.
    #[must_use]
    pub const fn with_usage(mut self, input: u64, output: u64) -> Self {
        self.input_tokens = input;
        self.output_tokens = output;
        self
    }

    /// Convert into an assistant [`Message`] carrying the usage fields.
    #[must_use]
    pub fn into_message(self) -> Message {
        let mut message = Message {
            role: crate::message::Role::Assistant,
            content: self.content,
            tool_calls: self.tool_calls,
            tool_call_id: None,
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            cached_tokens: self.cached_tokens,
            model_id: Some(self.model_id),
            timestamp: chrono::Utc::now(),
        };
        // Normalize empty text on tool-call turns to no content.
        if message
            .content
            .as_ref()
            .is_some_and(|content| content.is_empty())
            && !message.tool_calls.is_empty()
        {
            message.content = None;
        }
        message
    }
}

/// A chat-completion backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name for logs and error messages.
    fn name(&self) -> &str;

    /// Produce one assistant message for the request.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;
}

/// Builds the provider instance for an agent definition.
pub trait ProviderFactory: Send + Sync {
    /// Construct a provider for `definition`.
    fn create(&self, definition: &crate::definition::AgentDefinition)
    -> Result<Arc<dyn Provider>, crate::error::Error>;
}

/// Default factory: an [`HttpProvider`] configured from the definition, with
/// the API key read from the provider's conventional environment variable.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvProviderFactory;

impl ProviderFactory for EnvProviderFactory {
    fn create(
        &self,
        definition: &crate::definition::AgentDefinition,
    ) -> Result<Arc<dyn Provider>, crate::error::Error> {
        let mut config = HttpProviderConfig::from_env(&definition.provider)?;
        if let Some(base_url) = &definition.base_url {
            config = config.base_url(base_url);
        }
        if let Some(api_version) = &definition.api_version {
            config = config.api_version(api_version);
        }
        if let Some(timeout) = definition.request_timeout {
            config = config.timeout(timeout);
        }
        config.headers = definition.headers.clone();
        Ok(Arc::new(HttpProvider::new(config)?))
    }
}

/// Factory that hands every agent the same provider. Used with scripted
/// providers in tests and for single-backend deployments.
#[derive(Clone)]
pub struct FixedProviderFactory {
    provider: Arc<dyn Provider>,
}

impl std::fmt::Debug for FixedProviderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedProviderFactory").finish_non_exhaustive()
    }
}

impl FixedProviderFactory {
    /// Wrap a provider instance.
    #[must_use]
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

impl ProviderFactory for FixedProviderFactory {
    fn create(
        &self,
        _definition: &crate::definition::AgentDefinition,
    ) -> Result<Arc<dyn Provider>, crate::error::Error> {
        Ok(Arc::clone(&self.provider))
    }
}
