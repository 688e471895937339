//! HTTP chat-completions provider.
//!
//! Speaks the OpenAI-compatible chat completions shape, which is also what
//! most proxies and gateways expose. An `api_version` override selects the
//! alternate reasoning parameter shape (`reasoning: {effort}` instead of
//! `reasoning_effort`).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;
use crate::message::{Message, Role, ToolCall};

use super::{ChatRequest, ChatResponse, Provider};

/// Configuration for the HTTP provider.
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Bearer token.
    pub api_key: String,
    /// Endpoint base, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Selects the alternate reasoning request shape when set.
    pub api_version: Option<String>,
    /// Extra request headers.
    pub headers: HashMap<String, String>,
    /// Per-request timeout.
    pub timeout: Option<Duration>,
}

impl HttpProviderConfig {
    /// Default endpoint base.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    /// Config with the given key and defaults elsewhere.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            api_version: None,
            headers: HashMap::new(),
            timeout: None,
        }
    }

    /// Read the key from the conventional environment variable for
    /// `provider` (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, …).
    pub fn from_env(provider: &str) -> Result<Self, LlmError> {
        let var = format!("{}_API_KEY", provider.to_uppercase().replace('-', "_"));
        let api_key = std::env::var(&var)
            .map_err(|_| LlmError::Network(format!("environment variable {var} is not set")))?;
        Ok(Self::new(api_key))
    }

    /// Override the endpoint base.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Select the alternate reasoning request shape.
    #[must_use]
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// OpenAI-compatible chat provider over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    config: HttpProviderConfig,
    client: Client,
}

impl HttpProvider {
    /// Build a provider, constructing the HTTP client.
    pub fn new(config: HttpProviderConfig) -> Result<Self, LlmError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| LlmError::Network(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { config, client })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let messages: Vec<WireMessage> = request.messages.iter().map(WireMessage::from).collect();
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
        });
        let object = body.as_object_mut().expect("body is an object");

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect();
            object.insert("tools".into(), Value::Array(tools));
        }

        let params = &request.parameters;
        if let Some(temperature) = params.temperature {
            object.insert("temperature".into(), serde_json::json!(temperature));
        }
        if let Some(top_p) = params.top_p {
            object.insert("top_p".into(), serde_json::json!(top_p));
        }
        if let Some(max_tokens) = params.max_tokens {
            object.insert("max_tokens".into(), serde_json::json!(max_tokens));
        }
        if let Some(effort) = &params.reasoning_effort {
            if self.config.api_version.is_some() {
                object.insert("reasoning".into(), serde_json::json!({ "effort": effort }));
            } else {
                object.insert("reasoning_effort".into(), serde_json::json!(effort));
            }
        }
        for (key, value) in &params.extra {
            object.insert(key.clone(), value.clone());
        }
        body
    }

    fn parse_response(&self, raw: &str) -> Result<ChatResponse, LlmError> {
        let parsed: WireResponse = serde_json::from_str(raw).map_err(|err| {
            let excerpt: String = raw.chars().take(200).collect();
            LlmError::UnexpectedShape {
                detail: format!("{err}; body starts with: {excerpt}"),
            }
        })?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::UnexpectedShape {
                detail: "response carried no choices".into(),
            })?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| {
                let arguments = serde_json::from_str(&call.function.arguments)
                    .unwrap_or(Value::String(call.function.arguments));
                ToolCall::new(call.id, call.function.name, arguments)
            })
            .collect();

        let usage = parsed.usage.unwrap_or_default();
        Ok(ChatResponse {
            content: choice.message.content.map(Into::into),
            tool_calls,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cached_tokens: usage
                .prompt_tokens_details
                .map_or(0, |details| details.cached_tokens),
            model_id: parsed.model,
        })
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let body = self.build_body(request);
        let mut http_request = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.config.api_key)
            .json(&body);
        for (name, value) in &self.config.headers {
            http_request = http_request.header(name, value);
        }

        let response = http_request.send().await.map_err(|err| {
            if err.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::Network(err.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| LlmError::Network(err.to_string()))?;

        if !status.is_success() {
            return Err(LlmError::Http {
                status: status.as_u16(),
                message: text,
            });
        }
        self.parse_response(&text)
    }
}

// Wire types, chat-completions shape.

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCallOut>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireToolCallOut {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionOut,
}

#[derive(Debug, Serialize)]
struct WireFunctionOut {
    name: String,
    arguments: String,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        let tool_calls = if message.tool_calls.is_empty() {
            None
        } else {
            Some(
                message
                    .tool_calls
                    .iter()
                    .map(|call| WireToolCallOut {
                        id: call.id.clone(),
                        kind: "function",
                        function: WireFunctionOut {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect(),
            )
        };
        Self {
            role,
            content: message.text().map(str::to_string),
            tool_calls,
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    model: String,
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCallIn>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCallIn {
    id: String,
    function: WireFunctionIn,
}

#[derive(Debug, Deserialize)]
struct WireFunctionIn {
    name: String,
    arguments: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    prompt_tokens_details: Option<WirePromptDetails>,
}

#[derive(Debug, Deserialize)]
struct WirePromptDetails {
    #[serde(default)]
    cached_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SamplingParams;

    fn provider(api_version: Option<&str>) -> HttpProvider {
        let mut config = HttpProviderConfig::new("test-key");
        if let Some(version) = api_version {
            config = config.api_version(version);
        }
        HttpProvider::new(config).expect("client")
    }

    fn request(parameters: SamplingParams) -> ChatRequest {
        ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![Message::user("hi")],
            tools: Vec::new(),
            parameters,
        }
    }

    #[test]
    fn sampling_parameters_serialize() {
        let body = provider(None).build_body(&request(SamplingParams::temperature(0.7)));
        assert!((body["temperature"].as_f64().expect("temperature") - 0.7).abs() < 1e-9);
        assert!(body.get("reasoning_effort").is_none());
    }

    #[test]
    fn reasoning_effort_shape_depends_on_api_version() {
        let params = SamplingParams {
            reasoning_effort: Some("high".into()),
            ..SamplingParams::default()
        };

        let flat = provider(None).build_body(&request(params.clone()));
        assert_eq!(flat["reasoning_effort"], "high");
        assert!(flat.get("reasoning").is_none());

        let nested = provider(Some("2026-01")).build_body(&request(params));
        assert_eq!(nested["reasoning"]["effort"], "high");
        assert!(nested.get("reasoning_effort").is_none());
    }

    #[test]
    fn response_parsing_extracts_tool_calls_and_usage() {
        let raw = serde_json::json!({
            "model": "gpt-4o-2024-08-06",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "Read", "arguments": "{\"file_path\": \"a.txt\"}"}
                    }]
                }
            }],
            "usage": {
                "prompt_tokens": 120,
                "completion_tokens": 8,
                "prompt_tokens_details": {"cached_tokens": 64}
            }
        })
        .to_string();

        let response = provider(None).parse_response(&raw).expect("parse");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "Read");
        assert_eq!(response.tool_calls[0].arguments["file_path"], "a.txt");
        assert_eq!(response.input_tokens, 120);
        assert_eq!(response.cached_tokens, 64);
        assert_eq!(response.model_id, "gpt-4o-2024-08-06");
    }

    #[test]
    fn malformed_body_is_unexpected_shape() {
        let err = provider(None).parse_response("<html>gateway</html>").unwrap_err();
        assert!(matches!(err, LlmError::UnexpectedShape { .. }));
    }

    #[test]
    fn tool_message_round_trips_call_id() {
        let message = Message::tool("call_1", "file contents");
        let wire = WireMessage::from(&message);
        assert_eq!(wire.role, "tool");
        assert_eq!(wire.tool_call_id.as_deref(), Some("call_1"));
    }
}
