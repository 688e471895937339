//! Conversation message types.
//!
//! Messages follow chat-completion conventions: a role, content, and for
//! assistant turns an ordered list of tool calls. Token counts and the model
//! id are recorded on every message so cumulative usage and cost can be
//! derived from the log alone.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions, including injected memory reminders.
    System,
    /// User input.
    User,
    /// Model output.
    Assistant,
    /// Result of a single tool call.
    Tool,
}

impl Role {
    /// String representation of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A non-text payload attached to rich content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Display name of the attachment.
    pub name: String,
    /// MIME type, e.g. `image/png`.
    pub media_type: String,
    /// Opaque payload, provider-encoded.
    pub data: String,
}

/// Message content: either plain text or text plus attachments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Plain text content.
    Text(String),
    /// Text with attachments.
    Rich {
        /// The text portion.
        text: String,
        /// Attached payloads.
        attachments: Vec<Attachment>,
    },
}

impl Content {
    /// The text portion of the content.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) | Self::Rich { text, .. } => text,
        }
    }

    /// Byte length of the text portion.
    #[must_use]
    pub fn len(&self) -> usize {
        self.text().len()
    }

    /// Whether the text portion is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text().is_empty()
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier correlating the call with its result message.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON arguments for the call.
    pub arguments: Value,
}

impl ToolCall {
    /// Create a new tool call.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Render the call as `Name(key: value, …)` for reminders and logs.
    #[must_use]
    pub fn render(&self) -> String {
        let args = match &self.arguments {
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join(", "),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        format!("{}({args})", self.name)
    }
}

/// One entry in a chat's message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Message role.
    pub role: Role,
    /// Content, absent for assistant turns that only carry tool calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    /// Tool calls requested by an assistant turn, in provider order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// The call this `tool` message answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Prompt tokens reported by the provider for this turn.
    #[serde(default)]
    pub input_tokens: u64,
    /// Completion tokens reported by the provider for this turn.
    #[serde(default)]
    pub output_tokens: u64,
    /// Cached prompt tokens reported by the provider, if any.
    #[serde(default)]
    pub cached_tokens: u64,
    /// Model that produced this message, for assistant turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Creation time, UTC.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn base(role: Role, content: Option<Content>) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            input_tokens: 0,
            output_tokens: 0,
            cached_tokens: 0,
            model_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a system message.
    #[must_use]
    pub fn system(content: impl Into<Content>) -> Self {
        Self::base(Role::System, Some(content.into()))
    }

    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<Content>) -> Self {
        Self::base(Role::User, Some(content.into()))
    }

    /// Create an assistant message with text content.
    #[must_use]
    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::base(Role::Assistant, Some(content.into()))
    }

    /// Create a tool-result message answering `tool_call_id`.
    #[must_use]
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<Content>) -> Self {
        let mut message = Self::base(Role::Tool, Some(content.into()));
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    /// Attach tool calls to an assistant message.
    #[must_use]
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// The text portion of the content, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().map(Content::text)
    }

    /// Whether this assistant turn requests at least one tool call.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// ISO-8601 UTC timestamp string.
    #[must_use]
    pub fn timestamp_rfc3339(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}
