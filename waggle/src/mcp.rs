//! Model Context Protocol integration.
//!
//! Connects to MCP servers over HTTP or a stdio subprocess and exposes their
//! tools as regular [`Tool`] instances that can be granted to agents. The
//! transport framing is `rmcp`'s; this module only adapts discovery and
//! invocation to the runtime's tool contract.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rmcp::{
    ServiceExt,
    model::{CallToolRequestParams, ClientCapabilities, Implementation, InitializeRequestParams},
    service::ServerSink,
    transport::{StreamableHttpClientTransport, child_process::TokioChildProcess},
};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::tool::{Tool, ToolContext, ToolDefinition, ToolOutput};

/// MCP connection failures.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum McpError {
    /// The HTTP transport could not connect.
    #[error("failed to connect to MCP server at '{url}': {message}")]
    HttpConnectionFailed {
        /// Server URL.
        url: String,
        /// Underlying failure.
        message: String,
    },

    /// The stdio subprocess could not be spawned or initialized.
    #[error("failed to start MCP server process '{command}': {message}")]
    ProcessSpawnFailed {
        /// The command line.
        command: String,
        /// Underlying failure.
        message: String,
    },

    /// Tool discovery failed after connecting.
    #[error("failed to list MCP tools: {0}")]
    ListToolsFailed(String),
}

/// How to reach an MCP server.
#[derive(Debug, Clone)]
pub enum McpTransport {
    /// Streamable HTTP endpoint.
    Http {
        /// Server URL.
        url: String,
    },
    /// Local subprocess speaking stdio.
    Stdio {
        /// Command to spawn.
        command: String,
        /// Command arguments.
        args: Vec<String>,
        /// Extra environment variables.
        env: HashMap<String, String>,
    },
}

/// A connected MCP server and its discovered tools.
pub struct McpClient {
    sink: ServerSink,
    tools: Vec<rmcp::model::Tool>,
    service: JoinHandle<()>,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("tools", &self.tool_names())
            .finish_non_exhaustive()
    }
}

impl McpClient {
    /// Connect to an HTTP MCP server.
    pub async fn http(url: impl Into<String>) -> Result<Self, McpError> {
        Self::connect(McpTransport::Http { url: url.into() }).await
    }

    /// Spawn and connect to a stdio MCP server.
    pub async fn stdio(command: impl Into<String>, args: &[&str]) -> Result<Self, McpError> {
        Self::connect(McpTransport::Stdio {
            command: command.into(),
            args: args.iter().map(ToString::to_string).collect(),
            env: HashMap::new(),
        })
        .await
    }

    /// Connect using an explicit transport configuration.
    pub async fn connect(transport: McpTransport) -> Result<Self, McpError> {
        let client_info = InitializeRequestParams {
            meta: None,
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "waggle".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
        };

        match transport {
            McpTransport::Http { url } => {
                let transport = StreamableHttpClientTransport::from_uri(url.as_str());
                let service = client_info.serve(transport).await.map_err(|err| {
                    McpError::HttpConnectionFailed {
                        url: url.clone(),
                        message: err.to_string(),
                    }
                })?;
                let sink = service.peer().clone();
                let tools = sink
                    .list_tools(Default::default())
                    .await
                    .map_err(|err| McpError::ListToolsFailed(err.to_string()))?
                    .tools;
                let handle = tokio::spawn(async move {
                    let _ = service.waiting().await;
                });
                Ok(Self {
                    sink,
                    tools,
                    service: handle,
                })
            }
            McpTransport::Stdio { command, args, env } => {
                let mut cmd = tokio::process::Command::new(&command);
                cmd.args(&args);
                for (key, value) in env {
                    cmd.env(key, value);
                }
                let transport =
                    TokioChildProcess::new(cmd).map_err(|err| McpError::ProcessSpawnFailed {
                        command: command.clone(),
                        message: err.to_string(),
                    })?;
                let service = client_info.serve(transport).await.map_err(|err| {
                    McpError::ProcessSpawnFailed {
                        command: command.clone(),
                        message: err.to_string(),
                    }
                })?;
                let sink = service.peer().clone();
                let tools = sink
                    .list_tools(Default::default())
                    .await
                    .map_err(|err| McpError::ListToolsFailed(err.to_string()))?
                    .tools;
                let handle = tokio::spawn(async move {
                    let _ = service.waiting().await;
                });
                Ok(Self {
                    sink,
                    tools,
                    service: handle,
                })
            }
        }
    }

    /// Names of the discovered tools.
    #[must_use]
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name.as_ref()).collect()
    }

    /// Adapt the discovered tools to the runtime's tool contract.
    #[must_use]
    pub fn tools(self: &Arc<Self>) -> Vec<Arc<dyn Tool>> {
        self.tools
            .iter()
            .map(|tool| {
                Arc::new(McpTool {
                    client: Arc::clone(self),
                    name: tool.name.to_string(),
                    description: tool
                        .description
                        .as_deref()
                        .unwrap_or_default()
                        .to_string(),
                    parameters: serde_json::to_value(tool.input_schema.clone())
                        .unwrap_or_else(|_| serde_json::json!({"type": "object"})),
                }) as Arc<dyn Tool>
            })
            .collect()
    }

    /// Stop the background service task.
    pub fn shutdown(&self) {
        self.service.abort();
    }
}

/// One remote tool exposed through the runtime's tool contract.
struct McpTool {
    client: Arc<McpClient>,
    name: String,
    description: String,
    parameters: Value,
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(&self.name, &self.description, self.parameters.clone())
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> ToolOutput {
        let arguments = match args {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                return ToolOutput::error(format!(
                    "{}: arguments must be an object, got {other}",
                    self.name
                ));
            }
        };
        let result = self
            .client
            .sink
            .call_tool(CallToolRequestParams {
                meta: None,
                name: self.name.clone().into(),
                arguments,
            })
            .await;
        match result {
            Ok(result) => {
                let is_error = result.is_error.unwrap_or(false);
                let rendered = render_content(&serde_json::to_value(&result).unwrap_or_default());
                if is_error {
                    ToolOutput::error(format!("{}: {rendered}", self.name))
                } else {
                    ToolOutput::ok(rendered)
                }
            }
            Err(err) => ToolOutput::error(format!("{}: {err}", self.name)),
        }
    }
}

/// Pull the text blocks out of a tool-call result, falling back to JSON.
fn render_content(result: &Value) -> String {
    let texts: Vec<&str> = result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    if texts.is_empty() {
        result.to_string()
    } else {
        texts.join("\n")
    }
}
