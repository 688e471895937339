//! HTTP fetch tool.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::tool::{Tool, ToolContext, ToolDefinition, ToolOutput, parse_args};

/// Fetches a URL with a plain GET. Not a filesystem tool, so no path policy
/// applies.
#[derive(Debug, Clone, Copy)]
pub struct WebFetchTool;

/// Response bodies are truncated to this many bytes.
const MAX_BODY_BYTES: usize = 100_000;

#[derive(Deserialize)]
struct WebFetchArgs {
    url: String,
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "WebFetch"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "WebFetch",
            "Fetch a URL with HTTP GET and return the response body as text.",
            json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "The URL to fetch."}
                },
                "required": ["url"]
            }),
        )
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> ToolOutput {
        let args: WebFetchArgs = match parse_args(self.name(), &args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        let response = match reqwest::get(&args.url).await {
            Ok(response) => response,
            Err(err) => return ToolOutput::error(format!("WebFetch: {}: {err}", args.url)),
        };
        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return ToolOutput::error(format!("WebFetch: {}: {err}", args.url)),
        };
        if !status.is_success() {
            return ToolOutput::error(format!(
                "WebFetch: {} answered HTTP {}",
                args.url,
                status.as_u16()
            ));
        }
        let mut body = body;
        if body.len() > MAX_BODY_BYTES {
            body.truncate(MAX_BODY_BYTES);
            body.push_str("\n[truncated]");
        }
        ToolOutput::ok(body)
    }
}
