//! File reading tool.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::tool::{
    PermissionSurface, Tool, ToolContext, ToolDefinition, ToolOutput, parse_args,
};
use crate::tracker::digest_of;

/// Reads a file, records its digest, and returns line-numbered content.
#[derive(Debug, Clone, Copy)]
pub struct ReadTool;

#[derive(Deserialize)]
struct ReadArgs {
    file_path: String,
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "Read"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "Read",
            "Read a file from the filesystem. Returns the content with line numbers.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the file, absolute or relative to the working directory."
                    }
                },
                "required": ["file_path"]
            }),
        )
    }

    fn surface(&self) -> PermissionSurface {
        PermissionSurface::Paths(&["file_path"])
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolOutput {
        let args: ReadArgs = match parse_args(self.name(), &args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        let path = ctx.resolve(&args.file_path);
        if path.is_dir() {
            return ToolOutput::error(format!(
                "Read: '{}' is a directory, not a file",
                args.file_path
            ));
        }
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return ToolOutput::error(format!("Read: file does not exist: {}", args.file_path));
            }
            Err(err) => {
                return ToolOutput::error(format!("Read: {}: {err}", args.file_path));
            }
        };

        ctx.files
            .record(&ctx.base_agent, &path.to_string_lossy(), digest_of(&bytes));

        let content = String::from_utf8_lossy(&bytes);
        let numbered: String = content
            .lines()
            .enumerate()
            .map(|(index, line)| format!("{:>5}\t{line}\n", index + 1))
            .collect();
        ToolOutput::ok(numbered)
    }
}
