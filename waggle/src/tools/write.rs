//! File writing tool.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::tool::{
    PermissionSurface, Tool, ToolContext, ToolDefinition, ToolOutput, parse_args,
};
use crate::tracker::digest_of;

/// Writes a file. Overwriting existing content requires a prior up-to-date
/// `Read`; parent directories are created as needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteTool;

#[derive(Deserialize)]
struct WriteArgs {
    file_path: String,
    content: String,
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "Write"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "Write",
            "Write a file, creating parent directories. Overwriting an existing file requires \
             reading it first.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "Destination path."},
                    "content": {"type": "string", "description": "Full file content."}
                },
                "required": ["file_path", "content"]
            }),
        )
    }

    fn surface(&self) -> PermissionSurface {
        PermissionSurface::Paths(&["file_path"])
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolOutput {
        let args: WriteArgs = match parse_args(self.name(), &args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        let path = ctx.resolve(&args.file_path);
        let key = path.to_string_lossy().into_owned();

        match tokio::fs::read(&path).await {
            Ok(existing) => {
                if !ctx.files.is_current(&ctx.base_agent, &key, &digest_of(&existing)) {
                    return ToolOutput::unrecoverable(format!(
                        "Write: '{}' exists and has not been read (or changed since the last \
                         read); call Read first",
                        args.file_path
                    ));
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return ToolOutput::error(format!("Write: {}: {err}", args.file_path)),
        }

        if let Some(parent) = path.parent() {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                return ToolOutput::error(format!("Write: {}: {err}", args.file_path));
            }
        }
        if let Err(err) = tokio::fs::write(&path, &args.content).await {
            return ToolOutput::error(format!("Write: {}: {err}", args.file_path));
        }
        ctx.files
            .record(&ctx.base_agent, &key, digest_of(args.content.as_bytes()));
        ToolOutput::ok(format!("File written: {}", args.file_path))
    }
}
