//! Shared scratchpad tools.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::tool::{Tool, ToolContext, ToolDefinition, ToolOutput, parse_args};

/// Write an entry to the swarm's shared scratchpad.
#[derive(Debug, Clone, Copy)]
pub struct ScratchpadWriteTool;

/// Read an entry from the shared scratchpad.
#[derive(Debug, Clone, Copy)]
pub struct ScratchpadReadTool;

/// List all scratchpad entries.
#[derive(Debug, Clone, Copy)]
pub struct ScratchpadListTool;

#[derive(Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
}

#[derive(Deserialize)]
struct ReadArgs {
    path: String,
}

#[async_trait]
impl Tool for ScratchpadWriteTool {
    fn name(&self) -> &str {
        "ScratchpadWrite"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "ScratchpadWrite",
            "Store a value in the swarm-wide scratchpad, visible to every agent until the swarm \
             stops.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Key for the entry."},
                    "content": {"type": "string", "description": "Value to store."}
                },
                "required": ["path", "content"]
            }),
        )
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolOutput {
        let args: WriteArgs = match parse_args(self.name(), &args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        ctx.scratchpad.write(&args.path, args.content, &ctx.agent);
        ToolOutput::ok(format!("Scratchpad entry written: {}", args.path))
    }
}

#[async_trait]
impl Tool for ScratchpadReadTool {
    fn name(&self) -> &str {
        "ScratchpadRead"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "ScratchpadRead",
            "Read a value from the swarm-wide scratchpad.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Key of the entry."}
                },
                "required": ["path"]
            }),
        )
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolOutput {
        let args: ReadArgs = match parse_args(self.name(), &args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        match ctx.scratchpad.read(&args.path) {
            Some(entry) => ToolOutput::ok(entry.content),
            None => ToolOutput::error(format!(
                "ScratchpadRead: no entry at {:?}",
                args.path
            )),
        }
    }
}

#[async_trait]
impl Tool for ScratchpadListTool {
    fn name(&self) -> &str {
        "ScratchpadList"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "ScratchpadList",
            "List every scratchpad entry with its owner and size.",
            json!({"type": "object", "properties": {}}),
        )
    }

    async fn call(&self, ctx: &ToolContext, _args: Value) -> ToolOutput {
        let rows = ctx.scratchpad.list();
        if rows.is_empty() {
            return ToolOutput::ok("Scratchpad is empty.");
        }
        let listing: String = rows
            .iter()
            .map(|(path, owner, size)| format!("{path} (by {owner}, {size} bytes)\n"))
            .collect();
        ToolOutput::ok(listing)
    }
}
