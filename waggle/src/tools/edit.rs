//! Exact-string file editing tools.
//!
//! Both tools enforce read-before-edit: the caller must have observed the
//! current file content via `Read`. `MultiEdit` stages every edit in memory
//! and writes once, so a failing edit leaves the file untouched.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::tool::{
    PermissionSurface, Tool, ToolContext, ToolDefinition, ToolOutput, parse_args,
};
use crate::tracker::digest_of;

/// Replace one unique occurrence of a string in a file.
#[derive(Debug, Clone, Copy)]
pub struct EditTool;

/// Apply several [`EditTool`]-style replacements atomically.
#[derive(Debug, Clone, Copy)]
pub struct MultiEditTool;

#[derive(Deserialize)]
struct EditArgs {
    file_path: String,
    old_string: String,
    new_string: String,
}

#[derive(Deserialize)]
struct MultiEditArgs {
    file_path: String,
    edits: Vec<EditOp>,
}

#[derive(Deserialize)]
struct EditOp {
    old_string: String,
    new_string: String,
}

/// Replace exactly one occurrence of `old` in `content`.
pub(crate) fn apply_edit(content: &str, old: &str, new: &str) -> Result<String, String> {
    if old.is_empty() {
        return Err("old_string must not be empty".to_string());
    }
    let occurrences = content.matches(old).count();
    match occurrences {
        0 => Err(format!("old_string not found in file: {old:?}")),
        1 => Ok(content.replacen(old, new, 1)),
        n => Err(format!(
            "old_string occurs {n} times and must be unique; add surrounding context"
        )),
    }
}

/// Load the file and check the read tracker. Returns `(key, content)`.
async fn load_tracked(
    tool: &str,
    ctx: &ToolContext,
    file_path: &str,
) -> Result<(String, String), ToolOutput> {
    let path = ctx.resolve(file_path);
    let key = path.to_string_lossy().into_owned();
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ToolOutput::error(format!(
                "{tool}: file does not exist: {file_path}"
            )));
        }
        Err(err) => return Err(ToolOutput::error(format!("{tool}: {file_path}: {err}"))),
    };
    if !ctx.files.is_current(&ctx.base_agent, &key, &digest_of(&bytes)) {
        return Err(ToolOutput::unrecoverable(format!(
            "{tool}: '{file_path}' has not been read (or changed since the last read); call \
             Read first"
        )));
    }
    Ok((key, String::from_utf8_lossy(&bytes).into_owned()))
}

async fn commit(
    tool: &str,
    ctx: &ToolContext,
    key: &str,
    file_path: &str,
    content: &str,
) -> ToolOutput {
    if let Err(err) = tokio::fs::write(ctx.resolve(file_path), content).await {
        return ToolOutput::error(format!("{tool}: {file_path}: {err}"));
    }
    ctx.files
        .record(&ctx.base_agent, key, digest_of(content.as_bytes()));
    ToolOutput::ok(format!("File edited: {file_path}"))
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "Edit"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "Edit",
            "Replace one unique occurrence of old_string with new_string in a file. The file \
             must have been read first.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string"},
                    "old_string": {"type": "string"},
                    "new_string": {"type": "string"}
                },
                "required": ["file_path", "old_string", "new_string"]
            }),
        )
    }

    fn surface(&self) -> PermissionSurface {
        PermissionSurface::Paths(&["file_path"])
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolOutput {
        let args: EditArgs = match parse_args(self.name(), &args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        let (key, content) = match load_tracked(self.name(), ctx, &args.file_path).await {
            Ok(loaded) => loaded,
            Err(output) => return output,
        };
        match apply_edit(&content, &args.old_string, &args.new_string) {
            Ok(updated) => commit(self.name(), ctx, &key, &args.file_path, &updated).await,
            Err(reason) => ToolOutput::error(format!("Edit: {reason}")),
        }
    }
}

#[async_trait]
impl Tool for MultiEditTool {
    fn name(&self) -> &str {
        "MultiEdit"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "MultiEdit",
            "Apply a list of edits to one file in order. All edits succeed or none are written.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string"},
                    "edits": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "old_string": {"type": "string"},
                                "new_string": {"type": "string"}
                            },
                            "required": ["old_string", "new_string"]
                        }
                    }
                },
                "required": ["file_path", "edits"]
            }),
        )
    }

    fn surface(&self) -> PermissionSurface {
        PermissionSurface::Paths(&["file_path"])
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolOutput {
        let args: MultiEditArgs = match parse_args(self.name(), &args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        if args.edits.is_empty() {
            return ToolOutput::error("MultiEdit: edits must not be empty");
        }
        let (key, mut content) = match load_tracked(self.name(), ctx, &args.file_path).await {
            Ok(loaded) => loaded,
            Err(output) => return output,
        };
        for (index, edit) in args.edits.iter().enumerate() {
            match apply_edit(&content, &edit.old_string, &edit.new_string) {
                Ok(updated) => content = updated,
                Err(reason) => {
                    return ToolOutput::error(format!(
                        "MultiEdit: edit {} failed, nothing written: {reason}",
                        index + 1
                    ));
                }
            }
        }
        commit(self.name(), ctx, &key, &args.file_path, &content).await
    }
}
