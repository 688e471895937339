//! Filename pattern matching tool.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::tool::{
    PermissionSurface, Tool, ToolContext, ToolDefinition, ToolOutput, parse_args,
};

use super::MAX_RESULTS;

/// Expands a glob pattern under the agent's directory, newest files first.
#[derive(Debug, Clone, Copy)]
pub struct GlobTool;

#[derive(Deserialize)]
struct GlobArgs {
    pattern: String,
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "Glob"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "Glob",
            "Find files matching a glob pattern (e.g. `src/**/*.rs`). Returns at most 50 \
             entries, most recently modified first.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string", "description": "Glob pattern, relative to the working directory."}
                },
                "required": ["pattern"]
            }),
        )
    }

    fn surface(&self) -> PermissionSurface {
        PermissionSurface::Paths(&["pattern"])
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolOutput {
        let args: GlobArgs = match parse_args(self.name(), &args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        let pattern = if std::path::Path::new(&args.pattern).is_absolute() {
            args.pattern.clone()
        } else {
            ctx.directory.join(&args.pattern).to_string_lossy().into_owned()
        };

        let paths = match glob::glob(&pattern) {
            Ok(paths) => paths,
            Err(err) => {
                return ToolOutput::error(format!("Glob: invalid pattern {:?}: {err}", args.pattern));
            }
        };

        let mut entries: Vec<(std::path::PathBuf, u64, std::time::SystemTime)> = paths
            .filter_map(std::result::Result::ok)
            .filter_map(|path| {
                let meta = std::fs::metadata(&path).ok()?;
                if !meta.is_file() {
                    return None;
                }
                let modified = meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                Some((path, meta.len(), modified))
            })
            .collect();
        entries.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(MAX_RESULTS);

        if entries.is_empty() {
            return ToolOutput::ok("No files matched.");
        }
        let listing: String = entries
            .iter()
            .map(|(path, size, _)| format!("{} ({size} bytes)\n", path.display()))
            .collect();
        ToolOutput::ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(dir: &std::path::Path) -> ToolContext {
        ToolContext::new("lead", dir)
    }

    #[tokio::test]
    async fn matches_nested_files_with_sizes() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("src/sub")).expect("mkdir");
        std::fs::write(dir.path().join("src/a.rs"), "12345").expect("write");
        std::fs::write(dir.path().join("src/sub/b.rs"), "1").expect("write");
        std::fs::write(dir.path().join("src/ignore.txt"), "x").expect("write");

        let output = GlobTool
            .call(&ctx(dir.path()), json!({"pattern": "src/**/*.rs"}))
            .await;
        assert!(!output.is_error());
        assert!(output.content().contains("a.rs (5 bytes)"));
        assert!(output.content().contains("b.rs (1 bytes)"));
        assert!(!output.content().contains("ignore.txt"));
    }

    #[tokio::test]
    async fn no_match_is_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = GlobTool
            .call(&ctx(dir.path()), json!({"pattern": "*.zig"}))
            .await;
        assert!(!output.is_error());
        assert!(output.content().contains("No files matched"));
    }
}
