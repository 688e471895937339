//! Content search tool.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::RegexBuilder;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::tool::{
    PermissionSurface, Tool, ToolContext, ToolDefinition, ToolOutput, parse_args,
};

use super::MAX_RESULTS;

/// Regex search over files, with three output modes.
#[derive(Debug, Clone, Copy)]
pub struct GrepTool;

#[derive(Deserialize)]
struct GrepArgs {
    pattern: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    output_mode: Option<String>,
    #[serde(default)]
    case_insensitive: Option<bool>,
}

fn walk(root: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(root) else {
        return;
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .collect();
    paths.sort();
    for path in paths {
        let hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'));
        if hidden {
            continue;
        }
        if path.is_dir() {
            walk(&path, files);
        } else {
            files.push(path);
        }
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "Grep"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "Grep",
            "Search file contents with a regex. output_mode is one of files_with_matches \
             (default), content, or count. Returns at most 50 rows.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string", "description": "Regular expression."},
                    "path": {"type": "string", "description": "File or directory to search; defaults to the working directory."},
                    "output_mode": {"type": "string", "enum": ["files_with_matches", "content", "count"]},
                    "case_insensitive": {"type": "boolean"}
                },
                "required": ["pattern"]
            }),
        )
    }

    fn surface(&self) -> PermissionSurface {
        PermissionSurface::Paths(&["path"])
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolOutput {
        let args: GrepArgs = match parse_args(self.name(), &args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        let regex = match RegexBuilder::new(&args.pattern)
            .case_insensitive(args.case_insensitive.unwrap_or(false))
            .build()
        {
            Ok(regex) => regex,
            Err(err) => {
                return ToolOutput::error(format!("Grep: invalid regex {:?}: {err}", args.pattern));
            }
        };
        let mode = args.output_mode.as_deref().unwrap_or("files_with_matches");
        if !matches!(mode, "files_with_matches" | "content" | "count") {
            return ToolOutput::error(format!("Grep: unknown output_mode {mode:?}"));
        }

        let root = args
            .path
            .as_deref()
            .map_or_else(|| ctx.directory.clone(), |path| ctx.resolve(path));
        let mut files = Vec::new();
        if root.is_file() {
            files.push(root);
        } else {
            walk(&root, &mut files);
        }

        let mut rows: Vec<String> = Vec::new();
        'files: for file in &files {
            let Ok(content) = std::fs::read_to_string(file) else {
                continue; // binary or unreadable
            };
            match mode {
                "files_with_matches" => {
                    if content.lines().any(|line| regex.is_match(line)) {
                        rows.push(file.display().to_string());
                    }
                }
                "content" => {
                    for (number, line) in content.lines().enumerate() {
                        if regex.is_match(line) {
                            rows.push(format!("{}:{}:{line}", file.display(), number + 1));
                            if rows.len() >= MAX_RESULTS {
                                break 'files;
                            }
                        }
                    }
                }
                _ => {
                    let count = content.lines().filter(|line| regex.is_match(line)).count();
                    if count > 0 {
                        rows.push(format!("{}:{count}", file.display()));
                    }
                }
            }
            if rows.len() >= MAX_RESULTS {
                break;
            }
        }
        rows.truncate(MAX_RESULTS);

        if rows.is_empty() {
            ToolOutput::ok("No matches found.")
        } else {
            ToolOutput::ok(rows.join("\n"))
        }
    }
}
