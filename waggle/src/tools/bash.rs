//! Shell command tool.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::process::Command;

use crate::tool::{
    PermissionSurface, Tool, ToolContext, ToolDefinition, ToolOutput, parse_args,
};

/// Runs a command under the agent's directory, subject to the command policy.
#[derive(Debug, Clone, Copy)]
pub struct BashTool;

/// Default command timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Deserialize)]
struct BashArgs {
    command: String,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    timeout: Option<u64>,
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "Bash"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "Bash",
            "Run a shell command in the working directory. Captures stdout and stderr.",
            json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "The command line to run."},
                    "cwd": {"type": "string", "description": "Working directory override."},
                    "timeout": {"type": "integer", "description": "Timeout in seconds (default 120)."}
                },
                "required": ["command"]
            }),
        )
    }

    fn surface(&self) -> PermissionSurface {
        PermissionSurface::Command("command")
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolOutput {
        let args: BashArgs = match parse_args(self.name(), &args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        let cwd = args
            .cwd
            .as_deref()
            .map_or_else(|| ctx.directory.clone(), |dir| ctx.resolve(dir));
        let timeout = Duration::from_secs(args.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS));

        let child = Command::new("sh")
            .arg("-c")
            .arg(&args.command)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(err) => return ToolOutput::error(format!("Bash: failed to spawn: {err}")),
        };

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return ToolOutput::error(format!("Bash: {err}")),
            Err(_) => {
                return ToolOutput::error(format!(
                    "Bash: command timed out after {} s",
                    timeout.as_secs()
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut combined = stdout.into_owned();
        if !stderr.trim().is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str("stderr:\n");
            combined.push_str(stderr.trim_end());
        }

        if output.status.success() {
            if combined.is_empty() {
                combined.push_str("(no output)");
            }
            ToolOutput::ok(combined)
        } else {
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |code| code.to_string());
            ToolOutput::error(format!("Bash: exit status {code}\n{combined}"))
        }
    }
}
