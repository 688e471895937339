//! Shell-command hooks.
//!
//! The event payload is written to the command's stdin as JSON. Exit code 0
//! continues (non-empty stdout becomes a replacement value); exit code 2
//! halts with stderr as the message; any other exit code is logged and
//! ignored, as is a timeout or spawn failure.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::warn;

use super::{HookContext, HookOutcome};

pub(super) async fn run_command_hook(
    command: &str,
    timeout: Duration,
    ctx: &HookContext,
) -> HookOutcome {
    let payload = match serde_json::to_vec(ctx) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(command, error = %err, "hook payload serialization failed");
            return HookOutcome::Continue;
        }
    };

    let mut child = match Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            warn!(command, error = %err, "hook command failed to spawn");
            return HookOutcome::Continue;
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(err) = stdin.write_all(&payload).await {
            warn!(command, error = %err, "hook stdin write failed");
        }
        // Closing stdin lets line-reading hooks terminate.
        drop(stdin);
    }

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            warn!(command, error = %err, "hook command failed");
            return HookOutcome::Continue;
        }
        Err(_) => {
            warn!(command, timeout_secs = timeout.as_secs(), "hook command timed out");
            return HookOutcome::Continue;
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    match output.status.code() {
        Some(0) => {
            if stdout.is_empty() {
                HookOutcome::Continue
            } else {
                HookOutcome::Replace(stdout)
            }
        }
        Some(2) => HookOutcome::Halt(stderr),
        code => {
            if !stderr.is_empty() {
                warn!(command, ?code, stderr, "hook command reported an error");
            }
            HookOutcome::Continue
        }
    }
}
