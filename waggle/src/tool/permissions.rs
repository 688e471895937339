//! Declarative allow/deny policies wrapped around tools.
//!
//! Path tools are checked with glob patterns (`*` does not cross `/`, `**`
//! does, plus `?`, `[…]` classes and `{a,b}` alternates, case-sensitive).
//! The command tool is checked with unanchored regexes over the command
//! string. Deny lists always win; a non-empty allow list that matches nothing
//! also denies.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;
use serde_json::Value;

use crate::error::ConfigError;

use super::{PermissionSurface, Tool, ToolContext, ToolDefinition, ToolOutput};

/// Allow/deny policy for one tool grant.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ToolPermissions {
    /// Path globs that admit a call.
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    /// Path globs that reject a call.
    #[serde(default)]
    pub denied_paths: Vec<String>,
    /// Command regexes that admit a call.
    #[serde(default)]
    pub allowed_commands: Vec<String>,
    /// Command regexes that reject a call.
    #[serde(default)]
    pub denied_commands: Vec<String>,
}

impl ToolPermissions {
    /// An empty policy (everything allowed).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an allowed path glob.
    #[must_use]
    pub fn allow_path(mut self, pattern: impl Into<String>) -> Self {
        self.allowed_paths.push(pattern.into());
        self
    }

    /// Add a denied path glob.
    #[must_use]
    pub fn deny_path(mut self, pattern: impl Into<String>) -> Self {
        self.denied_paths.push(pattern.into());
        self
    }

    /// Add an allowed command regex.
    #[must_use]
    pub fn allow_command(mut self, pattern: impl Into<String>) -> Self {
        self.allowed_commands.push(pattern.into());
        self
    }

    /// Add a denied command regex.
    #[must_use]
    pub fn deny_command(mut self, pattern: impl Into<String>) -> Self {
        self.denied_commands.push(pattern.into());
        self
    }

    /// Whether the policy admits every call.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allowed_paths.is_empty()
            && self.denied_paths.is_empty()
            && self.allowed_commands.is_empty()
            && self.denied_commands.is_empty()
    }
}

fn compile_glob(pattern: &str) -> Result<(String, GlobMatcher), ConfigError> {
    // Negation is expressed through the denied list; a `!` prefix is noise.
    let source = pattern.strip_prefix('!').unwrap_or(pattern);
    let glob = GlobBuilder::new(source)
        .literal_separator(true)
        .case_insensitive(false)
        .build()
        .map_err(|err| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        })?;
    Ok((pattern.to_string(), glob.compile_matcher()))
}

fn compile_regex(pattern: &str) -> Result<(String, Regex), ConfigError> {
    let regex = Regex::new(pattern).map_err(|err| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: err.to_string(),
    })?;
    Ok((pattern.to_string(), regex))
}

#[derive(Debug)]
struct CompiledPolicy {
    allowed_paths: Vec<(String, GlobMatcher)>,
    denied_paths: Vec<(String, GlobMatcher)>,
    allowed_commands: Vec<(String, Regex)>,
    denied_commands: Vec<(String, Regex)>,
}

impl CompiledPolicy {
    fn compile(policy: &ToolPermissions) -> Result<Self, ConfigError> {
        Ok(Self {
            allowed_paths: policy
                .allowed_paths
                .iter()
                .map(|p| compile_glob(p))
                .collect::<Result<_, _>>()?,
            denied_paths: policy
                .denied_paths
                .iter()
                .map(|p| compile_glob(p))
                .collect::<Result<_, _>>()?,
            allowed_commands: policy
                .allowed_commands
                .iter()
                .map(|p| compile_regex(p))
                .collect::<Result<_, _>>()?,
            denied_commands: policy
                .denied_commands
                .iter()
                .map(|p| compile_regex(p))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Apply the decision rule to a path. `Err` carries the denial message.
    fn check_path(&self, raw: &str, resolved: &Path, directory: &Path) -> Result<(), String> {
        // Patterns are written relative to the agent directory, but absolute
        // patterns and raw arguments must keep matching too.
        let resolved_str = resolved.to_string_lossy();
        let relative = resolved
            .strip_prefix(directory)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| resolved_str.to_string());
        let candidates = [raw, relative.as_str(), resolved_str.as_ref()];

        for (source, matcher) in &self.denied_paths {
            if candidates.iter().any(|c| matcher.is_match(c)) {
                return Err(format!("path '{raw}': Blocked by policy: {source}"));
            }
        }
        if !self.allowed_paths.is_empty()
            && !self
                .allowed_paths
                .iter()
                .any(|(_, matcher)| candidates.iter().any(|c| matcher.is_match(c)))
        {
            return Err(format!("path '{raw}' (not in allowed list)"));
        }
        Ok(())
    }

    /// Apply the decision rule to a command string.
    fn check_command(&self, command: &str) -> Result<(), String> {
        for (source, regex) in &self.denied_commands {
            if regex.is_match(command) {
                return Err(format!("command: Blocked by policy: {source}"));
            }
        }
        if !self.allowed_commands.is_empty()
            && !self
                .allowed_commands
                .iter()
                .any(|(_, regex)| regex.is_match(command))
        {
            return Err("command (not in allowed list)".to_string());
        }
        Ok(())
    }
}

/// A tool wrapped with an allow/deny policy.
///
/// Denied calls never reach the inner tool; they return an unrecoverable
/// `<tool_use_error>` naming the rule that fired.
pub struct PermissionValidator {
    inner: Arc<dyn Tool>,
    policy: CompiledPolicy,
}

impl std::fmt::Debug for PermissionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionValidator")
            .field("tool", &self.inner.name())
            .finish_non_exhaustive()
    }
}

impl PermissionValidator {
    /// Wrap `inner` with `policy`, compiling its patterns.
    pub fn wrap(inner: Arc<dyn Tool>, policy: &ToolPermissions) -> Result<Arc<dyn Tool>, ConfigError> {
        Ok(Arc::new(Self {
            policy: CompiledPolicy::compile(policy)?,
            inner,
        }))
    }
}

#[async_trait]
impl Tool for PermissionValidator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn definition(&self) -> ToolDefinition {
        self.inner.definition()
    }

    fn removable(&self) -> bool {
        self.inner.removable()
    }

    fn surface(&self) -> PermissionSurface {
        self.inner.surface()
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolOutput {
        match self.inner.surface() {
            PermissionSurface::None => {}
            PermissionSurface::Paths(arg_names) => {
                for arg in arg_names {
                    let Some(raw) = args.get(*arg).and_then(Value::as_str) else {
                        continue;
                    };
                    let resolved = ctx.resolve(raw);
                    if let Err(denial) =
                        self.policy.check_path(raw, &resolved, &ctx.directory)
                    {
                        return ToolOutput::unrecoverable(format!(
                            "{} denied for {denial}",
                            self.inner.name()
                        ));
                    }
                }
            }
            PermissionSurface::Command(arg_name) => {
                if let Some(command) = args.get(arg_name).and_then(Value::as_str) {
                    if let Err(denial) = self.policy.check_command(command) {
                        return ToolOutput::unrecoverable(format!(
                            "{} denied for {denial}",
                            self.inner.name()
                        ));
                    }
                }
            }
        }
        self.inner.call(ctx, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct PathProbe;

    #[async_trait]
    impl Tool for PathProbe {
        fn name(&self) -> &str {
            "Write"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("Write", "probe", json!({"type": "object"}))
        }

        fn surface(&self) -> PermissionSurface {
            PermissionSurface::Paths(&["file_path"])
        }

        async fn call(&self, _ctx: &ToolContext, _args: Value) -> ToolOutput {
            ToolOutput::ok("written")
        }
    }

    struct CommandProbe;

    #[async_trait]
    impl Tool for CommandProbe {
        fn name(&self) -> &str {
            "Bash"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("Bash", "probe", json!({"type": "object"}))
        }

        fn surface(&self) -> PermissionSurface {
            PermissionSurface::Command("command")
        }

        async fn call(&self, _ctx: &ToolContext, _args: Value) -> ToolOutput {
            ToolOutput::ok("ran")
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new("lead", "/work")
    }

    #[tokio::test]
    async fn deny_list_wins_over_allow_list() {
        let policy = ToolPermissions::new()
            .allow_path("backend/**")
            .deny_path("**/.env");
        let tool = PermissionValidator::wrap(Arc::new(PathProbe), &policy).expect("compile");

        let output = tool
            .call(&ctx(), json!({"file_path": "backend/.env", "content": "x"}))
            .await;
        assert!(output.is_error());
        assert!(output.content().contains("Blocked by policy: **/.env"));
        assert!(output.content().contains("<system-reminder>"));
    }

    #[tokio::test]
    async fn allow_list_admits_matching_path() {
        let policy = ToolPermissions::new()
            .allow_path("backend/**")
            .deny_path("**/.env");
        let tool = PermissionValidator::wrap(Arc::new(PathProbe), &policy).expect("compile");

        let output = tool
            .call(&ctx(), json!({"file_path": "backend/app.rs"}))
            .await;
        assert!(!output.is_error());
    }

    #[tokio::test]
    async fn nonmatching_path_rejected_by_allow_list() {
        let policy = ToolPermissions::new().allow_path("backend/**");
        let tool = PermissionValidator::wrap(Arc::new(PathProbe), &policy).expect("compile");

        let output = tool
            .call(&ctx(), json!({"file_path": "frontend/app.ts"}))
            .await;
        assert!(output.is_error());
        assert!(output.content().contains("(not in allowed list)"));
    }

    #[tokio::test]
    async fn single_star_does_not_cross_separator() {
        let policy = ToolPermissions::new().allow_path("backend/*.rs");
        let tool = PermissionValidator::wrap(Arc::new(PathProbe), &policy).expect("compile");

        let ok = tool.call(&ctx(), json!({"file_path": "backend/a.rs"})).await;
        assert!(!ok.is_error());

        let nested = tool
            .call(&ctx(), json!({"file_path": "backend/sub/a.rs"}))
            .await;
        assert!(nested.is_error());
    }

    #[tokio::test]
    async fn brace_alternates_match() {
        let policy = ToolPermissions::new().allow_path("src/**/*.{rs,toml}");
        let tool = PermissionValidator::wrap(Arc::new(PathProbe), &policy).expect("compile");

        let ok = tool
            .call(&ctx(), json!({"file_path": "src/deep/Cargo.toml"}))
            .await;
        assert!(!ok.is_error());
    }

    #[tokio::test]
    async fn denied_command_reports_pattern_only() {
        let policy = ToolPermissions::new().deny_command("^rm");
        let tool = PermissionValidator::wrap(Arc::new(CommandProbe), &policy).expect("compile");

        let output = tool.call(&ctx(), json!({"command": "rm -rf /"})).await;
        assert!(output.is_error());
        assert!(output.content().contains("Blocked by policy: ^rm"));
        assert!(!output.content().contains("allowed"));
    }

    #[tokio::test]
    async fn command_regex_is_substring_match() {
        let policy = ToolPermissions::new().deny_command("sudo");
        let tool = PermissionValidator::wrap(Arc::new(CommandProbe), &policy).expect("compile");

        let output = tool
            .call(&ctx(), json!({"command": "echo hi && sudo reboot"}))
            .await;
        assert!(output.is_error());
    }

    #[tokio::test]
    async fn empty_policy_admits_everything() {
        let policy = ToolPermissions::new();
        let tool = PermissionValidator::wrap(Arc::new(CommandProbe), &policy).expect("compile");
        let output = tool.call(&ctx(), json!({"command": "anything"})).await;
        assert!(!output.is_error());
    }

    #[test]
    fn invalid_glob_is_config_error() {
        let policy = ToolPermissions::new().allow_path("src/[");
        let err = match PermissionValidator::wrap(Arc::new(PathProbe), &policy) {
            Err(e) => e,
            Ok(_) => panic!("expected a config error"),
        };
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }
}
