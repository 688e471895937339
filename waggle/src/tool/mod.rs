//! Tool trait and execution context.
//!
//! Tools are the only way agents touch the world. Every tool returns a
//! [`ToolOutput`]: either plain content or an error rendered as a
//! `<tool_use_error>` string, so the model always observes a normal text
//! message and the chat loop never unwinds on a tool failure.

mod permissions;
mod registry;

pub use permissions::{PermissionValidator, ToolPermissions};
pub use registry::{ToolEntry, ToolRegistry, ToolSource};

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::scratchpad::ScratchpadStorage;
use crate::skill::SkillState;
use crate::tracker::ReadTracker;

/// Shared slot holding the chat's active skill state.
///
/// The chat and the skill-loading tool both hold this handle; writing it
/// swaps the active tool set on the next resolution.
pub type SkillSlot = Arc<RwLock<Option<SkillState>>>;

/// Definition of a tool for LLM function calling.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolDefinition {
    /// Tool name, e.g. `Read`.
    pub name: String,
    /// Description shown to the model.
    pub description: String,
    /// JSON schema for the arguments.
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a new definition.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// What part of a call the permission layer inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionSurface {
    /// No policy applies.
    None,
    /// The named string arguments are filesystem paths.
    Paths(&'static [&'static str]),
    /// The named string argument is a shell command.
    Command(&'static str),
}

/// Result of a tool call as observed by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    content: String,
    is_error: bool,
}

impl ToolOutput {
    /// A successful result.
    #[must_use]
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// A failed call, rendered as `<tool_use_error>` content.
    #[must_use]
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            content: format!("<tool_use_error>{message}</tool_use_error>"),
            is_error: true,
        }
    }

    /// A failed call the model must not retry (permission denials,
    /// read-before-edit violations).
    #[must_use]
    pub fn unrecoverable(message: impl std::fmt::Display) -> Self {
        Self {
            content: format!(
                "<tool_use_error>{message}</tool_use_error>\n<system-reminder>This error is \
                 unrecoverable: do not retry the call with the same arguments.</system-reminder>"
            ),
            is_error: true,
        }
    }

    /// The content string appended to the conversation.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Whether the call failed.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.is_error
    }

    /// Consume into the content string.
    #[must_use]
    pub fn into_content(self) -> String {
        self.content
    }
}

/// Runtime context handed to every tool call.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Instance name of the calling agent (may be `"<base>@<delegator>"`).
    pub agent: String,
    /// Base agent name, used to key shared per-agent state.
    pub base_agent: String,
    /// The agent's working directory.
    pub directory: PathBuf,
    /// Swarm-wide scratchpad.
    pub scratchpad: ScratchpadStorage,
    /// File read tracker.
    pub files: ReadTracker,
    /// Memory-entry read tracker.
    pub memory: ReadTracker,
    /// The chat's active-skill slot.
    pub skill: SkillSlot,
}

impl ToolContext {
    /// Context with fresh state handles, for standalone tool use and tests.
    #[must_use]
    pub fn new(agent: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        let agent = agent.into();
        Self {
            base_agent: agent.clone(),
            agent,
            directory: directory.into(),
            scratchpad: ScratchpadStorage::new(),
            files: ReadTracker::new(),
            memory: ReadTracker::new(),
            skill: SkillSlot::default(),
        }
    }

    /// Share a scratchpad.
    #[must_use]
    pub fn with_scratchpad(mut self, scratchpad: ScratchpadStorage) -> Self {
        self.scratchpad = scratchpad;
        self
    }

    /// Share read trackers.
    #[must_use]
    pub fn with_trackers(mut self, files: ReadTracker, memory: ReadTracker) -> Self {
        self.files = files;
        self.memory = memory;
        self
    }

    /// Set the base agent name (delegation instances).
    #[must_use]
    pub fn with_base_agent(mut self, base_agent: impl Into<String>) -> Self {
        self.base_agent = base_agent.into();
        self
    }

    /// Share a skill slot.
    #[must_use]
    pub fn with_skill(mut self, skill: SkillSlot) -> Self {
        self.skill = skill;
        self
    }

    /// Resolve a possibly-relative path against the agent's directory.
    #[must_use]
    pub fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.directory.join(candidate)
        }
    }
}

/// An executable tool.
///
/// Implementations are cheap to share (`Arc<dyn Tool>`) and must be
/// cancellation-safe: a dropped call future leaves no partial state behind
/// beyond what the tool has already committed.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as exposed to the model.
    fn name(&self) -> &str;

    /// Definition for function calling.
    fn definition(&self) -> ToolDefinition;

    /// Whether a skill may remove this tool from the active set.
    fn removable(&self) -> bool {
        true
    }

    /// Which arguments the permission layer inspects.
    fn surface(&self) -> PermissionSurface {
        PermissionSurface::None
    }

    /// Execute the tool.
    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolOutput;
}

/// Parse tool arguments, rendering a uniform error on mismatch.
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: &Value) -> Result<T, ToolOutput> {
    serde_json::from_value(args.clone())
        .map_err(|err| ToolOutput::error(format!("{tool}: invalid arguments: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_output_is_wrapped() {
        let output = ToolOutput::error("file not found");
        assert!(output.is_error());
        assert_eq!(
            output.content(),
            "<tool_use_error>file not found</tool_use_error>"
        );
    }

    #[test]
    fn unrecoverable_output_carries_reminder() {
        let output = ToolOutput::unrecoverable("Blocked by policy: **/.env");
        assert!(output.content().contains("Blocked by policy: **/.env"));
        assert!(output.content().contains("<system-reminder>"));
        assert!(output.content().contains("unrecoverable"));
    }

    #[test]
    fn context_resolves_relative_paths() {
        let ctx = ToolContext::new("lead", "/work");
        assert_eq!(ctx.resolve("src/main.rs"), PathBuf::from("/work/src/main.rs"));
        assert_eq!(ctx.resolve("/etc/hosts"), PathBuf::from("/etc/hosts"));
    }
}
