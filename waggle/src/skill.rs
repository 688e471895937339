//! Runtime projection of a loaded skill.
//!
//! A skill is a memory entry whose frontmatter may restrict the agent's
//! active tool set and override per-tool permissions while the skill is
//! loaded. Non-removable tools always survive the restriction.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::tool::ToolPermissions;

/// The active-skill state installed on a chat.
#[derive(Debug, Clone, Default)]
pub struct SkillState {
    /// Path of the skill entry that produced this state.
    pub file_path: PathBuf,
    /// Tool subset to expose; `None` or empty means no restriction.
    pub tools: Option<Vec<String>>,
    /// Per-tool permission overrides applied while the skill is active.
    pub permissions: HashMap<String, ToolPermissions>,
}

impl SkillState {
    /// Create a state for the skill at `file_path`.
    #[must_use]
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            tools: None,
            permissions: HashMap::new(),
        }
    }

    /// Restrict the active tool set.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Override permissions for one tool.
    #[must_use]
    pub fn with_permission(mut self, tool: impl Into<String>, policy: ToolPermissions) -> Self {
        self.permissions.insert(tool.into(), policy);
        self
    }

    /// Whether this state restricts the tool set at all.
    #[must_use]
    pub fn restricts_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|tools| !tools.is_empty())
    }

    /// Whether `tool` is in the restricted set.
    #[must_use]
    pub fn permits(&self, tool: &str) -> bool {
        match &self.tools {
            None => true,
            Some(tools) if tools.is_empty() => true,
            Some(tools) => tools.iter().any(|name| name == tool),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tool_list_means_no_restriction() {
        let state = SkillState::new("skills/review.md").with_tools(vec![]);
        assert!(!state.restricts_tools());
        assert!(state.permits("Bash"));
    }

    #[test]
    fn restricted_set_filters() {
        let state = SkillState::new("skills/review.md").with_tools(vec!["Read".into()]);
        assert!(state.restricts_tools());
        assert!(state.permits("Read"));
        assert!(!state.permits("Write"));
    }
}
