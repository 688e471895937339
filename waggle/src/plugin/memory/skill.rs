//! Skill activation.
//!
//! A skill is a memory entry of `type: skill` whose frontmatter may restrict
//! the agent's tool set (`tools:`) and override per-tool permissions
//! (`permissions:`) while loaded. `LoadSkill` installs that state on the
//! calling chat through the shared skill slot; calling it without a path
//! clears the active skill and restores the full tool set.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{Error, Result, StateError};
use crate::skill::SkillState;
use crate::tool::{PermissionValidator, Tool, ToolContext, ToolDefinition, ToolOutput, parse_args};
use crate::tools::ThinkTool;

use super::store::{MemoryEntry, parse_entry};
use super::tools::MemoryToolSet;

/// Build the runtime skill state from a parsed entry.
pub(super) fn skill_state_from_entry(file_path: &Path, entry: &MemoryEntry) -> SkillState {
    let mut state = SkillState::new(file_path);
    if let Some(tools) = &entry.front.tools {
        state = state.with_tools(tools.clone());
    }
    if let Some(permissions) = &entry.front.permissions {
        for (tool, policy) in permissions {
            state = state.with_permission(tool, policy.clone());
        }
    }
    state
}

/// Rebuild a [`SkillState`] from a skill file on disk.
///
/// Used by snapshot restore, where only the skill path was persisted.
pub fn load_skill_file(path: &Path) -> Result<SkillState> {
    let raw = std::fs::read_to_string(path)?;
    let entry = parse_entry(&path.to_string_lossy(), &raw);
    if entry.front.entry_type.as_deref() != Some("skill") {
        return Err(Error::State(StateError::Malformed(format!(
            "'{}' is not a skill entry",
            path.display()
        ))));
    }
    Ok(skill_state_from_entry(path, &entry))
}

/// Load (or clear) the agent's active skill.
pub(super) struct LoadSkillTool(pub Arc<MemoryToolSet>);

#[derive(Deserialize)]
struct LoadSkillArgs {
    #[serde(default)]
    skill_path: Option<String>,
}

#[async_trait]
impl Tool for LoadSkillTool {
    fn name(&self) -> &str {
        "LoadSkill"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "LoadSkill",
            "Activate a skill from memory, swapping the active tool set to the skill's \
             declaration. Call without skill_path to clear the active skill.",
            json!({
                "type": "object",
                "properties": {
                    "skill_path": {
                        "type": "string",
                        "description": "Path of a `type: skill` memory entry; omit to clear."
                    }
                }
            }),
        )
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolOutput {
        let args: LoadSkillArgs = match parse_args(self.name(), &args) {
            Ok(args) => args,
            Err(output) => return output,
        };

        let Some(path) = args.skill_path else {
            if let Ok(mut slot) = ctx.skill.write() {
                *slot = None;
            }
            return ToolOutput::ok("Skill cleared; full tool set restored.");
        };

        let entry = match self.0.store.read(&path) {
            Ok(entry) => entry,
            Err(reason) => return ToolOutput::error(format!("LoadSkill: {reason}")),
        };
        if entry.front.entry_type.as_deref() != Some("skill") {
            return ToolOutput::error(format!(
                "LoadSkill: '{path}' is not a skill entry (type must be 'skill')"
            ));
        }

        let file_path = match self.0.store.resolve(&path) {
            Ok(file_path) => file_path,
            Err(reason) => return ToolOutput::error(format!("LoadSkill: {reason}")),
        };
        let state = skill_state_from_entry(&file_path, &entry);

        // Reject unloadable permission overrides now rather than on the next
        // provider request.
        for (tool, policy) in &state.permissions {
            if let Err(err) = PermissionValidator::wrap(Arc::new(ThinkTool), policy) {
                return ToolOutput::error(format!(
                    "LoadSkill: invalid permissions for '{tool}': {err}"
                ));
            }
        }

        let summary = match &state.tools {
            Some(tools) if !tools.is_empty() => format!("tools restricted to: {}", tools.join(", ")),
            _ => "no tool restriction".to_string(),
        };
        if let Ok(mut slot) = ctx.skill.write() {
            *slot = Some(state);
        }
        ToolOutput::ok(format!("Skill loaded: {path} ({summary})"))
    }
}

#[cfg(test)]
mod tests {
    use super::super::search::BagOfWordsEmbedder;
    use super::super::store::MemoryStore;
    use super::*;

    const SKILL: &str = "---\ntype: skill\ntags: [review]\ntools:\n  - Read\n  - Grep\npermissions:\n  Read:\n    allowed_paths:\n      - \"src/**\"\n---\n# Review\nReview things.\n";

    fn set(dir: &std::path::Path) -> Arc<MemoryToolSet> {
        Arc::new(MemoryToolSet {
            store: Arc::new(MemoryStore::open(dir.join("memory")).expect("open")),
            embedder: Arc::new(BagOfWordsEmbedder),
        })
    }

    #[tokio::test]
    async fn load_skill_installs_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let set = set(dir.path());
        set.store.write("skills/review.md", SKILL).expect("write");
        let ctx = ToolContext::new("lead", ".");

        let output = LoadSkillTool(Arc::clone(&set))
            .call(&ctx, json!({"skill_path": "skills/review.md"}))
            .await;
        assert!(!output.is_error());
        assert!(output.content().contains("Read, Grep"));

        let state = ctx.skill.read().expect("slot").clone().expect("loaded");
        assert!(state.permits("Read"));
        assert!(!state.permits("Bash"));
        assert!(state.permissions.contains_key("Read"));
    }

    #[tokio::test]
    async fn clearing_restores_full_set() {
        let dir = tempfile::tempdir().expect("tempdir");
        let set = set(dir.path());
        set.store.write("skills/review.md", SKILL).expect("write");
        let ctx = ToolContext::new("lead", ".");

        LoadSkillTool(Arc::clone(&set))
            .call(&ctx, json!({"skill_path": "skills/review.md"}))
            .await;
        let cleared = LoadSkillTool(Arc::clone(&set)).call(&ctx, json!({})).await;
        assert!(!cleared.is_error());
        assert!(ctx.skill.read().expect("slot").is_none());
    }

    #[tokio::test]
    async fn non_skill_entries_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let set = set(dir.path());
        set.store
            .write("facts/a.md", "---\ntype: fact\n---\nnot a skill")
            .expect("write");
        let ctx = ToolContext::new("lead", ".");

        let output = LoadSkillTool(Arc::clone(&set))
            .call(&ctx, json!({"skill_path": "facts/a.md"}))
            .await;
        assert!(output.is_error());
        assert!(output.content().contains("not a skill entry"));
    }

    #[test]
    fn skill_file_reload_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("review.md");
        std::fs::write(&path, SKILL).expect("write");

        let state = load_skill_file(&path).expect("load");
        assert_eq!(state.file_path, path);
        assert!(state.restricts_tools());
    }
}
