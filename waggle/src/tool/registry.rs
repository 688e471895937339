//! Tool registry and active-tool resolution.
//!
//! The registry maps tool names to entries in registration order. An entry
//! keeps both the working instance (possibly permission-wrapped) and the bare
//! base instance, so skill permission overrides can rewrap from the original
//! rather than stacking validators.

use std::sync::Arc;

use crate::error::ConfigError;
use crate::skill::SkillState;

use super::{PermissionValidator, Tool};

/// Where a tool came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSource {
    /// Part of the built-in catalog.
    Builtin,
    /// Contributed by a plugin (including delegation tools).
    Plugin,
}

/// One registered tool.
#[derive(Clone)]
pub struct ToolEntry {
    /// The instance dispatched at call time.
    pub instance: Arc<dyn Tool>,
    /// The unwrapped instance, used when a skill overrides permissions.
    pub base_instance: Arc<dyn Tool>,
    /// Whether skills may drop this tool from the active set.
    pub removable: bool,
    /// Origin of the tool.
    pub source: ToolSource,
}

impl std::fmt::Debug for ToolEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolEntry")
            .field("name", &self.instance.name())
            .field("removable", &self.removable)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Name-keyed tool table with insertion order.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    entries: Vec<(String, ToolEntry)>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool whose working instance is also its base instance.
    pub fn register(&mut self, instance: Arc<dyn Tool>, source: ToolSource) {
        let base = Arc::clone(&instance);
        self.register_wrapped(instance, base, source);
    }

    /// Register a tool with a distinct base instance (permission-wrapped).
    pub fn register_wrapped(
        &mut self,
        instance: Arc<dyn Tool>,
        base_instance: Arc<dyn Tool>,
        source: ToolSource,
    ) {
        let name = instance.name().to_string();
        let removable = instance.removable();
        let entry = ToolEntry {
            instance,
            base_instance,
            removable,
            source,
        };
        if let Some(existing) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            existing.1 = entry;
        } else {
            self.entries.push((name, entry));
        }
    }

    /// Remove a tool by name.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| n != name);
    }

    /// Look up an entry.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolEntry> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, entry)| entry)
    }

    /// Whether a tool is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered names in insertion order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the active tool set under an optional skill state.
    ///
    /// Without a restriction every registered tool is active. With one, the
    /// active set is the restriction intersected with the registry, plus all
    /// non-removable tools. Skill permission overrides rewrap the base
    /// instance with a fresh validator.
    pub fn active_tools(
        &self,
        skill: Option<&SkillState>,
    ) -> Result<Vec<(String, Arc<dyn Tool>)>, ConfigError> {
        let mut active = Vec::with_capacity(self.entries.len());
        for (name, entry) in &self.entries {
            let selected = match skill {
                Some(state) if state.restricts_tools() => {
                    !entry.removable || state.permits(name)
                }
                _ => true,
            };
            if !selected {
                continue;
            }
            let instance = match skill.and_then(|state| state.permissions.get(name)) {
                Some(policy) => {
                    PermissionValidator::wrap(Arc::clone(&entry.base_instance), policy)?
                }
                None => Arc::clone(&entry.instance),
            };
            active.push((name.clone(), instance));
        }
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{PermissionSurface, ToolContext, ToolDefinition, ToolOutput};
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct Fixed {
        name: &'static str,
        removable: bool,
    }

    #[async_trait]
    impl Tool for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new(self.name, "fixture", json!({"type": "object"}))
        }

        fn removable(&self) -> bool {
            self.removable
        }

        fn surface(&self) -> PermissionSurface {
            PermissionSurface::None
        }

        async fn call(&self, _ctx: &ToolContext, _args: Value) -> ToolOutput {
            ToolOutput::ok(self.name)
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for (name, removable) in [
            ("Read", true),
            ("Write", true),
            ("Bash", true),
            ("Think", false),
            ("Clock", false),
            ("MemoryRead", false),
        ] {
            registry.register(Arc::new(Fixed { name, removable }), ToolSource::Builtin);
        }
        registry
    }

    fn names(active: &[(String, Arc<dyn Tool>)]) -> Vec<&str> {
        active.iter().map(|(name, _)| name.as_str()).collect()
    }

    #[test]
    fn no_skill_exposes_everything() {
        let registry = registry();
        let active = registry.active_tools(None).expect("resolve");
        assert_eq!(active.len(), 6);
    }

    #[test]
    fn skill_restriction_keeps_non_removable() {
        let registry = registry();
        let skill = SkillState::new("s.md").with_tools(vec!["Read".into()]);
        let active = registry.active_tools(Some(&skill)).expect("resolve");
        assert_eq!(names(&active), vec!["Read", "Think", "Clock", "MemoryRead"]);
    }

    #[test]
    fn empty_restriction_is_no_restriction() {
        let registry = registry();
        let skill = SkillState::new("s.md").with_tools(vec![]);
        let active = registry.active_tools(Some(&skill)).expect("resolve");
        assert_eq!(active.len(), 6);
    }

    #[test]
    fn clearing_skill_restores_full_set() {
        let registry = registry();
        let skill = SkillState::new("s.md").with_tools(vec!["Read".into()]);
        let restricted = registry.active_tools(Some(&skill)).expect("resolve");
        assert_eq!(restricted.len(), 4);

        let restored = registry.active_tools(None).expect("resolve");
        assert_eq!(
            names(&restored),
            vec!["Read", "Write", "Bash", "Think", "Clock", "MemoryRead"]
        );
    }

    #[test]
    fn reregistering_replaces_in_place() {
        let mut registry = registry();
        registry.register(
            Arc::new(Fixed {
                name: "Read",
                removable: true,
            }),
            ToolSource::Plugin,
        );
        assert_eq!(registry.len(), 6);
        assert_eq!(registry.get("Read").map(|e| e.source), Some(ToolSource::Plugin));
        // Order preserved.
        assert_eq!(registry.names()[0], "Read");
    }
}
