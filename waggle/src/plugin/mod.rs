//! Plugin API.
//!
//! A plugin contributes tools, system-prompt text, and lifecycle observers to
//! the agents of a swarm, plus opaque per-agent state for snapshots. Plugins
//! are registered explicitly on the swarm builder; nothing is discovered
//! implicitly.

pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::definition::AgentDefinition;
use crate::events::LogStream;
use crate::tool::Tool;

/// A swarm plugin.
///
/// Per-agent state must be keyed by the agent's *base* name so delegation
/// instances of one agent share storage.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Plugin name, used as the `plugin_configs` key.
    fn name(&self) -> &str;

    /// Tools contributed to an agent. Called once per chat construction.
    fn tools(&self, agent: &AgentDefinition) -> Vec<Arc<dyn Tool>>;

    /// Text appended to the agent's system prompt.
    fn system_prompt(&self, _agent: &AgentDefinition) -> Option<String> {
        None
    }

    /// An agent instance finished construction.
    async fn on_agent_initialized(&self, _agent: &str) {}

    /// A user message is about to enter `agent`'s conversation.
    ///
    /// Returned strings are injected as synthetic system messages before the
    /// user turn.
    async fn on_user_message(&self, _agent: &str, _message: &str, _log: &LogStream) -> Vec<String> {
        Vec::new()
    }

    /// An `execute` call is starting.
    async fn on_swarm_started(&self) {}

    /// An `execute` call finished.
    async fn on_swarm_stopped(&self) {}

    /// Opaque per-agent state for snapshots.
    fn snapshot(&self, _agent: &str) -> Option<Value> {
        None
    }

    /// Restore opaque per-agent state from a snapshot.
    fn restore(&self, _agent: &str, _state: &Value) {}
}

/// The plugins registered on one swarm.
#[derive(Clone, Default)]
pub struct PluginSet {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl std::fmt::Debug for PluginSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.plugins.iter().map(|plugin| plugin.name()).collect();
        f.debug_struct("PluginSet").field("plugins", &names).finish()
    }
}

impl PluginSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin.
    pub fn add(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// Whether any plugins are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Iterate over registered plugins.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins.iter()
    }

    /// All tools contributed to `agent`.
    #[must_use]
    pub fn tools_for(&self, agent: &AgentDefinition) -> Vec<Arc<dyn Tool>> {
        self.plugins
            .iter()
            .flat_map(|plugin| plugin.tools(agent))
            .collect()
    }

    /// Combined system-prompt contribution for `agent`.
    #[must_use]
    pub fn system_prompt_for(&self, agent: &AgentDefinition) -> Option<String> {
        let parts: Vec<String> = self
            .plugins
            .iter()
            .filter_map(|plugin| plugin.system_prompt(agent))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    /// Fan out a user message, collecting system reminders in plugin order.
    pub async fn on_user_message(&self, agent: &str, message: &str, log: &LogStream) -> Vec<String> {
        let mut reminders = Vec::new();
        for plugin in &self.plugins {
            reminders.extend(plugin.on_user_message(agent, message, log).await);
        }
        reminders
    }

    /// Notify agent construction.
    pub async fn on_agent_initialized(&self, agent: &str) {
        for plugin in &self.plugins {
            plugin.on_agent_initialized(agent).await;
        }
    }

    /// Notify execution start.
    pub async fn on_swarm_started(&self) {
        for plugin in &self.plugins {
            plugin.on_swarm_started().await;
        }
    }

    /// Notify execution end.
    pub async fn on_swarm_stopped(&self) {
        for plugin in &self.plugins {
            plugin.on_swarm_stopped().await;
        }
    }

    /// Collect per-agent plugin state, keyed by plugin name.
    #[must_use]
    pub fn snapshot_for(&self, agent: &str) -> HashMap<String, Value> {
        self.plugins
            .iter()
            .filter_map(|plugin| {
                plugin
                    .snapshot(agent)
                    .map(|state| (plugin.name().to_string(), state))
            })
            .collect()
    }

    /// Restore per-agent plugin state.
    pub fn restore_for(&self, agent: &str, states: &HashMap<String, Value>) {
        for plugin in &self.plugins {
            if let Some(state) = states.get(plugin.name()) {
                plugin.restore(agent, state);
            }
        }
    }
}
