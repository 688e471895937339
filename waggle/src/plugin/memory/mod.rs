//! Semantic memory plugin.
//!
//! Gives each agent a persistent, file-backed memory with hybrid
//! semantic+keyword search, skill entries that can swap the agent's active
//! tool set, and automatic discovery: every user message is searched against
//! the agent's memory and relevant hits are injected as system reminders
//! before the turn.

pub mod search;
pub(crate) mod skill;
mod store;
mod tools;

pub use search::{
    ADAPTIVE_WORD_CUTOFF, BagOfWordsEmbedder, DISCOVERY_THRESHOLD, DISCOVERY_THRESHOLD_SHORT,
    Embedder, SearchHit, SearchWeights, adaptive_threshold, cosine_similarity, hybrid_search,
};
pub use skill::load_skill_file;
pub use store::{FrontMatter, IndexEntry, MemoryEntry, MemoryStore, parse_entry};

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::definition::AgentDefinition;
use crate::events::{LogStream, SwarmEvent};
use crate::plugin::Plugin;
use crate::tool::Tool;

use tools::{
    MemoryDefragTool, MemoryDeleteTool, MemoryEditTool, MemoryGlobTool, MemoryGrepTool,
    MemoryMultiEditTool, MemoryReadTool, MemorySearchTool, MemoryToolSet, MemoryWriteTool,
};

/// How much of the memory tool set an agent sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryMode {
    /// Read, Glob, Grep, Search.
    ReadOnly,
    /// Reading plus Write and Edit.
    #[default]
    ReadWrite,
    /// Everything, including MultiEdit, Delete, and Defrag.
    FullAccess,
}

impl std::str::FromStr for MemoryMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "read_only" => Ok(Self::ReadOnly),
            "read_write" => Ok(Self::ReadWrite),
            "full_access" => Ok(Self::FullAccess),
            other => Err(format!("unknown memory mode {other:?}")),
        }
    }
}

/// Parsed per-agent plugin configuration.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Directory holding the agent's entries.
    pub directory: PathBuf,
    /// Visible tool set.
    pub mode: MemoryMode,
}

impl MemoryConfig {
    /// Parse from the agent's opaque `plugin_configs["memory"]` value.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let directory = value.get("directory")?.as_str()?;
        let mode = value
            .get("mode")
            .and_then(Value::as_str)
            .and_then(|mode| mode.parse().ok())
            .unwrap_or_default();
        Some(Self {
            directory: PathBuf::from(directory),
            mode,
        })
    }
}

/// The memory plugin. Register on the swarm builder; agents opt in through
/// `plugin_configs["memory"] = {"directory": …, "mode": …}`.
pub struct MemoryPlugin {
    embedder: Arc<dyn Embedder>,
    sets: Mutex<HashMap<String, Arc<MemoryToolSet>>>,
}

impl std::fmt::Debug for MemoryPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPlugin").finish_non_exhaustive()
    }
}

impl MemoryPlugin {
    /// Plugin with the given embedder.
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            sets: Mutex::new(HashMap::new()),
        }
    }

    /// Plugin with the built-in deterministic embedder.
    #[must_use]
    pub fn with_default_embedder() -> Self {
        Self::new(Arc::new(BagOfWordsEmbedder))
    }

    /// The store backing `agent`'s memory, if one was opened.
    #[must_use]
    pub fn store(&self, agent: &str) -> Option<Arc<MemoryStore>> {
        self.sets
            .lock()
            .ok()?
            .get(agent)
            .map(|set| Arc::clone(&set.store))
    }

    fn set_for(&self, agent: &str, directory: &std::path::Path) -> Option<Arc<MemoryToolSet>> {
        if let Ok(sets) = self.sets.lock() {
            if let Some(set) = sets.get(agent) {
                return Some(Arc::clone(set));
            }
        }
        let store = match MemoryStore::open(directory) {
            Ok(store) => Arc::new(store),
            Err(err) => {
                warn!(agent, directory = %directory.display(), error = %err, "memory store open failed");
                return None;
            }
        };
        let set = Arc::new(MemoryToolSet {
            store,
            embedder: Arc::clone(&self.embedder),
        });
        if let Ok(mut sets) = self.sets.lock() {
            sets.insert(agent.to_string(), Arc::clone(&set));
        }
        Some(set)
    }
}

#[async_trait]
impl Plugin for MemoryPlugin {
    fn name(&self) -> &str {
        "memory"
    }

    fn tools(&self, agent: &AgentDefinition) -> Vec<Arc<dyn Tool>> {
        let Some(config) = agent
            .plugin_configs
            .get("memory")
            .and_then(MemoryConfig::from_value)
        else {
            return Vec::new();
        };
        let Some(set) = self.set_for(&agent.name, &config.directory) else {
            return Vec::new();
        };

        let mut tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(MemoryReadTool(Arc::clone(&set))),
            Arc::new(MemoryGlobTool(Arc::clone(&set))),
            Arc::new(MemoryGrepTool(Arc::clone(&set))),
            Arc::new(MemorySearchTool(Arc::clone(&set))),
            Arc::new(skill::LoadSkillTool(Arc::clone(&set))),
        ];
        if matches!(config.mode, MemoryMode::ReadWrite | MemoryMode::FullAccess) {
            tools.push(Arc::new(MemoryWriteTool(Arc::clone(&set))));
            tools.push(Arc::new(MemoryEditTool(Arc::clone(&set))));
        }
        if config.mode == MemoryMode::FullAccess {
            tools.push(Arc::new(MemoryMultiEditTool(Arc::clone(&set))));
            tools.push(Arc::new(MemoryDeleteTool(Arc::clone(&set))));
            tools.push(Arc::new(MemoryDefragTool(Arc::clone(&set))));
        }
        tools
    }

    fn system_prompt(&self, agent: &AgentDefinition) -> Option<String> {
        let config = agent
            .plugin_configs
            .get("memory")
            .and_then(MemoryConfig::from_value)?;
        Some(format!(
            "You have a persistent memory at {}. Entries are Markdown files with YAML \
             frontmatter (type, tags, domain) organized as <category>/<slug>.md. Use \
             MemorySearch to recall, MemoryRead before editing, and LoadSkill to activate \
             skill entries.",
            config.directory.display()
        ))
    }

    async fn on_user_message(&self, agent: &str, message: &str, log: &LogStream) -> Vec<String> {
        let Some(set) = self
            .sets
            .lock()
            .ok()
            .and_then(|sets| sets.get(agent).map(Arc::clone))
        else {
            return Vec::new();
        };

        let threshold = adaptive_threshold(message);
        let weights = SearchWeights::default();
        // Skill discovery and general recall run concurrently.
        let (skills, general) = tokio::join!(
            hybrid_search(
                &set.store,
                &set.embedder,
                message,
                3,
                threshold,
                Some(&["skill"]),
                weights,
            ),
            hybrid_search(&set.store, &set.embedder, message, 10, 0.0, None, weights),
        );

        log.emit(
            Some(agent),
            SwarmEvent::SemanticSkillSearch {
                threshold,
                hits: skills.len(),
            },
        );
        let memories: Vec<SearchHit> = general
            .into_iter()
            .filter(|hit| {
                matches!(
                    hit.entry_type.as_deref(),
                    Some("concept" | "fact" | "experience")
                ) && hit.score >= threshold
            })
            .take(3)
            .collect();
        log.emit(
            Some(agent),
            SwarmEvent::SemanticMemorySearch {
                hits: memories.len(),
            },
        );

        let mut reminders = Vec::new();
        if !skills.is_empty() {
            let mut text = String::from(
                "<system-reminder>Skills in memory that may fit this request:\n",
            );
            for hit in &skills {
                let _ = writeln!(text, "- {} ({}, score {:.2})", hit.title, hit.path, hit.score);
            }
            text.push_str(
                "Activate one with LoadSkill(skill_path: \"…\") if it matches the task.\
                 </system-reminder>",
            );
            reminders.push(text);
        }
        if !memories.is_empty() {
            let mut text =
                String::from("<system-reminder>Memories that may be relevant:\n");
            for hit in &memories {
                let _ = writeln!(
                    text,
                    "- {} ({}, {}, score {:.2})",
                    hit.title,
                    hit.path,
                    hit.entry_type.as_deref().unwrap_or("note"),
                    hit.score
                );
            }
            text.push_str("Read one with MemoryRead if useful.</system-reminder>");
            reminders.push(text);
        }
        reminders
    }
}
