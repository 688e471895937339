//! Snapshot and restore.
//!
//! A snapshot captures everything needed to resume a swarm: every live
//! conversation (top-level agents and per-caller delegation instances),
//! per-chat context state, plugin state, the scratchpad, and both read
//! trackers. Maps are ordered so that snapshot → restore → snapshot
//! round-trips to identical JSON.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StateError};
use crate::message::Message;
use crate::scratchpad::ScratchpadEntry;
use crate::skill::SkillState;
use crate::swarm::{NodeOrchestrator, Swarm};

/// Version this runtime writes.
pub const SNAPSHOT_VERSION: &str = "1.0.0";

/// What produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    /// A single swarm.
    Swarm,
    /// A workflow orchestrator (agent keys are `"<node>/<agent>"`).
    NodeOrchestrator,
}

impl std::fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Swarm => f.write_str("swarm"),
            Self::NodeOrchestrator => f.write_str("node_orchestrator"),
        }
    }
}

/// Swarm-level flags.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SwarmState {
    /// Whether the swarm has seen its first user message.
    pub first_message_sent: bool,
}

/// Per-chat context state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextState {
    /// Warning thresholds already fired.
    pub warning_thresholds_hit: BTreeSet<u8>,
    /// Whether compression has run for the current window.
    pub compression_applied: bool,
    /// Index of the last `TodoWrite` result in the log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_todowrite_message_index: Option<usize>,
    /// Path of the active skill entry, if a skill is loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_skill_path: Option<PathBuf>,
}

/// One chat's serialized state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// The full message log.
    pub conversation: Vec<Message>,
    /// Context bookkeeping.
    pub context_state: ContextState,
    /// Opaque plugin state, keyed by plugin name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plugin_state: BTreeMap<String, Value>,
}

/// A complete runtime snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format version.
    pub version: String,
    /// What produced the snapshot.
    #[serde(rename = "type")]
    pub kind: SnapshotKind,
    /// Swarm-level flags.
    pub swarm: SwarmState,
    /// Top-level agents by name.
    pub agents: BTreeMap<String, AgentSnapshot>,
    /// Per-caller delegation instances, keyed `"<base>@<delegator>"`.
    #[serde(default)]
    pub delegation_instances: BTreeMap<String, AgentSnapshot>,
    /// Scratchpad entries.
    #[serde(default)]
    pub scratchpad: BTreeMap<String, ScratchpadEntry>,
    /// File read tracker, agent → path → digest.
    #[serde(default)]
    pub read_tracking: BTreeMap<String, BTreeMap<String, String>>,
    /// Memory read tracker, agent → entry → digest.
    #[serde(default)]
    pub memory_read_tracking: BTreeMap<String, BTreeMap<String, String>>,
}

impl Snapshot {
    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON, checking the version.
    pub fn from_json(raw: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(raw)
            .map_err(|err| StateError::Malformed(err.to_string()))?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    fn check_version(&self) -> Result<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(StateError::VersionMismatch {
                expected: SNAPSHOT_VERSION.to_string(),
                found: self.version.clone(),
            }
            .into());
        }
        Ok(())
    }

    fn check_kind(&self, expected: SnapshotKind) -> Result<()> {
        self.check_version()?;
        if self.kind != expected {
            return Err(StateError::TypeMismatch {
                expected: expected.to_string(),
                found: self.kind.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn tracker_section(raw: HashMap<String, HashMap<String, String>>) -> BTreeMap<String, BTreeMap<String, String>> {
    raw.into_iter()
        .map(|(agent, paths)| (agent, paths.into_iter().collect()))
        .collect()
}

impl Swarm {
    /// Capture the current state of every live conversation.
    pub async fn snapshot(&self) -> Snapshot {
        let mut agents = BTreeMap::new();
        for (name, chat) in self.core.chats_snapshot().await {
            let guard = chat.lock().await;
            agents.insert(name, snapshot_chat(&guard, &self.core.services.plugins));
        }
        let mut delegation_instances = BTreeMap::new();
        for (key, chat) in self.core.delegation_snapshot().await {
            let guard = chat.lock().await;
            delegation_instances.insert(key, snapshot_chat(&guard, &self.core.services.plugins));
        }

        Snapshot {
            version: SNAPSHOT_VERSION.to_string(),
            kind: SnapshotKind::Swarm,
            swarm: SwarmState {
                first_message_sent: self
                    .core
                    .first_message_sent
                    .load(std::sync::atomic::Ordering::SeqCst),
            },
            agents,
            delegation_instances,
            scratchpad: self.core.services.scratchpad.export().into_iter().collect(),
            read_tracking: tracker_section(self.core.services.files.export()),
            memory_read_tracking: tracker_section(self.core.services.memory.export()),
        }
    }

    /// Restore a previously captured swarm snapshot.
    ///
    /// Conversations are rebuilt lazily: each named agent (and delegation
    /// instance) is constructed and its log, context state, skill, and plugin
    /// state replaced with the snapshot's.
    pub async fn restore(&self, snapshot: &Snapshot) -> Result<()> {
        snapshot.check_kind(SnapshotKind::Swarm)?;

        self.core.first_message_sent.store(
            snapshot.swarm.first_message_sent,
            std::sync::atomic::Ordering::SeqCst,
        );
        for (name, state) in &snapshot.agents {
            let chat = self.core.chat(name).await?;
            let mut guard = chat.lock().await;
            restore_chat(&mut guard, state, &self.core.services.plugins);
        }
        for (key, state) in &snapshot.delegation_instances {
            let (target, caller) = key
                .split_once('@')
                .ok_or_else(|| StateError::Malformed(format!(
                    "delegation instance key '{key}' is not '<base>@<delegator>'"
                )))?;
            let chat = self.core.delegation_instance(target, caller).await?;
            let mut guard = chat.lock().await;
            restore_chat(&mut guard, state, &self.core.services.plugins);
        }

        self.core
            .services
            .scratchpad
            .import(snapshot.scratchpad.clone().into_iter().collect());
        self.core.services.files.import(
            snapshot
                .read_tracking
                .iter()
                .map(|(agent, paths)| {
                    (agent.clone(), paths.clone().into_iter().collect())
                })
                .collect(),
        );
        self.core.services.memory.import(
            snapshot
                .memory_read_tracking
                .iter()
                .map(|(agent, paths)| {
                    (agent.clone(), paths.clone().into_iter().collect())
                })
                .collect(),
        );
        Ok(())
    }
}

fn snapshot_chat(chat: &crate::agent::Chat, plugins: &crate::plugin::PluginSet) -> AgentSnapshot {
    let tracker = chat.context_tracker();
    AgentSnapshot {
        conversation: chat.messages().to_vec(),
        context_state: ContextState {
            warning_thresholds_hit: tracker.thresholds_hit.clone(),
            compression_applied: tracker.compression_applied,
            last_todowrite_message_index: tracker.last_todowrite_index,
            active_skill_path: chat.skill_state().map(|skill| skill.file_path),
        },
        plugin_state: plugins
            .snapshot_for(chat.base_name())
            .into_iter()
            .collect(),
    }
}

fn restore_chat(
    chat: &mut crate::agent::Chat,
    state: &AgentSnapshot,
    plugins: &crate::plugin::PluginSet,
) {
    chat.set_messages(state.conversation.clone());
    let tracker = chat.context_tracker_mut();
    tracker.thresholds_hit = state.context_state.warning_thresholds_hit.clone();
    tracker.compression_applied = state.context_state.compression_applied;
    tracker.last_todowrite_index = state.context_state.last_todowrite_message_index;

    match &state.context_state.active_skill_path {
        Some(path) => chat.load_skill_state(reload_skill(path)),
        None => chat.clear_skill(),
    }
    plugins.restore_for(
        chat.base_name(),
        &state.plugin_state.clone().into_iter().collect(),
    );
}

/// Rebuild a skill state from its on-disk entry.
///
/// When the entry is gone the path alone is kept, which leaves the tool set
/// unrestricted until the skill is loaded again.
fn reload_skill(path: &Path) -> SkillState {
    crate::plugin::memory::load_skill_file(path).unwrap_or_else(|_| SkillState::new(path))
}

impl NodeOrchestrator {
    /// Restore node swarms from an orchestrator snapshot.
    ///
    /// Keys are split on their `"<node>/"` prefix and each group is fed to
    /// the matching node swarm as a regular swarm snapshot.
    pub async fn restore(&self, snapshot: &Snapshot) -> Result<()> {
        snapshot.check_kind(SnapshotKind::NodeOrchestrator)?;

        fn section<'a>(
            per_node: &'a mut BTreeMap<String, Snapshot>,
            node: &str,
            first_message_sent: bool,
        ) -> &'a mut Snapshot {
            per_node.entry(node.to_string()).or_insert_with(|| Snapshot {
                version: SNAPSHOT_VERSION.to_string(),
                kind: SnapshotKind::Swarm,
                swarm: SwarmState { first_message_sent },
                agents: BTreeMap::new(),
                delegation_instances: BTreeMap::new(),
                scratchpad: BTreeMap::new(),
                read_tracking: BTreeMap::new(),
                memory_read_tracking: BTreeMap::new(),
            })
        }

        let mut per_node: BTreeMap<String, Snapshot> = BTreeMap::new();
        let sent = snapshot.swarm.first_message_sent;
        for (key, state) in &snapshot.agents {
            if let Some((node, agent)) = key.split_once('/') {
                section(&mut per_node, node, sent)
                    .agents
                    .insert(agent.to_string(), state.clone());
            }
        }
        for (key, state) in &snapshot.delegation_instances {
            if let Some((node, instance)) = key.split_once('/') {
                section(&mut per_node, node, sent)
                    .delegation_instances
                    .insert(instance.to_string(), state.clone());
            }
        }
        for (key, entry) in &snapshot.scratchpad {
            if let Some((node, path)) = key.split_once('/') {
                section(&mut per_node, node, sent)
                    .scratchpad
                    .insert(path.to_string(), entry.clone());
            }
        }
        for (key, paths) in &snapshot.read_tracking {
            if let Some((node, agent)) = key.split_once('/') {
                section(&mut per_node, node, sent)
                    .read_tracking
                    .insert(agent.to_string(), paths.clone());
            }
        }
        for (key, paths) in &snapshot.memory_read_tracking {
            if let Some((node, agent)) = key.split_once('/') {
                section(&mut per_node, node, sent)
                    .memory_read_tracking
                    .insert(agent.to_string(), paths.clone());
            }
        }

        for (node, node_snapshot) in per_node {
            let swarm = self.node_swarm(&node).await?;
            swarm.restore(&node_snapshot).await?;
        }
        Ok(())
    }

    /// Capture all cached node swarms, prefixing keys with `"<node>/"`.
    pub async fn snapshot(&self) -> Snapshot {
        let mut combined = Snapshot {
            version: SNAPSHOT_VERSION.to_string(),
            kind: SnapshotKind::NodeOrchestrator,
            swarm: SwarmState::default(),
            agents: BTreeMap::new(),
            delegation_instances: BTreeMap::new(),
            scratchpad: BTreeMap::new(),
            read_tracking: BTreeMap::new(),
            memory_read_tracking: BTreeMap::new(),
        };
        for (node, swarm) in self.cached_swarms().await {
            let snapshot = swarm.snapshot().await;
            combined.swarm.first_message_sent |= snapshot.swarm.first_message_sent;
            for (key, state) in snapshot.agents {
                combined.agents.insert(format!("{node}/{key}"), state);
            }
            for (key, state) in snapshot.delegation_instances {
                combined
                    .delegation_instances
                    .insert(format!("{node}/{key}"), state);
            }
            for (key, entry) in snapshot.scratchpad {
                combined.scratchpad.insert(format!("{node}/{key}"), entry);
            }
            for (key, paths) in snapshot.read_tracking {
                combined.read_tracking.insert(format!("{node}/{key}"), paths);
            }
            for (key, paths) in snapshot.memory_read_tracking {
                combined
                    .memory_read_tracking
                    .insert(format!("{node}/{key}"), paths);
            }
        }
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_mismatch_is_rejected() {
        let raw = serde_json::json!({
            "version": "0.9.0",
            "type": "swarm",
            "swarm": {"first_message_sent": false},
            "agents": {}
        })
        .to_string();
        let err = Snapshot::from_json(&raw).unwrap_err();
        assert!(err.to_string().contains("version mismatch"));
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let raw = serde_json::json!({
            "version": "1.0.0",
            "type": "node_orchestrator",
            "swarm": {"first_message_sent": false},
            "agents": {}
        })
        .to_string();
        let snapshot = Snapshot::from_json(&raw).expect("parses");
        let err = snapshot.check_kind(SnapshotKind::Swarm).unwrap_err();
        assert!(err.to_string().contains("type mismatch"));
    }

    #[test]
    fn context_state_accepts_legacy_skill_field() {
        // Older snapshots wrote `active_skill_path` directly; it must parse.
        let raw = serde_json::json!({
            "warning_thresholds_hit": [60, 80],
            "compression_applied": true,
            "active_skill_path": "skills/review.md"
        })
        .to_string();
        let state: ContextState = serde_json::from_str(&raw).expect("parses");
        assert_eq!(
            state.active_skill_path.as_deref(),
            Some(Path::new("skills/review.md"))
        );
        assert!(state.compression_applied);
        assert_eq!(state.warning_thresholds_hit.len(), 2);
    }
}
