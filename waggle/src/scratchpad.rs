//! Volatile shared scratchpad.
//!
//! A process-local key-value store shared by every agent in a swarm and
//! cleared at teardown. Mutations are serialized; concurrent writers to
//! different paths are last-write-wins per path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One scratchpad entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScratchpadEntry {
    /// Stored content.
    pub content: String,
    /// Agent that last wrote the entry.
    pub owner_agent: String,
    /// Creation time of the entry.
    pub created_at: DateTime<Utc>,
}

/// Shared scratchpad storage. Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct ScratchpadStorage {
    entries: Arc<Mutex<HashMap<String, ScratchpadEntry>>>,
}

impl ScratchpadStorage {
    /// Create an empty scratchpad.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an entry, replacing any previous content at `path`.
    pub fn write(&self, path: impl Into<String>, content: impl Into<String>, owner: &str) {
        let entry = ScratchpadEntry {
            content: content.into(),
            owner_agent: owner.to_string(),
            created_at: Utc::now(),
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(path.into(), entry);
        }
    }

    /// Read an entry.
    #[must_use]
    pub fn read(&self, path: &str) -> Option<ScratchpadEntry> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(path).cloned())
    }

    /// List `(path, owner, byte size)` for all entries, sorted by path.
    #[must_use]
    pub fn list(&self) -> Vec<(String, String, usize)> {
        let mut rows: Vec<(String, String, usize)> = self
            .entries
            .lock()
            .map(|entries| {
                entries
                    .iter()
                    .map(|(path, entry)| {
                        (path.clone(), entry.owner_agent.clone(), entry.content.len())
                    })
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Whether the scratchpad is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Copy the full map out, for snapshots.
    #[must_use]
    pub fn export(&self) -> HashMap<String, ScratchpadEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Replace the full map, for restore.
    pub fn import(&self, entries: HashMap<String, ScratchpadEntry>) {
        if let Ok(mut current) = self.entries.lock() {
            *current = entries;
        }
    }
}
