//! Read-before-edit tracking.
//!
//! Mutating tools (`Edit`, `MultiEdit`, `Write` over existing content, and
//! their memory counterparts) must observe the current resource first. The
//! tracker records a SHA-256 digest per `(agent, path)` at read time; an edit
//! is admitted only while the stored digest still matches the resource.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a byte slice.
#[must_use]
pub fn digest_of(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// Per-agent map of resource path to last-read digest.
///
/// One instance tracks file reads and a second, independent instance tracks
/// memory-entry reads. Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct ReadTracker {
    entries: Arc<Mutex<HashMap<String, HashMap<String, String>>>>,
}

impl ReadTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `agent` observed `path` with the given digest.
    pub fn record(&self, agent: &str, path: &str, digest: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries
                .entry(agent.to_string())
                .or_default()
                .insert(path.to_string(), digest.into());
        }
    }

    /// Digest recorded for `(agent, path)`, if any.
    #[must_use]
    pub fn digest(&self, agent: &str, path: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(agent)?.get(path).cloned())
    }

    /// Whether the stored digest for `(agent, path)` matches `current`.
    #[must_use]
    pub fn is_current(&self, agent: &str, path: &str, current: &str) -> bool {
        self.digest(agent, path).as_deref() == Some(current)
    }

    /// Forget a single path for an agent (after deletion of the resource).
    pub fn forget(&self, agent: &str, path: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            if let Some(paths) = entries.get_mut(agent) {
                paths.remove(path);
            }
        }
    }

    /// Copy the full map out, for snapshots.
    #[must_use]
    pub fn export(&self) -> HashMap<String, HashMap<String, String>> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Replace the full map, for restore.
    pub fn import(&self, entries: HashMap<String, HashMap<String, String>>) {
        if let Ok(mut current) = self.entries.lock() {
            *current = entries;
        }
    }

    /// Remove all state.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_hex() {
        let digest = digest_of(b"hello");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, digest_of(b"hello"));
        assert_ne!(digest, digest_of(b"hello "));
    }

    #[test]
    fn record_and_verify() {
        let tracker = ReadTracker::new();
        let digest = digest_of(b"content");
        tracker.record("lead", "/tmp/a.txt", digest.clone());

        assert!(tracker.is_current("lead", "/tmp/a.txt", &digest));
        assert!(!tracker.is_current("lead", "/tmp/a.txt", &digest_of(b"changed")));
        assert!(!tracker.is_current("other", "/tmp/a.txt", &digest));
    }

    #[test]
    fn forget_removes_entry() {
        let tracker = ReadTracker::new();
        tracker.record("lead", "x", "d");
        tracker.forget("lead", "x");
        assert!(tracker.digest("lead", "x").is_none());
    }

    #[test]
    fn export_import_roundtrip() {
        let tracker = ReadTracker::new();
        tracker.record("lead", "x", "d1");
        tracker.record("scout", "y", "d2");

        let exported = tracker.export();
        let restored = ReadTracker::new();
        restored.import(exported);
        assert_eq!(restored.digest("scout", "y").as_deref(), Some("d2"));
    }
}
