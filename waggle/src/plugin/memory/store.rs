//! Filesystem memory store.
//!
//! Entries live as `<category>/<slug>.md` files with YAML frontmatter and a
//! Markdown body. A `memory.json` file alongside holds the embeddings index,
//! keyed by entry path with the digest the embedding was computed from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::tool::ToolPermissions;
use crate::tracker::digest_of;

/// YAML frontmatter of a memory entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrontMatter {
    /// Entry type: `skill`, `concept`, `fact`, `experience`, …
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<String>,
    /// Author confidence in the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Keyword tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Domain the entry belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// For skills: the tool subset to expose while loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    /// For skills: per-tool permission overrides while loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<HashMap<String, ToolPermissions>>,
    /// Related entry paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<Vec<String>>,
}

/// A parsed memory entry.
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    /// Path relative to the store root, e.g. `concepts/retries.md`.
    pub path: String,
    /// First Markdown heading, or the slug when there is none.
    pub title: String,
    /// Parsed frontmatter.
    pub front: FrontMatter,
    /// Markdown body (without frontmatter).
    pub body: String,
    /// The raw file content, what digests cover.
    pub raw: String,
}

/// Parse an entry file into frontmatter and body.
pub fn parse_entry(path: &str, raw: &str) -> MemoryEntry {
    let (front, body) = split_frontmatter(raw);
    let front: FrontMatter = front
        .and_then(|source| serde_yaml::from_str(source).ok())
        .unwrap_or_default();
    let title = body
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map_or_else(
            || {
                Path::new(path)
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.to_string())
            },
            str::to_string,
        );
    MemoryEntry {
        path: path.to_string(),
        title,
        front,
        body: body.to_string(),
        raw: raw.to_string(),
    }
}

fn split_frontmatter(raw: &str) -> (Option<&str>, &str) {
    let Some(rest) = raw.strip_prefix("---\n") else {
        return (None, raw);
    };
    match rest.split_once("\n---\n") {
        Some((front, body)) => (Some(front), body),
        None => (None, raw),
    }
}

/// One embeddings-index row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Embedding vector of the entry body.
    pub embedding: Vec<f32>,
    /// Digest of the raw content the embedding was computed from.
    pub digest: String,
}

const INDEX_FILE: &str = "memory.json";

/// A per-agent memory directory plus its embeddings index.
#[derive(Debug)]
pub struct MemoryStore {
    root: PathBuf,
    index: Mutex<HashMap<String, IndexEntry>>,
}

impl MemoryStore {
    /// Open (creating if needed) the store at `root`.
    pub fn open(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let index = match std::fs::read_to_string(root.join(INDEX_FILE)) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => HashMap::new(),
        };
        Ok(Self {
            root,
            index: Mutex::new(index),
        })
    }

    /// The store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an entry path, rejecting traversal out of the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, String> {
        let candidate = Path::new(path);
        if candidate.is_absolute()
            || candidate
                .components()
                .any(|part| matches!(part, std::path::Component::ParentDir))
        {
            return Err(format!("invalid memory path {path:?}"));
        }
        Ok(self.root.join(candidate))
    }

    /// Read and parse an entry.
    pub fn read(&self, path: &str) -> Result<MemoryEntry, String> {
        let file = self.resolve(path)?;
        let raw = std::fs::read_to_string(&file)
            .map_err(|_| format!("memory entry does not exist: {path}"))?;
        Ok(parse_entry(path, &raw))
    }

    /// Write an entry's raw content, creating the category directory.
    /// Returns the new digest.
    pub fn write(&self, path: &str, raw: &str) -> Result<String, String> {
        let file = self.resolve(path)?;
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent).map_err(|err| err.to_string())?;
        }
        std::fs::write(&file, raw).map_err(|err| err.to_string())?;
        Ok(digest_of(raw.as_bytes()))
    }

    /// Delete an entry and its index row.
    pub fn delete(&self, path: &str) -> Result<(), String> {
        let file = self.resolve(path)?;
        std::fs::remove_file(&file).map_err(|_| format!("memory entry does not exist: {path}"))?;
        if let Ok(mut index) = self.index.lock() {
            index.remove(path);
        }
        self.save_index();
        Ok(())
    }

    /// Whether an entry exists.
    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|file| file.is_file())
    }

    /// All entry paths (relative, `.md` files), sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        collect_markdown(&self.root, &self.root, &mut paths);
        paths.sort();
        paths
    }

    /// Read every entry, skipping unreadable files.
    #[must_use]
    pub fn entries(&self) -> Vec<MemoryEntry> {
        self.paths()
            .iter()
            .filter_map(|path| self.read(path).ok())
            .collect()
    }

    /// The indexed embedding for an entry, if current.
    #[must_use]
    pub fn embedding(&self, path: &str, digest: &str) -> Option<Vec<f32>> {
        let index = self.index.lock().ok()?;
        let entry = index.get(path)?;
        (entry.digest == digest).then(|| entry.embedding.clone())
    }

    /// Store an embedding for an entry.
    pub fn set_embedding(&self, path: &str, digest: impl Into<String>, embedding: Vec<f32>) {
        if let Ok(mut index) = self.index.lock() {
            index.insert(
                path.to_string(),
                IndexEntry {
                    embedding,
                    digest: digest.into(),
                },
            );
        }
        self.save_index();
    }

    /// Drop index rows whose entry no longer exists. Returns how many.
    pub fn prune_index(&self) -> usize {
        let live: std::collections::HashSet<String> = self.paths().into_iter().collect();
        let mut removed = 0;
        if let Ok(mut index) = self.index.lock() {
            let before = index.len();
            index.retain(|path, _| live.contains(path));
            removed = before - index.len();
        }
        if removed > 0 {
            self.save_index();
        }
        removed
    }

    fn save_index(&self) {
        let Ok(index) = self.index.lock() else {
            return;
        };
        if let Ok(raw) = serde_json::to_string_pretty(&*index) {
            let _ = std::fs::write(self.root.join(INDEX_FILE), raw);
        }
    }
}

fn collect_markdown(root: &Path, dir: &Path, paths: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(std::result::Result::ok) {
        let path = entry.path();
        if path.is_dir() {
            collect_markdown(root, &path, paths);
        } else if path.extension().is_some_and(|ext| ext == "md") {
            if let Ok(relative) = path.strip_prefix(root) {
                paths.push(relative.to_string_lossy().into_owned());
            }
        }
    }
}
