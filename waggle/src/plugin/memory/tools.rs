//! Memory tools.
//!
//! These mirror the file tools over the agent's memory store: reads record a
//! digest in the memory read tracker, and every mutating tool enforces the
//! same read-before-edit rule keyed by entry digest. Writes refresh the
//! embeddings index.

use std::sync::Arc;

use async_trait::async_trait;
use globset::GlobBuilder;
use regex::RegexBuilder;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::tool::{Tool, ToolContext, ToolDefinition, ToolOutput, parse_args};
use crate::tools::apply_edit;
use crate::tracker::digest_of;

use super::search::{Embedder, SearchWeights, adaptive_threshold, hybrid_search};
use super::store::{MemoryStore, parse_entry};

const MAX_RESULTS: usize = 50;

/// Shared wiring for every memory tool.
pub(super) struct MemoryToolSet {
    pub store: Arc<MemoryStore>,
    pub embedder: Arc<dyn Embedder>,
}

impl MemoryToolSet {
    async fn reindex(&self, path: &str, raw: &str, digest: &str) {
        let entry = parse_entry(path, raw);
        if let Ok(embedding) = self.embedder.embed(&entry.body).await {
            self.store.set_embedding(path, digest, embedding);
        }
    }
}

/// Read a memory entry and record its digest.
pub(super) struct MemoryReadTool(pub Arc<MemoryToolSet>);

#[derive(Deserialize)]
struct PathArgs {
    path: String,
}

#[async_trait]
impl Tool for MemoryReadTool {
    fn name(&self) -> &str {
        "MemoryRead"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "MemoryRead",
            "Read a memory entry (frontmatter and body).",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Entry path, e.g. `concepts/retries.md`."}
                },
                "required": ["path"]
            }),
        )
    }

    fn removable(&self) -> bool {
        false
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolOutput {
        let args: PathArgs = match parse_args(self.name(), &args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        match self.0.store.read(&args.path) {
            Ok(entry) => {
                ctx.memory
                    .record(&ctx.base_agent, &args.path, digest_of(entry.raw.as_bytes()));
                ToolOutput::ok(entry.raw)
            }
            Err(reason) => ToolOutput::error(format!("MemoryRead: {reason}")),
        }
    }
}

/// Write a memory entry; overwriting requires a prior up-to-date read.
pub(super) struct MemoryWriteTool(pub Arc<MemoryToolSet>);

#[derive(Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
}

#[async_trait]
impl Tool for MemoryWriteTool {
    fn name(&self) -> &str {
        "MemoryWrite"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "MemoryWrite",
            "Create or replace a memory entry. Overwriting requires reading the entry first. \
             Use YAML frontmatter (type, tags, domain) followed by a Markdown body.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["path", "content"]
            }),
        )
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolOutput {
        let args: WriteArgs = match parse_args(self.name(), &args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        if self.0.store.exists(&args.path) {
            let current = match self.0.store.read(&args.path) {
                Ok(entry) => digest_of(entry.raw.as_bytes()),
                Err(reason) => return ToolOutput::error(format!("MemoryWrite: {reason}")),
            };
            if !ctx.memory.is_current(&ctx.base_agent, &args.path, &current) {
                return ToolOutput::unrecoverable(format!(
                    "MemoryWrite: '{}' exists and has not been read (or changed since the last \
                     read); call MemoryRead first",
                    args.path
                ));
            }
        }
        match self.0.store.write(&args.path, &args.content) {
            Ok(digest) => {
                self.0.reindex(&args.path, &args.content, &digest).await;
                ctx.memory.record(&ctx.base_agent, &args.path, digest);
                ToolOutput::ok(format!("Memory entry written: {}", args.path))
            }
            Err(reason) => ToolOutput::error(format!("MemoryWrite: {reason}")),
        }
    }
}

#[derive(Deserialize)]
struct EditArgs {
    path: String,
    old_string: String,
    new_string: String,
}

#[derive(Deserialize)]
struct MultiEditArgs {
    path: String,
    edits: Vec<EditOp>,
}

#[derive(Deserialize)]
struct EditOp {
    old_string: String,
    new_string: String,
}

async fn load_for_edit(
    tool: &str,
    set: &MemoryToolSet,
    ctx: &ToolContext,
    path: &str,
) -> Result<String, ToolOutput> {
    let entry = set
        .store
        .read(path)
        .map_err(|reason| ToolOutput::error(format!("{tool}: {reason}")))?;
    let digest = digest_of(entry.raw.as_bytes());
    if !ctx.memory.is_current(&ctx.base_agent, path, &digest) {
        return Err(ToolOutput::unrecoverable(format!(
            "{tool}: '{path}' has not been read (or changed since the last read); call \
             MemoryRead first"
        )));
    }
    Ok(entry.raw)
}

async fn commit_edit(
    tool: &str,
    set: &MemoryToolSet,
    ctx: &ToolContext,
    path: &str,
    content: &str,
) -> ToolOutput {
    match set.store.write(path, content) {
        Ok(digest) => {
            set.reindex(path, content, &digest).await;
            ctx.memory.record(&ctx.base_agent, path, digest);
            ToolOutput::ok(format!("Memory entry edited: {path}"))
        }
        Err(reason) => ToolOutput::error(format!("{tool}: {reason}")),
    }
}

/// Replace one unique occurrence of a string in a memory entry.
pub(super) struct MemoryEditTool(pub Arc<MemoryToolSet>);

#[async_trait]
impl Tool for MemoryEditTool {
    fn name(&self) -> &str {
        "MemoryEdit"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "MemoryEdit",
            "Replace one unique occurrence of old_string in a memory entry. The entry must have \
             been read first.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "old_string": {"type": "string"},
                    "new_string": {"type": "string"}
                },
                "required": ["path", "old_string", "new_string"]
            }),
        )
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolOutput {
        let args: EditArgs = match parse_args(self.name(), &args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        let raw = match load_for_edit(self.name(), &self.0, ctx, &args.path).await {
            Ok(raw) => raw,
            Err(output) => return output,
        };
        match apply_edit(&raw, &args.old_string, &args.new_string) {
            Ok(updated) => commit_edit(self.name(), &self.0, ctx, &args.path, &updated).await,
            Err(reason) => ToolOutput::error(format!("MemoryEdit: {reason}")),
        }
    }
}

/// Apply several edits to one memory entry atomically.
pub(super) struct MemoryMultiEditTool(pub Arc<MemoryToolSet>);

#[async_trait]
impl Tool for MemoryMultiEditTool {
    fn name(&self) -> &str {
        "MemoryMultiEdit"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "MemoryMultiEdit",
            "Apply a list of edits to one memory entry in order. All succeed or none are written.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "edits": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "old_string": {"type": "string"},
                                "new_string": {"type": "string"}
                            },
                            "required": ["old_string", "new_string"]
                        }
                    }
                },
                "required": ["path", "edits"]
            }),
        )
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolOutput {
        let args: MultiEditArgs = match parse_args(self.name(), &args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        if args.edits.is_empty() {
            return ToolOutput::error("MemoryMultiEdit: edits must not be empty");
        }
        let mut raw = match load_for_edit(self.name(), &self.0, ctx, &args.path).await {
            Ok(raw) => raw,
            Err(output) => return output,
        };
        for (index, edit) in args.edits.iter().enumerate() {
            match apply_edit(&raw, &edit.old_string, &edit.new_string) {
                Ok(updated) => raw = updated,
                Err(reason) => {
                    return ToolOutput::error(format!(
                        "MemoryMultiEdit: edit {} failed, nothing written: {reason}",
                        index + 1
                    ));
                }
            }
        }
        commit_edit(self.name(), &self.0, ctx, &args.path, &raw).await
    }
}

/// Delete a memory entry.
pub(super) struct MemoryDeleteTool(pub Arc<MemoryToolSet>);

#[async_trait]
impl Tool for MemoryDeleteTool {
    fn name(&self) -> &str {
        "MemoryDelete"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "MemoryDelete",
            "Delete a memory entry and its index row.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"}
                },
                "required": ["path"]
            }),
        )
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolOutput {
        let args: PathArgs = match parse_args(self.name(), &args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        match self.0.store.delete(&args.path) {
            Ok(()) => {
                ctx.memory.forget(&ctx.base_agent, &args.path);
                ToolOutput::ok(format!("Memory entry deleted: {}", args.path))
            }
            Err(reason) => ToolOutput::error(format!("MemoryDelete: {reason}")),
        }
    }
}

/// Match memory entry paths against a glob.
pub(super) struct MemoryGlobTool(pub Arc<MemoryToolSet>);

#[derive(Deserialize)]
struct GlobArgs {
    pattern: String,
}

#[async_trait]
impl Tool for MemoryGlobTool {
    fn name(&self) -> &str {
        "MemoryGlob"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "MemoryGlob",
            "List memory entries matching a glob pattern (e.g. `concepts/*.md`).",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string"}
                },
                "required": ["pattern"]
            }),
        )
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> ToolOutput {
        let args: GlobArgs = match parse_args(self.name(), &args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        let matcher = match GlobBuilder::new(&args.pattern).literal_separator(true).build() {
            Ok(glob) => glob.compile_matcher(),
            Err(err) => {
                return ToolOutput::error(format!(
                    "MemoryGlob: invalid pattern {:?}: {err}",
                    args.pattern
                ));
            }
        };
        let mut rows: Vec<String> = self
            .0
            .store
            .paths()
            .into_iter()
            .filter(|path| matcher.is_match(path))
            .take(MAX_RESULTS)
            .collect();
        if rows.is_empty() {
            return ToolOutput::ok("No memory entries matched.");
        }
        rows.sort();
        ToolOutput::ok(rows.join("\n"))
    }
}

/// Regex search over memory entry content.
pub(super) struct MemoryGrepTool(pub Arc<MemoryToolSet>);

#[derive(Deserialize)]
struct GrepArgs {
    pattern: String,
    #[serde(default)]
    case_insensitive: Option<bool>,
}

#[async_trait]
impl Tool for MemoryGrepTool {
    fn name(&self) -> &str {
        "MemoryGrep"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "MemoryGrep",
            "Search memory entry content with a regex. Returns at most 50 matching lines.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string"},
                    "case_insensitive": {"type": "boolean"}
                },
                "required": ["pattern"]
            }),
        )
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> ToolOutput {
        let args: GrepArgs = match parse_args(self.name(), &args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        let regex = match RegexBuilder::new(&args.pattern)
            .case_insensitive(args.case_insensitive.unwrap_or(false))
            .build()
        {
            Ok(regex) => regex,
            Err(err) => {
                return ToolOutput::error(format!(
                    "MemoryGrep: invalid regex {:?}: {err}",
                    args.pattern
                ));
            }
        };
        let mut rows = Vec::new();
        'entries: for entry in self.0.store.entries() {
            for (number, line) in entry.raw.lines().enumerate() {
                if regex.is_match(line) {
                    rows.push(format!("{}:{}:{line}", entry.path, number + 1));
                    if rows.len() >= MAX_RESULTS {
                        break 'entries;
                    }
                }
            }
        }
        if rows.is_empty() {
            ToolOutput::ok("No matches found.")
        } else {
            ToolOutput::ok(rows.join("\n"))
        }
    }
}

/// Hybrid semantic + keyword search.
pub(super) struct MemorySearchTool(pub Arc<MemoryToolSet>);

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default)]
    entry_type: Option<String>,
}

#[async_trait]
impl Tool for MemorySearchTool {
    fn name(&self) -> &str {
        "MemorySearch"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "MemorySearch",
            "Search memory by meaning and keywords. Returns scored entry paths.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "top_k": {"type": "integer", "description": "Maximum results (default 5)."},
                    "threshold": {"type": "number", "description": "Minimum score (default adapts to query length)."},
                    "entry_type": {"type": "string", "description": "Restrict to one entry type."}
                },
                "required": ["query"]
            }),
        )
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> ToolOutput {
        let args: SearchArgs = match parse_args(self.name(), &args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        let threshold = args
            .threshold
            .unwrap_or_else(|| adaptive_threshold(&args.query));
        let filter_holder;
        let filter = match &args.entry_type {
            Some(entry_type) => {
                filter_holder = [entry_type.as_str()];
                Some(&filter_holder[..])
            }
            None => None,
        };
        let hits = hybrid_search(
            &self.0.store,
            &self.0.embedder,
            &args.query,
            args.top_k.unwrap_or(5),
            threshold,
            filter,
            SearchWeights::default(),
        )
        .await;
        if hits.is_empty() {
            return ToolOutput::ok("No memory entries scored above the threshold.");
        }
        let listing: String = hits
            .iter()
            .map(|hit| {
                format!(
                    "{}: {} (score {:.2}{})\n",
                    hit.path,
                    hit.title,
                    hit.score,
                    hit.entry_type
                        .as_deref()
                        .map(|t| format!(", {t}"))
                        .unwrap_or_default()
                )
            })
            .collect();
        ToolOutput::ok(listing)
    }
}

/// Compact the store: prune dangling index rows, refresh missing embeddings.
pub(super) struct MemoryDefragTool(pub Arc<MemoryToolSet>);

#[async_trait]
impl Tool for MemoryDefragTool {
    fn name(&self) -> &str {
        "MemoryDefrag"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "MemoryDefrag",
            "Compact the memory index: drop rows for deleted entries and re-embed entries whose \
             content changed outside the tools.",
            json!({"type": "object", "properties": {}}),
        )
    }

    async fn call(&self, _ctx: &ToolContext, _args: Value) -> ToolOutput {
        let pruned = self.0.store.prune_index();
        let mut refreshed = 0;
        for entry in self.0.store.entries() {
            let digest = digest_of(entry.raw.as_bytes());
            if self.0.store.embedding(&entry.path, &digest).is_none() {
                self.0.reindex(&entry.path, &entry.raw, &digest).await;
                refreshed += 1;
            }
        }
        ToolOutput::ok(format!(
            "Memory defragmented: {pruned} dangling index rows removed, {refreshed} embeddings \
             refreshed."
        ))
    }
}
