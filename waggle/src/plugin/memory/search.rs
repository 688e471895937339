//! Hybrid semantic + keyword search over memory entries.
//!
//! Each entry is scored by cosine similarity between the query embedding and
//! the indexed entry embedding, combined with keyword overlap against the
//! entry's tags and title. Entries without tags are scored on similarity
//! alone rather than being penalized for the missing keyword signal.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::tracker::digest_of;

use super::store::{MemoryEntry, MemoryStore};

/// Produces embeddings for queries and entry bodies.
///
/// The concrete model is external; the runtime only needs vectors of a
/// consistent dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a text into a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String>;
}

/// Deterministic hashed bag-of-words embedder.
///
/// Good enough to make discovery work without a model backend, and exactly
/// reproducible in tests. Words are hashed into a fixed number of buckets and
/// the resulting counts normalized.
#[derive(Debug, Clone, Copy, Default)]
pub struct BagOfWordsEmbedder;

const BUCKETS: usize = 256;

#[async_trait]
impl Embedder for BagOfWordsEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        let mut buckets = vec![0.0f32; BUCKETS];
        for word in tokenize(text) {
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in word.bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
            }
            buckets[(hash % BUCKETS as u64) as usize] += 1.0;
        }
        let norm = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut buckets {
                *value /= norm;
            }
        }
        Ok(buckets)
    }
}

/// Cosine similarity of two vectors; zero when either is empty.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        f64::from(dot / (norm_a * norm_b))
    }
}

/// Relative weights of the two signals.
#[derive(Debug, Clone, Copy)]
pub struct SearchWeights {
    /// Weight of the cosine-similarity signal.
    pub semantic: f64,
    /// Weight of the keyword-overlap signal.
    pub keyword: f64,
}

impl Default for SearchWeights {
    fn default() -> Self {
        Self {
            semantic: 0.5,
            keyword: 0.5,
        }
    }
}

/// Similarity threshold for normal queries.
pub const DISCOVERY_THRESHOLD: f64 = 0.35;
/// Similarity threshold for short queries.
pub const DISCOVERY_THRESHOLD_SHORT: f64 = 0.25;
/// Queries shorter than this many words use the short threshold.
pub const ADAPTIVE_WORD_CUTOFF: usize = 10;

/// Threshold adapted to query length: short queries carry less signal, so
/// they get the lower bar.
#[must_use]
pub fn adaptive_threshold(query: &str) -> f64 {
    if query.split_whitespace().count() < ADAPTIVE_WORD_CUTOFF {
        DISCOVERY_THRESHOLD_SHORT
    } else {
        DISCOVERY_THRESHOLD
    }
}

/// One scored search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Entry path relative to the store root.
    pub path: String,
    /// Entry title.
    pub title: String,
    /// Entry type from frontmatter.
    pub entry_type: Option<String>,
    /// Combined score.
    pub score: f64,
    /// Cosine-similarity component.
    pub semantic: f64,
    /// Keyword component; absent when the entry has no tags.
    pub keyword: Option<f64>,
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Fraction of query terms found in the entry's tags or title.
fn keyword_overlap(query_terms: &HashSet<String>, entry: &MemoryEntry) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let mut entry_terms: HashSet<String> = tokenize(&entry.title).into_iter().collect();
    for tag in &entry.front.tags {
        entry_terms.extend(tokenize(tag));
    }
    let matched = query_terms
        .iter()
        .filter(|term| entry_terms.contains(*term))
        .count();
    matched as f64 / query_terms.len() as f64
}

/// Score every entry against the query and return hits over the threshold,
/// best first, capped at `top_k`.
pub async fn hybrid_search(
    store: &MemoryStore,
    embedder: &Arc<dyn Embedder>,
    query: &str,
    top_k: usize,
    threshold: f64,
    type_filter: Option<&[&str]>,
    weights: SearchWeights,
) -> Vec<SearchHit> {
    let query_embedding = embedder.embed(query).await.unwrap_or_default();
    let query_terms: HashSet<String> = tokenize(query).into_iter().collect();

    let mut hits: Vec<SearchHit> = Vec::new();
    for entry in store.entries() {
        if let Some(types) = type_filter {
            let matches = entry
                .front
                .entry_type
                .as_deref()
                .is_some_and(|entry_type| types.contains(&entry_type));
            if !matches {
                continue;
            }
        }

        let digest = digest_of(entry.raw.as_bytes());
        let semantic = store
            .embedding(&entry.path, &digest)
            .map_or(0.0, |embedding| {
                cosine_similarity(&query_embedding, &embedding)
            });

        let (score, keyword) = if entry.front.tags.is_empty() {
            // No keyword signal to mix in; similarity stands alone.
            (semantic, None)
        } else {
            let keyword = keyword_overlap(&query_terms, &entry);
            (
                weights.semantic * semantic + weights.keyword * keyword,
                Some(keyword),
            )
        };

        if score >= threshold {
            hits.push(SearchHit {
                path: entry.path,
                title: entry.title,
                entry_type: entry.front.entry_type,
                score,
                semantic,
                keyword,
            });
        }
    }
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(top_k);
    hits
}
