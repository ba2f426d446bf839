use std::collections::HashSet;

use ads_core::{Chunk, ScoredChunk};
use tracing::debug;

/// Weight of a query token that appears among a chunk's metadata values.
pub const METADATA_MATCH_WEIGHT: f32 = 0.1;

/// Deterministic keyword-overlap index; needs no external service.
///
/// score = |query ∩ content| / |query| + 0.1 × |query ∩ metadata|, over
/// lower-cased whitespace tokens. The score is unnormalised and can exceed 1.
#[derive(Debug, Clone, Default)]
pub struct KeywordIndex {
    entries: Vec<KeywordEntry>,
}

#[derive(Debug, Clone)]
struct KeywordEntry {
    chunk: Chunk,
    content_tokens: HashSet<String>,
    metadata_tokens: HashSet<String>,
}

impl KeywordIndex {
    pub fn build(chunks: Vec<Chunk>) -> Self {
        let entries: Vec<KeywordEntry> = chunks
            .into_iter()
            .map(|chunk| KeywordEntry {
                content_tokens: tokenize(&chunk.content),
                metadata_tokens: tokenize(&chunk.metadata.value_text()),
                chunk,
            })
            .collect();
        debug!(entries = entries.len(), "keyword index built");
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top `k` chunks by keyword score; ties keep corpus order. When nothing
    /// scores above zero the first `k` chunks are returned with score 0.
    pub fn search(&self, query: &str, k: usize) -> Vec<ScoredChunk> {
        if k == 0 {
            return Vec::new();
        }
        let query_tokens = tokenize(query);

        let mut scored: Vec<(f32, &KeywordEntry)> = self
            .entries
            .iter()
            .map(|entry| (score(&query_tokens, entry), entry))
            .filter(|(s, _)| *s > 0.0)
            .collect();
        // stable: equal scores stay in corpus order
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        if scored.is_empty() {
            debug!(query, "no keyword overlap, returning leading chunks");
            return self
                .entries
                .iter()
                .take(k)
                .map(|e| ScoredChunk {
                    chunk: e.chunk.clone(),
                    score: 0.0,
                })
                .collect();
        }

        scored
            .into_iter()
            .take(k)
            .map(|(score, e)| ScoredChunk {
                chunk: e.chunk.clone(),
                score,
            })
            .collect()
    }
}

pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn score(query_tokens: &HashSet<String>, entry: &KeywordEntry) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let content_overlap = query_tokens.intersection(&entry.content_tokens).count();
    let metadata_overlap = query_tokens.intersection(&entry.metadata_tokens).count();
    content_overlap as f32 / query_tokens.len() as f32
        + METADATA_MATCH_WEIGHT * metadata_overlap as f32
}
