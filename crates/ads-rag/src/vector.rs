use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ads_core::{Chunk, ScoredChunk};
use ads_error::{AdsError, Result};
use ads_llm::EmbedModel;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::engine::with_timeout;

#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    /// Directory of the sled store; `None` keeps embeddings in memory only.
    pub store_path: Option<PathBuf>,
    pub batch_size: usize,
    pub call_timeout: Duration,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            batch_size: 64,
            call_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// Embedding-backed index ranked by cosine similarity.
pub struct VectorIndex {
    entries: Vec<VectorEntry>,
    embed: Arc<dyn EmbedModel>,
    call_timeout: Duration,
    newly_embedded: usize,
    store_path: Option<PathBuf>,
}

impl VectorIndex {
    /// Embeds `chunks` and, with a store configured, appends them to it.
    ///
    /// Growth is append-only: entries already persisted are loaded as they
    /// are and only chunks at positions past the persisted count are embedded.
    #[instrument(skip(chunks, embed, config), fields(chunks = chunks.len()))]
    pub async fn build(
        chunks: &[Chunk],
        embed: Arc<dyn EmbedModel>,
        config: &VectorIndexConfig,
    ) -> Result<Self> {
        let store = match &config.store_path {
            Some(path) => Some(EmbeddingStore::open(path, embed.model_name())?),
            None => None,
        };
        let mut entries = match &store {
            Some(store) => store.load()?,
            None => Vec::new(),
        };
        let persisted = entries.len();
        let mut dimension = entries.first().map(|e| e.embedding.len());

        let pending = chunks.get(persisted..).unwrap_or(&[]);
        let batch_size = config.batch_size.max(1);
        for batch in pending.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors =
                with_timeout("embed_chunks", config.call_timeout, embed.embed(&texts)).await?;
            if vectors.len() != batch.len() {
                return Err(AdsError::EmbeddingService {
                    provider: embed.model_name().to_string(),
                    message: format!("expected {} embeddings, got {}", batch.len(), vectors.len()),
                    retry_after: None,
                });
            }
            for (chunk, embedding) in batch.iter().zip(vectors) {
                match dimension {
                    Some(d) if d != embedding.len() => {
                        return Err(AdsError::VectorStore {
                            operation: "append".to_string(),
                            message: format!(
                                "embedding dimension {} does not match indexed dimension {}",
                                embedding.len(),
                                d
                            ),
                        });
                    }
                    None => dimension = Some(embedding.len()),
                    _ => {}
                }
                let entry = VectorEntry {
                    chunk: chunk.clone(),
                    embedding,
                };
                if let Some(store) = &store {
                    store.append(entries.len() as u64, &entry)?;
                }
                entries.push(entry);
            }
        }

        if let Some(store) = &store {
            store.finish(dimension).await?;
        }

        let newly_embedded = entries.len() - persisted;
        info!(
            persisted,
            newly_embedded,
            total = entries.len(),
            "vector index ready"
        );
        Ok(Self {
            entries,
            embed,
            call_timeout: config.call_timeout,
            newly_embedded,
            store_path: config.store_path.clone(),
        })
    }

    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = with_timeout(
            "embed_query",
            self.call_timeout,
            self.embed.embed(&[query.to_string()]),
        )
        .await?;
        let query_vec = vectors.into_iter().next().ok_or_else(|| AdsError::EmbeddingService {
            provider: self.embed.model_name().to_string(),
            message: "no embedding returned for query".to_string(),
            retry_after: None,
        })?;

        let mut scored: Vec<(f32, &VectorEntry)> = self
            .entries
            .iter()
            .map(|e| (cosine_similarity(&query_vec, &e.embedding), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, e)| ScoredChunk {
                chunk: e.chunk.clone(),
                score,
            })
            .collect())
    }

    /// Makes one embedding call and checks its width against the indexed entries.
    pub async fn check_embedder(&self) -> Result<()> {
        let vectors = with_timeout(
            "embed_check",
            self.call_timeout,
            self.embed.embed(&["health check".to_string()]),
        )
        .await?;
        let width = match vectors.first() {
            Some(v) if !v.is_empty() => v.len(),
            _ => {
                return Err(AdsError::EmbeddingService {
                    provider: self.embed.model_name().to_string(),
                    message: "no embedding returned for health check".to_string(),
                    retry_after: None,
                })
            }
        };
        match self.entries.first().map(|e| e.embedding.len()) {
            Some(d) if d != width => Err(AdsError::VectorStore {
                operation: "check".to_string(),
                message: format!(
                    "embedding dimension {} does not match indexed dimension {}",
                    width, d
                ),
            }),
            _ => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries embedded by this build, as opposed to loaded from the store.
    pub fn newly_embedded(&self) -> usize {
        self.newly_embedded
    }

    pub fn store_path(&self) -> Option<&Path> {
        self.store_path.as_deref()
    }

    pub fn model_name(&self) -> &str {
        self.embed.model_name()
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let mut dot_product = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (x, y) in a.iter().zip(b) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a.sqrt() * norm_b.sqrt())
}

const MODEL_KEY: &[u8] = b"model";
const DIMENSION_KEY: &[u8] = b"dimension";

/// sled-backed entry log keyed by big-endian position.
struct EmbeddingStore {
    db: sled::Db,
    entries: sled::Tree,
    meta: sled::Tree,
    model: String,
}

impl EmbeddingStore {
    fn open(path: &Path, model: &str) -> Result<Self> {
        let db = sled::open(path).map_err(|e| AdsError::VectorStore {
            operation: "open".to_string(),
            message: format!("{}: {}", path.display(), e),
        })?;
        let entries = db.open_tree("entries")?;
        let meta = db.open_tree("meta")?;

        if let Some(stored) = meta.get(MODEL_KEY)? {
            let stored = String::from_utf8_lossy(&stored).to_string();
            if stored != model {
                return Err(AdsError::VectorStore {
                    operation: "open".to_string(),
                    message: format!(
                        "store was built with embedding model '{}', configured model is '{}'",
                        stored, model
                    ),
                });
            }
        }

        Ok(Self {
            db,
            entries,
            meta,
            model: model.to_string(),
        })
    }

    fn load(&self) -> Result<Vec<VectorEntry>> {
        let mut out = Vec::with_capacity(self.entries.len());
        for item in self.entries.iter() {
            let (_, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    fn append(&self, position: u64, entry: &VectorEntry) -> Result<()> {
        let value = serde_json::to_vec(entry)?;
        self.entries.insert(position.to_be_bytes(), value)?;
        Ok(())
    }

    async fn finish(&self, dimension: Option<usize>) -> Result<()> {
        self.meta.insert(MODEL_KEY, self.model.as_bytes())?;
        if let Some(d) = dimension {
            self.meta.insert(DIMENSION_KEY, (d as u64).to_be_bytes().to_vec())?;
        }
        self.db.flush_async().await?;
        Ok(())
    }
}
