use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ads_core::{Chunk, ScoredChunk};
use ads_error::{AdsError, Result};
use ads_llm::{CannedResponder, ChatModel};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::lexical::KeywordIndex;
use crate::vector::VectorIndex;

/// Which backends an orchestrator runs on. Chosen once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    /// External embedding index and chat model
    External,
    /// Keyword index and canned responder
    Fallback,
}

impl BackendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendMode::External => "external",
            BackendMode::Fallback => "fallback",
        }
    }
}

/// Bounds an external call; an elapsed limit becomes `AdsError::Timeout`.
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AdsError::Timeout {
            operation: operation.to_string(),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}

pub enum SimilarityIndex {
    Vector(VectorIndex),
    Keyword(KeywordIndex),
}

impl SimilarityIndex {
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        match self {
            SimilarityIndex::Vector(index) => index.search(query, k).await,
            SimilarityIndex::Keyword(index) => Ok(index.search(query, k)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SimilarityIndex::Vector(index) => index.len(),
            SimilarityIndex::Keyword(index) => index.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SimilarityIndex::Vector(_) => "vector",
            SimilarityIndex::Keyword(_) => "keyword",
        }
    }
}

/// A similarity index with `k` fixed at construction.
pub struct Retriever {
    index: SimilarityIndex,
    top_k: usize,
}

impl Retriever {
    pub fn new(index: SimilarityIndex, top_k: usize) -> Self {
        Self { index, top_k }
    }

    pub async fn get_relevant(&self, query: &str) -> Result<Vec<Chunk>> {
        Ok(self
            .get_relevant_scored(query)
            .await?
            .into_iter()
            .map(|s| s.chunk)
            .collect())
    }

    pub async fn get_relevant_scored(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        let results = self.index.search(query, self.top_k).await?;
        debug!(
            backend = self.index.kind(),
            results = results.len(),
            "retrieved chunks"
        );
        Ok(results)
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }
}

/// Everything a generator may draw on for one answer.
pub struct GenerationRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub question: &'a str,
    pub context: &'a str,
}

pub enum Generator {
    External {
        model: Arc<dyn ChatModel>,
        call_timeout: Duration,
    },
    Canned(CannedResponder),
}

impl Generator {
    pub async fn generate(&self, req: &GenerationRequest<'_>) -> Result<String> {
        match self {
            Generator::External {
                model,
                call_timeout,
            } => with_timeout("generate", *call_timeout, model.chat(req.system, req.prompt)).await,
            Generator::Canned(responder) => Ok(responder.respond(req.question, req.context)),
        }
    }

    /// One minimal chat call; the canned responder always passes.
    pub async fn check(&self) -> Result<()> {
        match self {
            Generator::External {
                model,
                call_timeout,
            } => {
                with_timeout("chat_check", *call_timeout, model.chat("Reply with OK.", "ping"))
                    .await?;
                Ok(())
            }
            Generator::Canned(_) => Ok(()),
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            Generator::External { model, .. } => model.model_name(),
            Generator::Canned(responder) => responder.model_name(),
        }
    }
}
