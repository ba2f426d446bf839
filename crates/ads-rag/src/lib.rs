pub mod chunker;
pub mod engine;
pub mod intent;
pub mod lexical;
pub mod pipeline;
pub mod prompts;
pub mod vector;

pub use chunker::{chunks_for_campaign, chunks_of_type, CampaignChunker, ChunkerConfig};
pub use engine::{
    with_timeout, BackendMode, GenerationRequest, Generator, Retriever, SimilarityIndex,
};
pub use intent::{parse_time_period, IntentClassifier, GENERAL_INQUIRY_CONFIDENCE};
pub use lexical::KeywordIndex;
pub use pipeline::{CampaignRagPipeline, PipelineConfig, PipelineStats};
pub use prompts::{build_context_prompt, intent_instructions, SYSTEM_PROMPT};
pub use vector::{cosine_similarity, VectorIndex, VectorIndexConfig};

// core types travel with the engine
pub use ads_core::{Chunk, QueryIntent, QueryResponse, ScoredChunk, SourceCitation};
pub use ads_error::{AdsError, Result};
