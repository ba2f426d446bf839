use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ads_core::{
    CampaignDataset, Chunk, ChunkType, QueryIntent, QueryResponse, ScoredChunk, SourceCitation,
};
use ads_error::{AdsError, ErrorMetadataBuilder, Result};
use ads_llm::{CannedResponder, Providers};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::chunker::{CampaignChunker, ChunkerConfig};
use crate::engine::{BackendMode, GenerationRequest, Generator, Retriever, SimilarityIndex};
use crate::intent::IntentClassifier;
use crate::lexical::KeywordIndex;
use crate::prompts::{brief_context, build_context_prompt, SYSTEM_PROMPT};
use crate::vector::{VectorIndex, VectorIndexConfig};

/// Chunks handed to the canned responder, and how much of each.
const CANNED_CONTEXT_CHUNKS: usize = 3;
const CANNED_CONTEXT_CHARS: usize = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub top_k: usize,
    pub temperature: f32,
    pub call_timeout_secs: u64,
    pub citation_preview_chars: usize,
    pub max_citations: usize,
    pub embed_batch_size: usize,
    /// Skip external backends even when providers are available.
    pub force_fallback: bool,
    pub vector_store_path: Option<PathBuf>,
    pub chunker: ChunkerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            temperature: 0.1,
            call_timeout_secs: 60,
            citation_preview_chars: 200,
            max_citations: 3,
            embed_batch_size: 64,
            force_fallback: false,
            vector_store_path: None,
            chunker: ChunkerConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    fn vector_index_config(&self) -> VectorIndexConfig {
        VectorIndexConfig {
            store_path: self.vector_store_path.clone(),
            batch_size: self.embed_batch_size,
            call_timeout: self.call_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    pub mode: BackendMode,
    pub model_name: String,
    pub temperature: f32,
    pub top_k: usize,
    pub total_campaigns: usize,
    pub total_chunks: usize,
    pub chunks_by_type: BTreeMap<String, usize>,
    pub indexed_entries: usize,
    pub vector_store_path: Option<PathBuf>,
}

/// Question answering over one campaign dataset.
///
/// The backend pair (vector index + chat model, or keyword index + canned
/// responder) is chosen once during construction and kept for the lifetime of
/// the pipeline. Queries never switch backends.
pub struct CampaignRagPipeline {
    dataset: CampaignDataset,
    chunks: Vec<Chunk>,
    classifier: IntentClassifier,
    retriever: Retriever,
    generator: Generator,
    mode: BackendMode,
    config: PipelineConfig,
}

impl CampaignRagPipeline {
    /// Builds the pipeline, falling back to the offline backends when
    /// providers are missing or disabled, or fail while indexing or checking.
    pub async fn new(
        dataset: CampaignDataset,
        providers: Option<Providers>,
        config: PipelineConfig,
    ) -> Self {
        let chunks = CampaignChunker::new(&dataset, config.chunker.clone()).create_all_chunks();

        let providers = match providers {
            Some(_) if config.force_fallback => {
                info!("offline mode forced by configuration");
                None
            }
            None => {
                info!("no external providers configured");
                None
            }
            some => some,
        };

        if let Some(providers) = providers {
            match build_external(&chunks, &providers, &config).await {
                Ok((index, generator)) => {
                    return Self::assemble(
                        dataset,
                        chunks,
                        index,
                        generator,
                        BackendMode::External,
                        config,
                    );
                }
                Err(err) => {
                    let fallback = AdsError::backend_unavailable("external", err.to_string());
                    let metadata = ErrorMetadataBuilder::new("pipeline")
                        .operation("build")
                        .context("cause", &err.to_string())
                        .build(&fallback);
                    fallback.log(&metadata);
                }
            }
        }

        Self::offline_from_chunks(dataset, chunks, config)
    }

    /// Builds a pipeline on the keyword index and canned responder only.
    pub fn offline(dataset: CampaignDataset, config: PipelineConfig) -> Self {
        let chunks = CampaignChunker::new(&dataset, config.chunker.clone()).create_all_chunks();
        Self::offline_from_chunks(dataset, chunks, config)
    }

    /// Builds on the given providers and reports failures instead of falling back.
    pub async fn with_models(
        dataset: CampaignDataset,
        providers: Providers,
        config: PipelineConfig,
    ) -> Result<Self> {
        let chunks = CampaignChunker::new(&dataset, config.chunker.clone()).create_all_chunks();
        let (index, generator) = build_external(&chunks, &providers, &config).await?;
        Ok(Self::assemble(dataset, chunks, index, generator, BackendMode::External, config))
    }

    fn offline_from_chunks(
        dataset: CampaignDataset,
        chunks: Vec<Chunk>,
        config: PipelineConfig,
    ) -> Self {
        let index = SimilarityIndex::Keyword(KeywordIndex::build(chunks.clone()));
        let generator = Generator::Canned(CannedResponder::new());
        Self::assemble(dataset, chunks, index, generator, BackendMode::Fallback, config)
    }

    fn assemble(
        dataset: CampaignDataset,
        chunks: Vec<Chunk>,
        index: SimilarityIndex,
        generator: Generator,
        mode: BackendMode,
        config: PipelineConfig,
    ) -> Self {
        info!(
            mode = mode.as_str(),
            campaigns = dataset.campaigns().len(),
            chunks = chunks.len(),
            model = generator.model_name(),
            "campaign pipeline ready"
        );
        Self {
            dataset,
            chunks,
            classifier: IntentClassifier::new(),
            retriever: Retriever::new(index, config.top_k),
            generator,
            mode,
            config,
        }
    }

    /// Answers one question. Failures come back as a response with
    /// `success == false`; this never returns an error.
    #[instrument(skip(self), fields(mode = self.mode.as_str()))]
    pub async fn query(&self, question: &str, include_sources: bool) -> QueryResponse {
        let started = Instant::now();
        let outcome = self.answer(question).await;
        let latency_ms = started.elapsed().as_millis() as i64;

        match outcome {
            Ok((intent, answer, scored)) => {
                let sources = if include_sources {
                    self.citations(&scored)
                } else {
                    Vec::new()
                };
                info!(
                    intent = %intent.intent_type,
                    sources = sources.len(),
                    latency_ms,
                    "query answered"
                );
                QueryResponse {
                    question: question.to_string(),
                    answer,
                    intent,
                    sources,
                    success: true,
                    error: None,
                    mode: self.mode.as_str().to_string(),
                    latency_ms,
                }
            }
            Err(err) => {
                let query_id = uuid::Uuid::new_v4().to_string();
                let metadata = ErrorMetadataBuilder::new("pipeline")
                    .operation("query")
                    .query_id(&query_id)
                    .context("mode", self.mode.as_str())
                    .build(&err);
                err.log(&metadata);
                QueryResponse {
                    question: question.to_string(),
                    answer: format!(
                        "I apologize, but I encountered an error processing your query: {}",
                        err
                    ),
                    intent: QueryIntent::unknown(),
                    sources: Vec::new(),
                    success: false,
                    error: Some(err.to_string()),
                    mode: self.mode.as_str().to_string(),
                    latency_ms,
                }
            }
        }
    }

    async fn answer(&self, question: &str) -> Result<(QueryIntent, String, Vec<ScoredChunk>)> {
        if question.trim().is_empty() {
            return Err(AdsError::query_processing("validate", "question is empty"));
        }

        let intent = self.classifier.classify(question);
        let scored = self.retriever.get_relevant_scored(question).await?;
        let chunks: Vec<Chunk> = scored.iter().map(|s| s.chunk.clone()).collect();

        let prompt = build_context_prompt(question, &intent, &chunks);
        let context = brief_context(&chunks, CANNED_CONTEXT_CHUNKS, CANNED_CONTEXT_CHARS);
        let request = GenerationRequest {
            system: SYSTEM_PROMPT,
            prompt: &prompt,
            question,
            context: &context,
        };
        let answer = self.generator.generate(&request).await?;
        Ok((intent, answer, scored))
    }

    fn citations(&self, scored: &[ScoredChunk]) -> Vec<SourceCitation> {
        scored
            .iter()
            .take(self.config.max_citations)
            .map(|s| SourceCitation {
                chunk_id: s.chunk.id.clone(),
                content: preview(&s.chunk.content, self.config.citation_preview_chars),
                metadata: s.chunk.metadata.clone(),
                score: s.score,
            })
            .collect()
    }

    /// Runs questions one after another.
    pub async fn batch_query(&self, questions: &[String]) -> Vec<QueryResponse> {
        let mut responses = Vec::with_capacity(questions.len());
        for question in questions {
            responses.push(self.query(question, true).await);
        }
        responses
    }

    pub fn mode(&self) -> BackendMode {
        self.mode
    }

    pub fn is_fallback(&self) -> bool {
        self.mode == BackendMode::Fallback
    }

    pub fn stats(&self) -> PipelineStats {
        let mut chunks_by_type: BTreeMap<String, usize> = ChunkType::ALL
            .iter()
            .map(|t| (t.as_str().to_string(), 0))
            .collect();
        for chunk in &self.chunks {
            *chunks_by_type
                .entry(chunk.chunk_type().as_str().to_string())
                .or_default() += 1;
        }
        let vector_store_path = match self.retriever.index() {
            SimilarityIndex::Vector(index) => index.store_path().map(PathBuf::from),
            SimilarityIndex::Keyword(_) => None,
        };
        PipelineStats {
            mode: self.mode,
            model_name: self.generator.model_name().to_string(),
            temperature: self.config.temperature,
            top_k: self.retriever.top_k(),
            total_campaigns: self.dataset.campaigns().len(),
            total_chunks: self.chunks.len(),
            chunks_by_type,
            indexed_entries: self.retriever.index().len(),
            vector_store_path,
        }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn dataset(&self) -> &CampaignDataset {
        &self.dataset
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

/// Builds the vector index and chat generator, then contacts both services once.
///
/// Both services are contacted even when the build embeds nothing, as with a
/// warm store or an empty dataset.
async fn build_external(
    chunks: &[Chunk],
    providers: &Providers,
    config: &PipelineConfig,
) -> Result<(SimilarityIndex, Generator)> {
    let embed = Arc::clone(&providers.embed);
    let index = VectorIndex::build(chunks, embed, &config.vector_index_config()).await?;
    if index.len() > chunks.len() {
        warn!(
            indexed = index.len(),
            chunks = chunks.len(),
            "vector store holds entries beyond the current chunks"
        );
    }
    index.check_embedder().await?;

    let generator = Generator::External {
        model: Arc::clone(&providers.chat),
        call_timeout: config.call_timeout(),
    };
    generator.check().await?;
    Ok((SimilarityIndex::Vector(index), generator))
}

fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() > max_chars {
        let mut text: String = content.chars().take(max_chars).collect();
        text.push_str("...");
        text
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ads_core::IntentType;
    use ads_llm::{make_providers, ChatModel, ChatProviderConfig, EmbedModel, EmbedProviderConfig};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TWO_CAMPAIGNS: &str = r#"{
        "campaigns": [
            {
                "id": "fb_101", "name": "Retargeting Winter Sale", "status": "ACTIVE",
                "industry": "Fashion", "audience": "Website visitors 30d",
                "budget": {"daily_budget": 800},
                "daily_performance": {
                    "2024-12-01": {"impressions": 50000, "clicks": 1500, "spend": 640.0, "conversions": 40,
                                   "ctr": 3.0, "cpm": 12.8, "cpc": 0.43, "roas": 4.1, "frequency": 2.2}
                }
            },
            {
                "id": "fb_102", "name": "Lookalike Prospecting", "status": "ACTIVE",
                "industry": "Fashion", "audience": "Lookalike 2%",
                "daily_performance": {
                    "2024-12-01": {"impressions": 90000, "clicks": 900, "spend": 1100.0, "conversions": 22,
                                   "ctr": 1.0, "cpm": 12.2, "cpc": 1.22, "roas": 1.9, "frequency": 1.3}
                }
            }
        ],
        "global_insights": {}
    }"#;

    fn dataset() -> CampaignDataset {
        CampaignDataset::from_json_str("test", TWO_CAMPAIGNS).unwrap()
    }

    /// Hashes lower-cased words into a small fixed-width vector.
    struct BagOfWordsEmbedder;

    fn bag_of_words(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; 32];
        for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if word.is_empty() {
                continue;
            }
            let h = word
                .bytes()
                .fold(7u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
            v[(h % 32) as usize] += 1.0;
        }
        v
    }

    #[async_trait]
    impl EmbedModel for BagOfWordsEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| bag_of_words(t)).collect())
        }

        fn model_name(&self) -> &str {
            "bag-of-words"
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbedModel for FailingEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(AdsError::EmbeddingService {
                provider: "failing".into(),
                message: "connection refused".into(),
                retry_after: None,
            })
        }

        fn model_name(&self) -> &str {
            "bag-of-words"
        }
    }

    struct EchoChatModel;

    #[async_trait]
    impl ChatModel for EchoChatModel {
        async fn chat(&self, _system: &str, prompt: &str) -> Result<String> {
            Ok(format!("echo: {} chars", prompt.len()))
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    struct FailingChatModel;

    #[async_trait]
    impl ChatModel for FailingChatModel {
        async fn chat(&self, _system: &str, _prompt: &str) -> Result<String> {
            Err(AdsError::LlmService {
                provider: "failing".into(),
                message: "upstream 500".into(),
                retry_after: None,
            })
        }

        fn model_name(&self) -> &str {
            "failing-chat"
        }
    }

    /// Answers the construction check, then fails every later call.
    struct FlakyChatModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatModel for FlakyChatModel {
        async fn chat(&self, _system: &str, _prompt: &str) -> Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok("OK".to_string());
            }
            Err(AdsError::LlmService {
                provider: "flaky".into(),
                message: "upstream 500".into(),
                retry_after: None,
            })
        }

        fn model_name(&self) -> &str {
            "flaky-chat"
        }
    }

    fn providers(chat: Arc<dyn ChatModel>, embed: Arc<dyn EmbedModel>) -> Providers {
        Providers { chat, embed }
    }

    #[tokio::test]
    async fn fallback_query_end_to_end() {
        let pipeline = CampaignRagPipeline::offline(dataset(), PipelineConfig::default());
        assert!(pipeline.is_fallback());

        let response = pipeline.query("What is the ROAS?", true).await;
        assert!(response.success);
        assert!(!response.answer.is_empty());
        assert!(response.answer.contains("ROAS"));
        assert!(response.sources.len() <= 3);
        assert!(!response.sources.is_empty());
        for source in &response.sources {
            assert!(source.content.chars().count() <= 203);
        }
        assert_eq!(response.mode, "fallback");
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn invalid_credential_falls_back_silently() {
        let chat = ChatProviderConfig::OpenAiCompat {
            base_url: "https://api.openai.com".into(),
            api_key_env: "ADS_RAG_TEST_KEY_THAT_IS_NEVER_SET".into(),
            model: "gpt-4o-mini".into(),
        };
        let embed = EmbedProviderConfig::OpenAiCompat {
            base_url: "https://api.openai.com".into(),
            api_key_env: "ADS_RAG_TEST_KEY_THAT_IS_NEVER_SET".into(),
            model: "text-embedding-3-small".into(),
        };
        let built = make_providers(&chat, &embed, Some(0.1));
        assert!(built.is_err());

        let pipeline =
            CampaignRagPipeline::new(dataset(), built.ok(), PipelineConfig::default()).await;
        assert_eq!(pipeline.mode(), BackendMode::Fallback);
        let response = pipeline.query("Which campaign has the best ROAS?", true).await;
        assert!(response.success);
        assert_eq!(response.mode, "fallback");
    }

    #[tokio::test]
    async fn working_providers_select_external_mode() {
        let pipeline = CampaignRagPipeline::new(
            dataset(),
            Some(providers(Arc::new(EchoChatModel), Arc::new(BagOfWordsEmbedder))),
            PipelineConfig::default(),
        )
        .await;
        assert_eq!(pipeline.mode(), BackendMode::External);

        let response = pipeline
            .query("Compare my retargeting vs lookalike campaigns", true)
            .await;
        assert!(response.success);
        assert!(response.answer.starts_with("echo:"));
        assert_eq!(response.intent.intent_type, IntentType::CampaignComparison);
        assert_eq!(response.mode, "external");

        let stats = pipeline.stats();
        assert_eq!(stats.model_name, "echo");
        assert_eq!(stats.indexed_entries, pipeline.chunks().len());
    }

    #[tokio::test]
    async fn embedding_failure_at_build_falls_back() {
        let pipeline = CampaignRagPipeline::new(
            dataset(),
            Some(providers(Arc::new(EchoChatModel), Arc::new(FailingEmbedder))),
            PipelineConfig::default(),
        )
        .await;
        assert!(pipeline.is_fallback());
        assert_eq!(pipeline.stats().model_name, "canned-responder");

        let strict = CampaignRagPipeline::with_models(
            dataset(),
            providers(Arc::new(EchoChatModel), Arc::new(FailingEmbedder)),
            PipelineConfig::default(),
        )
        .await;
        assert!(matches!(strict, Err(AdsError::EmbeddingService { .. })));
    }

    #[tokio::test]
    async fn warm_store_still_checks_the_embedder() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            vector_store_path: Some(dir.path().join("vectors")),
            ..PipelineConfig::default()
        };
        let warm = CampaignRagPipeline::new(
            dataset(),
            Some(providers(Arc::new(EchoChatModel), Arc::new(BagOfWordsEmbedder))),
            config.clone(),
        )
        .await;
        assert_eq!(warm.mode(), BackendMode::External);
        drop(warm);

        // every chunk is already persisted, so only the check reaches the embedder
        let pipeline = CampaignRagPipeline::new(
            dataset(),
            Some(providers(Arc::new(EchoChatModel), Arc::new(FailingEmbedder))),
            config.clone(),
        )
        .await;
        assert!(pipeline.is_fallback());
        let response = pipeline.query("What is the ROAS?", true).await;
        assert!(response.success);
        assert_eq!(response.mode, "fallback");
        drop(pipeline);

        // a store larger than the dataset still serves
        let stale = CampaignRagPipeline::new(
            CampaignDataset::default(),
            Some(providers(Arc::new(EchoChatModel), Arc::new(BagOfWordsEmbedder))),
            config,
        )
        .await;
        assert_eq!(stale.mode(), BackendMode::External);
        assert!(stale.stats().indexed_entries > stale.chunks().len());
    }

    #[tokio::test]
    async fn empty_dataset_with_failing_embedder_falls_back() {
        let pipeline = CampaignRagPipeline::new(
            CampaignDataset::default(),
            Some(providers(Arc::new(EchoChatModel), Arc::new(FailingEmbedder))),
            PipelineConfig::default(),
        )
        .await;
        assert!(pipeline.is_fallback());
    }

    #[tokio::test]
    async fn chat_failure_at_build_falls_back() {
        let pipeline = CampaignRagPipeline::new(
            dataset(),
            Some(providers(Arc::new(FailingChatModel), Arc::new(BagOfWordsEmbedder))),
            PipelineConfig::default(),
        )
        .await;
        assert!(pipeline.is_fallback());

        let strict = CampaignRagPipeline::with_models(
            dataset(),
            providers(Arc::new(FailingChatModel), Arc::new(BagOfWordsEmbedder)),
            PipelineConfig::default(),
        )
        .await;
        assert!(matches!(strict, Err(AdsError::LlmService { .. })));
    }

    #[tokio::test]
    async fn forced_fallback_ignores_providers() {
        let config = PipelineConfig {
            force_fallback: true,
            ..PipelineConfig::default()
        };
        let pipeline = CampaignRagPipeline::new(
            dataset(),
            Some(providers(Arc::new(EchoChatModel), Arc::new(BagOfWordsEmbedder))),
            config,
        )
        .await;
        assert!(pipeline.is_fallback());
    }

    #[tokio::test]
    async fn generation_failure_becomes_failed_response() {
        let pipeline = CampaignRagPipeline::with_models(
            dataset(),
            providers(
                Arc::new(FlakyChatModel {
                    calls: AtomicUsize::new(0),
                }),
                Arc::new(BagOfWordsEmbedder),
            ),
            PipelineConfig::default(),
        )
        .await
        .unwrap();

        let response = pipeline.query("What is the ROAS?", true).await;
        assert!(!response.success);
        assert!(response.sources.is_empty());
        assert_eq!(response.intent.intent_type, IntentType::Unknown);
        assert!(response
            .answer
            .starts_with("I apologize, but I encountered an error processing your query:"));
        assert!(response.error.unwrap().contains("upstream 500"));
    }

    #[tokio::test]
    async fn empty_question_fails_without_panicking() {
        let pipeline = CampaignRagPipeline::offline(dataset(), PipelineConfig::default());
        let response = pipeline.query("   ", true).await;
        assert!(!response.success);
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn sources_can_be_omitted_and_batches_run_in_order() {
        let pipeline = CampaignRagPipeline::offline(dataset(), PipelineConfig::default());
        assert!(pipeline.query("What is the CPM?", false).await.sources.is_empty());

        let questions = vec!["What is the CPM?".to_string(), "".to_string()];
        let responses = pipeline.batch_query(&questions).await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].question, "What is the CPM?");
        assert!(responses[0].success);
        assert!(!responses[1].success);
    }

    #[tokio::test]
    async fn empty_dataset_still_answers() {
        let pipeline =
            CampaignRagPipeline::offline(CampaignDataset::default(), PipelineConfig::default());
        assert!(pipeline.chunks().is_empty());
        let response = pipeline.query("How do I optimize?", true).await;
        assert!(response.success);
        assert!(response.sources.is_empty());
    }

    #[test]
    fn stats_count_chunks_by_type() {
        let pipeline = CampaignRagPipeline::offline(dataset(), PipelineConfig::default());
        let stats = pipeline.stats();
        assert_eq!(stats.total_campaigns, 2);
        assert_eq!(stats.chunks_by_type["campaign_overview"], 2);
        assert_eq!(stats.chunks_by_type["daily_performance"], 2);
        assert_eq!(stats.chunks_by_type["industry_comparison"], 1);
        assert_eq!(stats.chunks_by_type["market_trends"], 0);
        assert_eq!(stats.top_k, 5);
        assert_eq!(stats.indexed_entries, stats.total_chunks);
        assert!(stats.vector_store_path.is_none());
    }

    #[test]
    fn preview_marks_truncation() {
        assert_eq!(preview("short", 200), "short");
        let long = "x".repeat(250);
        let cut = preview(&long, 200);
        assert_eq!(cut.chars().count(), 203);
        assert!(cut.ends_with("..."));
    }
}
