use std::path::{Path, PathBuf};

use ads_core::CampaignDataset;
use ads_error::ErrorMetadataBuilder;
use ads_llm::{make_providers, ChatProviderConfig, EmbedProviderConfig, Providers};
use ads_rag::{CampaignRagPipeline, PipelineConfig};
use serde::Deserialize;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "configs/default.yaml";

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub data: DataCfg,
    pub chat_provider: Option<ChatProviderConfig>,
    pub embedding_provider: Option<EmbedProviderConfig>,
    #[serde(default)]
    pub vector_store: VectorStoreCfg,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize)]
pub struct DataCfg {
    pub path: PathBuf,
}

impl Default for DataCfg {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/campaigns.json"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct VectorStoreCfg {
    /// sled directory for persisted embeddings; omitted means in-memory
    pub path: Option<PathBuf>,
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read config {}: {}", path.display(), e))?;
    let cfg: AppConfig = serde_yaml::from_str(&s)?;
    info!(path = %path.display(), "config loaded");
    Ok(cfg)
}

/// Resolves both providers, or `None` when either is missing or unusable.
fn resolve_providers(cfg: &AppConfig) -> Option<Providers> {
    let (chat, embed) = match (&cfg.chat_provider, &cfg.embedding_provider) {
        (Some(chat), Some(embed)) => (chat, embed),
        _ => return None,
    };
    match make_providers(chat, embed, Some(cfg.pipeline.temperature)) {
        Ok(providers) => Some(providers),
        Err(err) => {
            let metadata = ErrorMetadataBuilder::new("cli")
                .operation("make_providers")
                .build(&err);
            err.log(&metadata);
            info!(notice = %err.user_message(), "running without external providers");
            None
        }
    }
}

pub fn pipeline_config(cfg: &AppConfig, offline: bool) -> PipelineConfig {
    let mut pipeline = cfg.pipeline.clone();
    if pipeline.vector_store_path.is_none() {
        pipeline.vector_store_path = cfg.vector_store.path.clone();
    }
    pipeline.force_fallback |= offline;
    pipeline
}

/// The application context: one dataset and one pipeline for the whole run.
pub async fn build_pipeline(cfg: &AppConfig, offline: bool) -> CampaignRagPipeline {
    let dataset = CampaignDataset::load_or_empty(&cfg.data.path);
    let config = pipeline_config(cfg, offline);
    let providers = if config.force_fallback {
        None
    } else {
        resolve_providers(cfg)
    };
    CampaignRagPipeline::new(dataset, providers, config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
data:
  path: data/campaigns.json
chat_provider:
  kind: openai_compat
  base_url: https://api.openai.com
  api_key_env: ADS_CLI_TEST_UNSET_KEY
  model: gpt-4o-mini
embedding_provider:
  kind: openai_compat
  base_url: https://api.openai.com
  api_key_env: ADS_CLI_TEST_UNSET_KEY
  model: text-embedding-3-small
vector_store:
  path: data/vectors
pipeline:
  top_k: 4
  chunker:
    global: false
"#;

    #[test]
    fn parses_sections_and_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();
        let cfg = load_config(file.path()).unwrap();

        assert_eq!(cfg.data.path, PathBuf::from("data/campaigns.json"));
        assert!(matches!(
            cfg.chat_provider,
            Some(ChatProviderConfig::OpenAiCompat { ref model, .. }) if model == "gpt-4o-mini"
        ));
        assert_eq!(cfg.pipeline.top_k, 4);
        assert_eq!(cfg.pipeline.max_citations, 3);
        assert!(!cfg.pipeline.chunker.global);
        assert!(cfg.pipeline.chunker.overview);

        let pipeline = pipeline_config(&cfg, true);
        assert!(pipeline.force_fallback);
        assert_eq!(pipeline.vector_store_path, Some(PathBuf::from("data/vectors")));
    }

    #[test]
    fn empty_config_is_valid() {
        let cfg: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert!(cfg.chat_provider.is_none());
        assert_eq!(cfg.pipeline.top_k, 5);
        assert!(resolve_providers(&cfg).is_none());
    }

    #[tokio::test]
    async fn unset_key_builds_fallback_pipeline() {
        let mut cfg: AppConfig = serde_yaml::from_str(YAML).unwrap();
        cfg.data.path = PathBuf::from("does/not/exist.json");
        cfg.vector_store.path = None;
        let pipeline = build_pipeline(&cfg, false).await;
        assert!(pipeline.is_fallback());
        assert!(pipeline.chunks().is_empty());
    }
}
