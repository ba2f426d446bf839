use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

pub use ads_error::{AdsError, Result};

mod canned;
pub use canned::CannedResponder;

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, system: &str, prompt: &str) -> Result<String>;
    fn model_name(&self) -> &str;
}

#[async_trait]
pub trait EmbedModel: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn model_name(&self) -> &str;
}

const PLACEHOLDER_KEYS: [&str; 2] = ["your_actual_openai_api_key_here", "your_openai_api_key_here"];

/// Rejects empty, placeholder and implausibly short credentials.
pub fn validate_api_key(key: &str) -> Result<()> {
    let key = key.trim();
    if key.is_empty() {
        return Err(AdsError::backend_unavailable("credentials", "API key is empty"));
    }
    if PLACEHOLDER_KEYS.contains(&key) {
        return Err(AdsError::backend_unavailable(
            "credentials",
            "API key is a placeholder value",
        ));
    }
    if key.len() <= 10 {
        return Err(AdsError::backend_unavailable("credentials", "API key is too short"));
    }
    Ok(())
}

fn resolve_api_key(env_var: &str) -> Result<String> {
    let key = std::env::var(env_var).map_err(|_| {
        AdsError::backend_unavailable("credentials", format!("{} is not set", env_var))
    })?;
    validate_api_key(&key)?;
    Ok(key)
}

// ========== OpenAI-compatible (chat + embeddings) ==========

#[derive(Clone)]
pub struct OpenAiCompatConfig {
    pub base_url: String,                // e.g. https://api.openai.com
    pub api_key: String,                 // Bearer token
    pub chat_model: String,              // e.g. gpt-4o-mini
    pub embedding_model: Option<String>, // e.g. text-embedding-3-small
    pub temperature: Option<f32>,
}

#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: Client,
    cfg: OpenAiCompatConfig,
}

impl OpenAiCompatClient {
    pub fn new(cfg: OpenAiCompatConfig) -> Self {
        Self {
            http: Client::new(),
            cfg,
        }
    }
}

#[derive(Serialize)]
struct OaiChatReqMsg {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct OaiChatReq {
    model: String,
    messages: Vec<OaiChatReqMsg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct OaiChatRespChoiceMsg {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OaiChatRespChoice {
    message: OaiChatRespChoiceMsg,
}

#[derive(Deserialize)]
struct OaiChatResp {
    choices: Vec<OaiChatRespChoice>,
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    #[instrument(skip(self, system, prompt), fields(model = %self.cfg.chat_model))]
    async fn chat(&self, system: &str, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        );
        let body = OaiChatReq {
            model: self.cfg.chat_model.clone(),
            messages: vec![
                OaiChatReqMsg {
                    role: "system",
                    content: system.to_string(),
                },
                OaiChatReqMsg {
                    role: "user",
                    content: prompt.to_string(),
                },
            ],
            temperature: self.cfg.temperature,
        };

        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let txt = resp.text().await.unwrap_or_default();
            return Err(AdsError::LlmService {
                provider: "openai_compat".to_string(),
                message: format!("status={} body={}", status, txt),
                retry_after: None,
            });
        }

        let data: OaiChatResp = resp.json().await?;
        data.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AdsError::LlmService {
                provider: "openai_compat".to_string(),
                message: "response contained no completion".to_string(),
                retry_after: None,
            })
    }

    fn model_name(&self) -> &str {
        &self.cfg.chat_model
    }
}

#[derive(Serialize)]
struct OaiEmbedReq {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct OaiEmbedData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct OaiEmbedResp {
    data: Vec<OaiEmbedData>,
}

#[async_trait]
impl EmbedModel for OpenAiCompatClient {
    #[instrument(skip(self, texts), fields(batch = texts.len()))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self
            .cfg
            .embedding_model
            .clone()
            .ok_or_else(|| AdsError::Configuration {
                key: "embedding_model".to_string(),
                reason: "not configured".to_string(),
            })?;
        let url = format!("{}/v1/embeddings", self.cfg.base_url.trim_end_matches('/'));
        let body = OaiEmbedReq {
            model,
            input: texts.to_vec(),
        };

        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let txt = resp.text().await.unwrap_or_default();
            return Err(AdsError::EmbeddingService {
                provider: "openai_compat".to_string(),
                message: format!("status={} body={}", status, txt),
                retry_after: None,
            });
        }

        let data: OaiEmbedResp = resp.json().await?;
        if data.data.len() != texts.len() {
            return Err(AdsError::EmbeddingService {
                provider: "openai_compat".to_string(),
                message: format!("expected {} embeddings, got {}", texts.len(), data.data.len()),
                retry_after: None,
            });
        }
        Ok(data.data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_name(&self) -> &str {
        self.cfg
            .embedding_model
            .as_deref()
            .unwrap_or(&self.cfg.chat_model)
    }
}

// ========== Anthropic (Claude) ==========

#[derive(Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,   // e.g. claude-3-5-haiku-latest
    pub api_url: String, // default https://api.anthropic.com
    pub temperature: Option<f32>,
}

#[derive(Clone)]
pub struct AnthropicClient {
    http: Client,
    cfg: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(cfg: AnthropicConfig) -> Self {
        Self {
            http: Client::new(),
            cfg,
        }
    }
}

#[derive(Serialize)]
struct AnthMessageReqMsg {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct AnthMessageReq {
    model: String,
    system: String,
    messages: Vec<AnthMessageReqMsg>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct AnthMessageRespContent {
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthMessageResp {
    content: Vec<AnthMessageRespContent>,
}

#[async_trait]
impl ChatModel for AnthropicClient {
    #[instrument(skip(self, system, prompt), fields(model = %self.cfg.model))]
    async fn chat(&self, system: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.cfg.api_url.trim_end_matches('/'));
        let body = AnthMessageReq {
            model: self.cfg.model.clone(),
            system: system.to_string(),
            messages: vec![AnthMessageReqMsg {
                role: "user",
                content: prompt.to_string(),
            }],
            max_tokens: 2048,
            temperature: self.cfg.temperature,
        };

        let resp = self
            .http
            .post(url)
            .header("x-api-key", &self.cfg.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let txt = resp.text().await.unwrap_or_default();
            return Err(AdsError::LlmService {
                provider: "anthropic".to_string(),
                message: format!("status={} body={}", status, txt),
                retry_after: None,
            });
        }

        let data: AnthMessageResp = resp.json().await?;
        let out: String = data.content.into_iter().filter_map(|c| c.text).collect();
        Ok(out)
    }

    fn model_name(&self) -> &str {
        &self.cfg.model
    }
}

// ========== Provider Factory & Config ==========

/// Credentials are referenced by environment variable name, never stored in config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ChatProviderConfig {
    #[serde(rename = "openai_compat")]
    OpenAiCompat {
        base_url: String,
        api_key_env: String,
        model: String,
    },
    #[serde(rename = "anthropic")]
    Anthropic {
        api_url: Option<String>,
        api_key_env: String,
        model: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EmbedProviderConfig {
    #[serde(rename = "openai_compat")]
    OpenAiCompat {
        base_url: String,
        api_key_env: String,
        model: String,
    },
}

#[derive(Clone)]
pub struct Providers {
    pub chat: Arc<dyn ChatModel>,
    pub embed: Arc<dyn EmbedModel>,
}

/// Builds both external clients. Missing or invalid credentials surface as
/// `BackendUnavailable` so callers can switch to the offline backends.
pub fn make_providers(
    chat: &ChatProviderConfig,
    embed: &EmbedProviderConfig,
    temperature: Option<f32>,
) -> Result<Providers> {
    let chat_model: Arc<dyn ChatModel> = match chat {
        ChatProviderConfig::OpenAiCompat {
            base_url,
            api_key_env,
            model,
        } => Arc::new(OpenAiCompatClient::new(OpenAiCompatConfig {
            base_url: base_url.clone(),
            api_key: resolve_api_key(api_key_env)?,
            chat_model: model.clone(),
            embedding_model: None,
            temperature,
        })),
        ChatProviderConfig::Anthropic {
            api_url,
            api_key_env,
            model,
        } => Arc::new(AnthropicClient::new(AnthropicConfig {
            api_url: api_url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com".into()),
            api_key: resolve_api_key(api_key_env)?,
            model: model.clone(),
            temperature,
        })),
    };

    let embed_model: Arc<dyn EmbedModel> = match embed {
        EmbedProviderConfig::OpenAiCompat {
            base_url,
            api_key_env,
            model,
        } => Arc::new(OpenAiCompatClient::new(OpenAiCompatConfig {
            base_url: base_url.clone(),
            api_key: resolve_api_key(api_key_env)?,
            chat_model: String::new(),
            embedding_model: Some(model.clone()),
            temperature: None,
        })),
    };

    info!(
        chat_model = chat_model.model_name(),
        embed_model = embed_model.model_name(),
        "external providers configured"
    );
    Ok(Providers {
        chat: chat_model,
        embed: embed_model,
    })
}
