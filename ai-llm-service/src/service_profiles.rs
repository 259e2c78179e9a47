//! Shared LLM service with two active profiles: `chat` and `embedding`.
//!
//! - Lives in the same Tokio runtime as the application.
//! - Construct once, wrap in `Arc`, and pass clones to dependents.
//! - Caches underlying HTTP clients per config (endpoint+model+key+timeout+sampling).
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use ai_llm_service::{ChatMessage, LlmModelConfig, LlmProvider, LlmServiceProfiles};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ai_llm_service::AiLlmError> {
//!     let chat = LlmModelConfig {
//!         provider: LlmProvider::Ollama,
//!         model: "qwen3:14b".into(),
//!         endpoint: "http://localhost:11434".into(),
//!         api_key: None,
//!         max_tokens: Some(512),
//!         temperature: Some(0.2),
//!         top_p: None,
//!         timeout_secs: Some(120),
//!     };
//!     let embedding = LlmModelConfig { model: "bge-m3".into(), ..chat.clone() };
//!
//!     let svc = Arc::new(LlmServiceProfiles::new(chat, embedding)?);
//!     let reply = svc.chat(&[ChatMessage::user("Hello")], None).await;
//!     println!("{}", reply.response);
//!     let v = svc.embed("Ferris").await?;
//!     println!("dim = {}", v.len());
//!     Ok(())
//! }
//! ```

use std::{
    collections::HashMap,
    hash::{Hash, Hasher},
    sync::Arc,
};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{
    chat::{ChatMessage, ChatReply},
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::AiLlmError,
    services::{ollama_service::OllamaService, open_ai_service::OpenAiService},
};

/// Manages the **chat** and **embedding** profiles.
pub struct LlmServiceProfiles {
    chat: LlmModelConfig,
    embedding: LlmModelConfig,

    ollama: RwLock<HashMap<ClientKey, Arc<OllamaService>>>,
    openai: RwLock<HashMap<ClientKey, Arc<OpenAiService>>>,
}

impl LlmServiceProfiles {
    /// Creates a new service. Both configs are validated up front.
    pub fn new(chat: LlmModelConfig, embedding: LlmModelConfig) -> Result<Self, AiLlmError> {
        chat.validate()?;
        embedding.validate()?;
        Ok(Self {
            chat,
            embedding,
            ollama: RwLock::new(HashMap::new()),
            openai: RwLock::new(HashMap::new()),
        })
    }

    /// Chat completion that never fails.
    ///
    /// Provider errors are logged and surfaced as `ChatReply { success: false, .. }`
    /// so callers can decide how to degrade.
    pub async fn chat(&self, messages: &[ChatMessage], max_tokens: Option<u32>) -> ChatReply {
        match self.try_chat(messages, max_tokens).await {
            Ok(text) => ChatReply::ok(text),
            Err(err) => {
                warn!(error = %err, model = %self.chat.model, "chat completion failed");
                ChatReply::failed(err.to_string())
            }
        }
    }

    /// Chat completion with the error propagated.
    pub async fn try_chat(
        &self,
        messages: &[ChatMessage],
        max_tokens: Option<u32>,
    ) -> Result<String, AiLlmError> {
        if messages.is_empty() {
            return Err(AiLlmError::EmptyInput("chat messages"));
        }
        match self.chat.provider {
            LlmProvider::Ollama => {
                let cli = self.get_or_init_ollama(&self.chat).await?;
                cli.chat(messages, max_tokens).await
            }
            LlmProvider::OpenAI => {
                let cli = self.get_or_init_openai(&self.chat).await?;
                cli.chat(messages, max_tokens).await
            }
        }
    }

    /// Embeds a batch with the **embedding** profile. Output order matches input.
    pub async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AiLlmError> {
        if inputs.is_empty() {
            return Err(AiLlmError::EmptyInput("embedding inputs"));
        }
        debug!(inputs = inputs.len(), model = %self.embedding.model, "embed batch");
        match self.embedding.provider {
            LlmProvider::Ollama => {
                let cli = self.get_or_init_ollama(&self.embedding).await?;
                cli.embed_batch(inputs).await
            }
            LlmProvider::OpenAI => {
                let cli = self.get_or_init_openai(&self.embedding).await?;
                cli.embed_batch(inputs).await
            }
        }
    }

    /// Embeds a single input.
    pub async fn embed(&self, input: &str) -> Result<Vec<f32>, AiLlmError> {
        let mut out = self.embed_batch(&[input.to_string()]).await?;
        out.pop().ok_or(AiLlmError::EmptyInput("embedding output"))
    }

    /* --------------------- Internals --------------------- */

    async fn get_or_init_ollama(
        &self,
        cfg: &LlmModelConfig,
    ) -> Result<Arc<OllamaService>, AiLlmError> {
        let key = ClientKey::from(cfg);
        if let Some(cli) = self.ollama.read().await.get(&key).cloned() {
            return Ok(cli);
        }
        let mut w = self.ollama.write().await;
        if let Some(cli) = w.get(&key) {
            return Ok(cli.clone());
        }
        let cli = Arc::new(OllamaService::new(cfg.clone())?);
        w.insert(key, cli.clone());
        Ok(cli)
    }

    async fn get_or_init_openai(
        &self,
        cfg: &LlmModelConfig,
    ) -> Result<Arc<OpenAiService>, AiLlmError> {
        let key = ClientKey::from(cfg);
        if let Some(cli) = self.openai.read().await.get(&key).cloned() {
            return Ok(cli);
        }
        let mut w = self.openai.write().await;
        if let Some(cli) = w.get(&key) {
            return Ok(cli.clone());
        }
        let cli = Arc::new(OpenAiService::new(cfg.clone())?);
        w.insert(key, cli.clone());
        Ok(cli)
    }
}

/// Internal cache key to identify unique client configs.
#[derive(Clone, Eq)]
struct ClientKey {
    provider: LlmProvider,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Option<u64>,
    max_tokens: Option<u32>,
    temperature_bits: Option<u32>,
    top_p_bits: Option<u32>,
}

impl From<&LlmModelConfig> for ClientKey {
    fn from(cfg: &LlmModelConfig) -> Self {
        Self {
            provider: cfg.provider,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
            timeout: cfg.timeout_secs,
            max_tokens: cfg.max_tokens,
            temperature_bits: cfg.temperature.map(f32::to_bits),
            top_p_bits: cfg.top_p.map(f32::to_bits),
        }
    }
}

impl PartialEq for ClientKey {
    fn eq(&self, other: &Self) -> bool {
        self.provider == other.provider
            && self.endpoint == other.endpoint
            && self.model == other.model
            && self.api_key == other.api_key
            && self.timeout == other.timeout
            && self.max_tokens == other.max_tokens
            && self.temperature_bits == other.temperature_bits
            && self.top_p_bits == other.top_p_bits
    }
}

impl Hash for ClientKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.provider.hash(state);
        self.endpoint.hash(state);
        self.model.hash(state);
        if let Some(ref k) = self.api_key {
            k.hash(state);
        } else {
            0usize.hash(state);
        }
        self.timeout.hash(state);
        self.max_tokens.hash(state);
        self.temperature_bits.hash(state);
        self.top_p_bits.hash(state);
    }
}
