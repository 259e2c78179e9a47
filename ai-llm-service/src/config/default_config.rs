//! Default LLM configs loaded strictly from environment variables.
//!
//! Two roles are resolved:
//!
//! - **Chat**      → answer synthesis (`LLM_KIND`)
//! - **Embedding** → chunk/query vectors (`EMBEDDING_KIND`, defaults to `LLM_KIND`)
//!
//! # Environment variables
//!
//! Common:
//! - `LLM_KIND`       = `ollama` (default) or `openai`
//! - `EMBEDDING_KIND` = optional override for the embedding profile
//! - `LLM_MAX_TOKENS` = optional max tokens (u32)
//!
//! Ollama:
//! - `OLLAMA_URL` or `OLLAMA_PORT` = endpoint
//! - `OLLAMA_MODEL`                = chat model
//! - `EMBEDDING_MODEL`             = embedding model
//!
//! OpenAI-compatible:
//! - `OPENAI_API_KEY`          = bearer token
//! - `OPENAI_URL`              = base URL (default `https://api.openai.com`)
//! - `OPENAI_MODEL`            = chat model
//! - `OPENAI_EMBEDDING_MODEL`  = embedding model (falls back to `EMBEDDING_MODEL`)

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{AiLlmError, ConfigError, env_opt_u32, must_env},
};

/// Resolves the Ollama endpoint.
///
/// Precedence: `OLLAMA_URL` if non-empty, else `OLLAMA_PORT` → `http://localhost:{port}`.
fn ollama_endpoint() -> Result<String, AiLlmError> {
    if let Ok(url) = std::env::var("OLLAMA_URL") {
        if !url.trim().is_empty() {
            return Ok(url.trim().to_string());
        }
    }
    if let Ok(port) = std::env::var("OLLAMA_PORT") {
        if !port.trim().is_empty() {
            port.trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidNumber {
                    var: "OLLAMA_PORT",
                    reason: "expected u16 (1..=65535)",
                })?;
            return Ok(format!("http://localhost:{}", port.trim()));
        }
    }
    Err(ConfigError::MissingVar("OLLAMA_URL or OLLAMA_PORT").into())
}

fn openai_endpoint() -> String {
    std::env::var("OPENAI_URL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "https://api.openai.com".to_string())
}

fn provider_from_env(var: &'static str) -> Result<Option<LlmProvider>, AiLlmError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(Some(v.parse::<LlmProvider>()?)),
        _ => Ok(None),
    }
}

/// Chat profile for Ollama. Low temperature keeps answers close to the context.
pub fn config_ollama_chat() -> Result<LlmModelConfig, AiLlmError> {
    Ok(LlmModelConfig {
        provider: LlmProvider::Ollama,
        model: must_env("OLLAMA_MODEL")?,
        endpoint: ollama_endpoint()?,
        api_key: None,
        max_tokens: env_opt_u32("LLM_MAX_TOKENS")?,
        temperature: Some(0.2),
        top_p: None,
        timeout_secs: Some(600),
    })
}

/// Embedding profile for Ollama.
pub fn config_ollama_embedding() -> Result<LlmModelConfig, AiLlmError> {
    Ok(LlmModelConfig {
        provider: LlmProvider::Ollama,
        model: must_env("EMBEDDING_MODEL")?,
        endpoint: ollama_endpoint()?,
        api_key: None,
        max_tokens: None,
        temperature: Some(0.0),
        top_p: None,
        timeout_secs: Some(60),
    })
}

/// Chat profile for an OpenAI-compatible backend.
pub fn config_openai_chat() -> Result<LlmModelConfig, AiLlmError> {
    Ok(LlmModelConfig {
        provider: LlmProvider::OpenAI,
        model: must_env("OPENAI_MODEL")?,
        endpoint: openai_endpoint(),
        api_key: Some(must_env("OPENAI_API_KEY")?),
        max_tokens: env_opt_u32("LLM_MAX_TOKENS")?,
        temperature: Some(0.2),
        top_p: None,
        timeout_secs: Some(120),
    })
}

/// Embedding profile for an OpenAI-compatible backend.
pub fn config_openai_embedding() -> Result<LlmModelConfig, AiLlmError> {
    let model = must_env("OPENAI_EMBEDDING_MODEL").or_else(|_| must_env("EMBEDDING_MODEL"))?;
    Ok(LlmModelConfig {
        provider: LlmProvider::OpenAI,
        model,
        endpoint: openai_endpoint(),
        api_key: Some(must_env("OPENAI_API_KEY")?),
        max_tokens: None,
        temperature: None,
        top_p: None,
        timeout_secs: Some(60),
    })
}

/// Resolves `(chat, embedding)` configs according to `LLM_KIND` / `EMBEDDING_KIND`.
pub fn profiles_from_env() -> Result<(LlmModelConfig, LlmModelConfig), AiLlmError> {
    let chat_kind = provider_from_env("LLM_KIND")?.unwrap_or(LlmProvider::Ollama);
    let embed_kind = provider_from_env("EMBEDDING_KIND")?.unwrap_or(chat_kind);

    let chat = match chat_kind {
        LlmProvider::Ollama => config_ollama_chat()?,
        LlmProvider::OpenAI => config_openai_chat()?,
    };
    let embedding = match embed_kind {
        LlmProvider::Ollama => config_ollama_embedding()?,
        LlmProvider::OpenAI => config_openai_embedding()?,
    };
    Ok((chat, embedding))
}
