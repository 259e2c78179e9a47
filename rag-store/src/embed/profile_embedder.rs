//! Embedding provider backed by the shared LLM service profiles.

use std::sync::Arc;

use ai_llm_service::LlmServiceProfiles;

use crate::embed::{EmbedFuture, EmbeddingsProvider};

/// Sends batches to the **embedding** profile (Ollama or OpenAI-compatible).
#[derive(Clone)]
pub struct ProfileEmbedder {
    svc: Arc<LlmServiceProfiles>,
}

impl ProfileEmbedder {
    pub fn new(svc: Arc<LlmServiceProfiles>) -> Self {
        Self { svc }
    }
}

impl EmbeddingsProvider for ProfileEmbedder {
    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> EmbedFuture<'a> {
        Box::pin(async move { Ok(self.svc.embed_batch(texts).await?) })
    }
}
