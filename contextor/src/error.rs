//! Typed error for the contextor crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextorError {
    /// Errors from the underlying rag-store crate.
    #[error("RAG error: {0}")]
    Rag(#[from] rag_store::RagError),

    /// Chat model failure (transport, provider status).
    #[error("LLM error: {0}")]
    Llm(String),

    /// Model output did not contain a valid synthesis object.
    #[error("synthesis parse error: {0}")]
    SynthesisParse(String),

    /// Invalid router configuration.
    #[error("config error: {0}")]
    Config(String),
}
