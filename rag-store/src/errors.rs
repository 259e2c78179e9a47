//! Unified error types for the crate.

use thiserror::Error;

/// Top-level error for rag-store operations.
///
/// The first six variants mirror the indexing stages; a pipeline run maps any
/// of them to a terminal `error` status instead of returning it to the caller.
#[derive(Debug, Error)]
pub enum RagError {
    /// No extracted text is available for the document.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// The vector store rejected index creation or was unreachable.
    #[error("index creation error: {0}")]
    IndexCreation(String),

    /// Degenerate chunking configuration or zero chunks produced.
    #[error("chunking error: {0}")]
    Chunking(String),

    /// Embedding provider failure or empty batch.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Write failure or acknowledged count mismatch.
    #[error("upsert error: {0}")]
    Upsert(String),

    /// Read failure; callers treat it as "no results".
    #[error("search error: {0}")]
    Search(String),

    /// Invalid or unsupported configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Document registry failure (lookup, status write).
    #[error("registry error: {0}")]
    Registry(String),

    /// The background indexing dispatcher has stopped accepting jobs.
    #[error("indexing queue unavailable: {0}")]
    QueueClosed(String),

    /// Mismatch in vector dimensionality.
    #[error("vector size mismatch: got {got}, want {want}")]
    VectorSizeMismatch { got: usize, want: usize },
}

impl RagError {
    /// Short stage label used in logs and recorded failure reasons.
    pub fn stage(&self) -> &'static str {
        match self {
            RagError::Extraction(_) => "extraction",
            RagError::IndexCreation(_) => "index_creation",
            RagError::Chunking(_) => "chunking",
            RagError::Embedding(_) | RagError::VectorSizeMismatch { .. } => "embedding",
            RagError::Upsert(_) => "upsert",
            RagError::Search(_) => "search",
            RagError::Config(_) => "config",
            RagError::Registry(_) => "registry",
            RagError::QueueClosed(_) => "queue",
        }
    }
}

impl From<sqlx::Error> for RagError {
    fn from(e: sqlx::Error) -> Self {
        RagError::Registry(e.to_string())
    }
}

impl From<ai_llm_service::AiLlmError> for RagError {
    fn from(e: ai_llm_service::AiLlmError) -> Self {
        RagError::Embedding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_mismatch_is_an_embedding_stage_failure() {
        let e = RagError::VectorSizeMismatch { got: 3, want: 4 };
        assert_eq!(e.stage(), "embedding");
        assert_eq!(RagError::Upsert("x".into()).stage(), "upsert");
    }
}
