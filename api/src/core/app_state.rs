use std::sync::Arc;

use ai_llm_service::{LlmServiceProfiles, config::default_config::profiles_from_env};
use chrono::{DateTime, Utc};
use contextor::{Router, RouterConfig};
use rag_store::{RagConfig, RagStore};
use tracing::info;

use crate::error_handler::AppError;

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registry, indexes and the background indexing queue.
    pub rag: RagStore,
    /// Query-time answerer over the same store.
    pub router: Router,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(rag: RagStore, router: Router) -> Self {
        Self {
            rag,
            router,
            started_at: Utc::now(),
        }
    }

    /// Builds LLM profiles, the RAG store and the router from environment
    /// variables, then applies the crash-recovery policy.
    pub async fn from_env() -> Result<Self, AppError> {
        let (chat, embedding) = profiles_from_env()?;
        let llm = Arc::new(LlmServiceProfiles::new(chat, embedding)?);

        let rag = RagStore::from_config(RagConfig::from_env()?, llm.clone()).await?;
        let rescheduled = rag.recover().await?;
        if rescheduled > 0 {
            info!(rescheduled, "pending documents re-queued");
        }

        let router = Router::new(rag.clone(), llm, RouterConfig::from_env()?)?;
        Ok(Self::new(rag, router))
    }
}
