//! Per-document RAG indexing: chunking, embeddings, vector indexes and the
//! background pipeline that keeps them in sync with the document registry.
//!
//! Every uploaded document gets its own vector index whose name is a pure
//! function of `(file_id, file_name)`. Uploads and knowledge-collection adds
//! schedule a pipeline run and return immediately; the run records
//! `indexed` or `error` on the document.

pub mod chunker;
pub mod config;
pub mod embed;
pub mod errors;
pub mod index_store;
pub mod naming;
pub mod pipeline;
pub mod record;
pub mod registry;
pub mod store;
pub mod worker;

use std::sync::Arc;

use ai_llm_service::LlmServiceProfiles;
use tracing::{debug, info, trace};

pub use chunker::chunk;
pub use config::{ChunkConfig, DistanceKind, RagConfig, VectorBackend};
pub use embed::{
    EmbeddingGateway, EmbeddingsProvider, hash_embedder::HashEmbedder,
    profile_embedder::ProfileEmbedder,
};
pub use errors::RagError;
pub use index_store::VectorIndexStore;
pub use pipeline::{IndexingOutcome, IndexingPipeline, RETRACTED_NOTE};
pub use record::{Chunk, ChunkMetadata, ChunkPayload, ScoredChunk, VectorRecord};
pub use registry::{
    DocumentRegistry, InMemoryRegistry, IndexingStatus, SourceDocument, SqliteRegistry,
};
pub use store::{VectorStore, memory::InMemoryVectorStore, qdrant::QdrantStore};
pub use worker::{IndexTrigger, IndexingQueue, recover_pending};

/// High-level facade that wires registry, vector store, embeddings and the queue.
///
/// This is the single entry point recommended for application code.
#[derive(Clone)]
pub struct RagStore {
    cfg: RagConfig,
    registry: Arc<dyn DocumentRegistry>,
    index: VectorIndexStore,
    embeddings: EmbeddingGateway,
    pipeline: Arc<IndexingPipeline>,
    queue: IndexingQueue,
}

impl RagStore {
    /// Assembles the store from explicit parts and starts the indexing queue.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        cfg: RagConfig,
        provider: Arc<dyn EmbeddingsProvider>,
        vectors: Arc<dyn VectorStore>,
        registry: Arc<dyn DocumentRegistry>,
    ) -> Result<Self, RagError> {
        cfg.validate()?;
        trace!(backend = ?cfg.backend, prefix = %cfg.index_prefix, "RagStore::new");

        let index = VectorIndexStore::new(vectors, cfg.index_prefix.clone(), cfg.embedding_dim);
        let embeddings = EmbeddingGateway::new(provider, cfg.embedding_dim, cfg.embedding_batch);
        let pipeline = Arc::new(IndexingPipeline::new(
            registry.clone(),
            index.clone(),
            embeddings.clone(),
            cfg.chunk,
        ));
        let (queue, _dispatcher) = IndexingQueue::start(pipeline.clone(), cfg.index_concurrency);

        Ok(Self {
            cfg,
            registry,
            index,
            embeddings,
            pipeline,
            queue,
        })
    }

    /// Builds backends from config: Qdrant or in-memory vectors, SQLite or
    /// in-memory registry, embeddings through the shared LLM profiles.
    pub async fn from_config(
        cfg: RagConfig,
        llm: Arc<LlmServiceProfiles>,
    ) -> Result<Self, RagError> {
        cfg.validate()?;

        let vectors: Arc<dyn VectorStore> = match cfg.backend {
            VectorBackend::Qdrant => Arc::new(QdrantStore::new(&cfg)?),
            VectorBackend::Memory => Arc::new(InMemoryVectorStore::new()),
        };

        let registry: Arc<dyn DocumentRegistry> = if cfg.registry_url.trim() == "memory" {
            Arc::new(InMemoryRegistry::new())
        } else {
            Arc::new(SqliteRegistry::connect(&cfg.registry_url, 5).await?)
        };

        let store = Self::new(cfg, Arc::new(ProfileEmbedder::new(llm)), vectors, registry)?;
        info!(
            backend = ?store.cfg.backend,
            registry = %store.cfg.registry_url,
            dim = store.cfg.embedding_dim,
            "rag store ready"
        );
        Ok(store)
    }

    pub fn config(&self) -> &RagConfig {
        &self.cfg
    }

    pub fn registry(&self) -> &Arc<dyn DocumentRegistry> {
        &self.registry
    }

    pub fn index(&self) -> &VectorIndexStore {
        &self.index
    }

    pub fn embeddings(&self) -> &EmbeddingGateway {
        &self.embeddings
    }

    pub fn queue(&self) -> &IndexingQueue {
        &self.queue
    }

    /// Applies the configured crash-recovery policy. Returns how many runs were scheduled.
    pub async fn recover(&self) -> Result<usize, RagError> {
        recover_pending(
            self.registry.as_ref(),
            &self.queue,
            self.cfg.reindex_pending_on_start,
        )
        .await
    }

    /// Registers an uploaded document and schedules its first indexing run.
    ///
    /// Returns once the document is stored; indexing proceeds in the background.
    pub async fn upload(&self, mut doc: SourceDocument) -> Result<SourceDocument, RagError> {
        doc.indexing_status = IndexingStatus::PendingIndex;
        doc.last_error = None;
        self.registry.insert(doc.clone()).await?;
        self.queue.schedule(doc.file_id.clone(), IndexTrigger::Upload)?;
        debug!(file_id = %doc.file_id, "upload accepted");
        Ok(doc)
    }

    pub async fn document(&self, file_id: &str) -> Result<Option<SourceDocument>, RagError> {
        self.registry.get(file_id).await
    }

    /// Adds a document to a knowledge collection and always schedules a fresh
    /// run, whatever its current status.
    pub async fn add_to_collection(&self, collection: &str, file_id: &str) -> Result<(), RagError> {
        self.registry.add_to_collection(collection, file_id).await?;
        self.queue.schedule(file_id, IndexTrigger::ReAdd)?;
        Ok(())
    }

    /// Removes a document from a collection. Once no collection references
    /// the document, its index is deleted under the document's run lock and
    /// the status goes back to `pending_index` with [`RETRACTED_NOTE`].
    ///
    /// Returns `true` if the membership existed.
    pub async fn remove_from_collection(
        &self,
        collection: &str,
        file_id: &str,
    ) -> Result<bool, RagError> {
        let removed = self
            .registry
            .remove_from_collection(collection, file_id)
            .await?;
        if !removed {
            return Ok(false);
        }

        if self.registry.collections_of(file_id).await?.is_empty() {
            self.pipeline.retract(file_id).await?;
        }
        Ok(true)
    }
}
