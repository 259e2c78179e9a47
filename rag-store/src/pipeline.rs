//! Indexing pipeline: extracted text → chunks → embeddings → per-document index.
//!
//! One run per trigger. A run moves the document to `pending_index`, then to
//! `indexed` or `error`. Nothing is returned to the trigger's caller except an
//! [`IndexingOutcome`]; stage failures become the recorded status.
//!
//! Runs and retractions for one `file_id` share a lock, so a retraction never
//! interleaves with a run that would rebuild the index it just deleted.

use std::{collections::HashMap, sync::Arc, time::Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::chunker::chunk;
use crate::config::ChunkConfig;
use crate::embed::EmbeddingGateway;
use crate::errors::RagError;
use crate::index_store::VectorIndexStore;
use crate::record::ChunkMetadata;
use crate::registry::{DocumentRegistry, IndexingStatus, SourceDocument};
use crate::worker::IndexTrigger;

/// Recorded next to `pending_index` once the last collection membership is
/// gone and the index was deleted. Recovery leaves such documents alone.
pub const RETRACTED_NOTE: &str = "retracted: no knowledge collection references this document";

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexingOutcome {
    pub file_id: String,
    pub status: IndexingStatus,
    pub index_name: Option<String>,
    pub chunks: usize,
    /// `"{stage}: {message}"` when the run failed.
    pub error: Option<String>,
    /// Re-add run dropped because the document left every collection.
    pub skipped: bool,
}

pub struct IndexingPipeline {
    registry: Arc<dyn DocumentRegistry>,
    index: VectorIndexStore,
    embeddings: EmbeddingGateway,
    chunking: ChunkConfig,
    run_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IndexingPipeline {
    pub fn new(
        registry: Arc<dyn DocumentRegistry>,
        index: VectorIndexStore,
        embeddings: EmbeddingGateway,
        chunking: ChunkConfig,
    ) -> Self {
        Self {
            registry,
            index,
            embeddings,
            chunking,
            run_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<dyn DocumentRegistry> {
        &self.registry
    }

    /// Runs the pipeline for one document. Never returns an error.
    ///
    /// Runs for the same `file_id` are serialized, so exactly one run writes
    /// the document's status at a time. A [`IndexTrigger::ReAdd`] run is
    /// skipped when the document no longer belongs to any collection.
    #[instrument(skip(self))]
    pub async fn run_indexing(&self, file_id: &str, trigger: IndexTrigger) -> IndexingOutcome {
        let lock = self.run_lock(file_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.run_locked(file_id, trigger).await
        };
        self.release_run_lock(file_id, lock).await;
        outcome
    }

    /// Deletes the document's index if no collection references it, then
    /// records `pending_index` with [`RETRACTED_NOTE`].
    ///
    /// Returns `false` when the document is unknown or still a member somewhere.
    #[instrument(skip(self))]
    pub async fn retract(&self, file_id: &str) -> Result<bool, RagError> {
        let lock = self.run_lock(file_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.retract_locked(file_id).await
        };
        self.release_run_lock(file_id, lock).await;
        result
    }

    async fn retract_locked(&self, file_id: &str) -> Result<bool, RagError> {
        if !self.registry.collections_of(file_id).await?.is_empty() {
            return Ok(false);
        }
        let Some(doc) = self.registry.get(file_id).await? else {
            return Ok(false);
        };

        self.index.delete_index(&doc.file_id, &doc.file_name).await?;
        self.registry
            .set_status(file_id, IndexingStatus::PendingIndex, Some(RETRACTED_NOTE.into()))
            .await?;
        info!(file_id, "index retracted");
        Ok(true)
    }

    async fn run_locked(&self, file_id: &str, trigger: IndexTrigger) -> IndexingOutcome {
        let started = Instant::now();

        let doc = match self.registry.get(file_id).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                error!(file_id, "indexing requested for unknown document");
                return failed(file_id, None, RagError::Registry("unknown document".into()));
            }
            Err(e) => {
                error!(file_id, error = %e, "registry lookup failed");
                return failed(file_id, None, e);
            }
        };

        if trigger == IndexTrigger::ReAdd {
            match self.registry.collections_of(file_id).await {
                Ok(cols) if cols.is_empty() => {
                    info!(file_id, "document left every collection; re-add run skipped");
                    return IndexingOutcome {
                        file_id: file_id.to_string(),
                        status: doc.indexing_status,
                        index_name: None,
                        chunks: 0,
                        error: None,
                        skipped: true,
                    };
                }
                Ok(_) => {}
                Err(e) => {
                    error!(file_id, error = %e, "membership lookup failed");
                    return failed(file_id, None, e);
                }
            }
        }

        self.write_status(file_id, IndexingStatus::PendingIndex, None)
            .await;

        match self.index_document(&doc).await {
            Ok((index_name, chunks)) => {
                self.write_status(file_id, IndexingStatus::Indexed, None)
                    .await;
                info!(
                    file_id,
                    index = %index_name,
                    chunks,
                    latency_ms = started.elapsed().as_millis(),
                    "document indexed"
                );
                IndexingOutcome {
                    file_id: file_id.to_string(),
                    status: IndexingStatus::Indexed,
                    index_name: Some(index_name),
                    chunks,
                    error: None,
                    skipped: false,
                }
            }
            Err(e) => {
                let reason = format!("{}: {e}", e.stage());
                error!(
                    file_id,
                    stage = e.stage(),
                    error = %e,
                    latency_ms = started.elapsed().as_millis(),
                    "indexing failed"
                );
                self.write_status(file_id, IndexingStatus::Error, Some(reason))
                    .await;
                let index_name = Some(self.index.index_name(&doc.file_id, &doc.file_name));
                failed(file_id, index_name, e)
            }
        }
    }

    async fn index_document(&self, doc: &SourceDocument) -> Result<(String, usize), RagError> {
        let text = doc
            .extracted_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| RagError::Extraction("no extracted text".into()))?;

        let meta = ChunkMetadata {
            file_id: doc.file_id.clone(),
            file_name: doc.file_name.clone(),
            file_type: doc.file_type.clone(),
            uploaded_by: doc.uploaded_by.clone(),
            uploaded_at: Some(doc.uploaded_at),
        };
        let chunks = chunk(text, self.chunking, &meta)?;
        if chunks.is_empty() {
            return Err(RagError::Chunking("zero chunks produced".into()));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embeddings.embed(&texts).await?;

        // Only created once there is something to write into it.
        let index_name = self.index.create_index(&doc.file_id, &doc.file_name).await?;

        let written = self
            .index
            .upsert_chunks(&doc.file_id, &doc.file_name, &chunks, vectors)
            .await?;

        if let Err(e) = self
            .index
            .prune_tail(&doc.file_id, &doc.file_name, written)
            .await
        {
            warn!(file_id = %doc.file_id, error = %e, "stale tail prune failed");
        }

        Ok((index_name, written))
    }

    async fn write_status(&self, file_id: &str, status: IndexingStatus, reason: Option<String>) {
        if let Err(e) = self.registry.set_status(file_id, status, reason).await {
            error!(file_id, %status, error = %e, "status write failed");
        }
    }

    async fn run_lock(&self, file_id: &str) -> Arc<Mutex<()>> {
        self.run_locks
            .lock()
            .await
            .entry(file_id.to_string())
            .or_default()
            .clone()
    }

    async fn release_run_lock(&self, file_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.run_locks.lock().await;
        // Map entry plus ours: nobody else is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(file_id);
        }
    }
}

fn failed(file_id: &str, index_name: Option<String>, e: RagError) -> IndexingOutcome {
    IndexingOutcome {
        file_id: file_id.to_string(),
        status: IndexingStatus::Error,
        index_name,
        chunks: 0,
        error: Some(format!("{}: {e}", e.stage())),
        skipped: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::{EmbedFuture, EmbeddingsProvider, hash_embedder::HashEmbedder};
    use crate::registry::InMemoryRegistry;
    use crate::store::memory::InMemoryVectorStore;

    const DIM: usize = 32;

    struct FailingProvider;

    impl EmbeddingsProvider for FailingProvider {
        fn embed_batch<'a>(&'a self, _texts: &'a [String]) -> EmbedFuture<'a> {
            Box::pin(async { Err(RagError::Embedding("provider unavailable".into())) })
        }
    }

    struct Harness {
        registry: Arc<InMemoryRegistry>,
        store: Arc<InMemoryVectorStore>,
        pipeline: IndexingPipeline,
    }

    fn harness(provider: Arc<dyn EmbeddingsProvider>) -> Harness {
        let registry = Arc::new(InMemoryRegistry::new());
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = IndexingPipeline::new(
            registry.clone(),
            VectorIndexStore::new(store.clone(), "doc", DIM),
            EmbeddingGateway::new(provider, DIM, 8),
            ChunkConfig::default(),
        );
        Harness {
            registry,
            store,
            pipeline,
        }
    }

    fn doc(id: &str, text: Option<&str>) -> SourceDocument {
        SourceDocument::new(id, format!("{id}.txt"), "txt", text.map(str::to_string), None)
    }

    #[tokio::test]
    async fn successful_run_marks_indexed() {
        let h = harness(Arc::new(HashEmbedder::new(DIM)));
        h.registry.insert(doc("1", Some(&"x".repeat(1000)))).await.unwrap();

        let out = h.pipeline.run_indexing("1", IndexTrigger::Upload).await;
        assert_eq!(out.status, IndexingStatus::Indexed);
        assert_eq!(out.chunks, 4);

        let stored = h.registry.get("1").await.unwrap().unwrap();
        assert_eq!(stored.indexing_status, IndexingStatus::Indexed);
        let name = out.index_name.unwrap();
        assert_eq!(h.store.point_count(&name).await, Some(4));
    }

    #[tokio::test]
    async fn reindexing_is_stable_and_prunes_tail() {
        let h = harness(Arc::new(HashEmbedder::new(DIM)));
        let text = "lorem ipsum ".repeat(200);
        h.registry.insert(doc("1", Some(&text))).await.unwrap();

        let first = h.pipeline.run_indexing("1", IndexTrigger::Upload).await;
        let second = h.pipeline.run_indexing("1", IndexTrigger::Upload).await;
        assert_eq!(first.chunks, second.chunks);
        assert_eq!(first.index_name, second.index_name);

        h.registry.insert(doc("1", Some("short text now"))).await.unwrap();
        let third = h.pipeline.run_indexing("1", IndexTrigger::Upload).await;
        assert_eq!(third.chunks, 1);
        assert_eq!(
            h.store.point_count(third.index_name.as_deref().unwrap()).await,
            Some(1)
        );
    }

    #[tokio::test]
    async fn missing_text_is_an_extraction_error() {
        let h = harness(Arc::new(HashEmbedder::new(DIM)));
        h.registry.insert(doc("1", None)).await.unwrap();
        h.registry.insert(doc("2", Some("   "))).await.unwrap();

        for id in ["1", "2"] {
            let out = h.pipeline.run_indexing(id, IndexTrigger::Upload).await;
            assert_eq!(out.status, IndexingStatus::Error);
            assert!(out.error.unwrap().starts_with("extraction"));
            let stored = h.registry.get(id).await.unwrap().unwrap();
            assert_eq!(stored.indexing_status, IndexingStatus::Error);
        }
    }

    #[tokio::test]
    async fn embedding_failure_is_recorded_not_raised() {
        let h = harness(Arc::new(FailingProvider));
        h.registry.insert(doc("1", Some("some content"))).await.unwrap();

        let out = h.pipeline.run_indexing("1", IndexTrigger::Upload).await;
        assert_eq!(out.status, IndexingStatus::Error);
        let stored = h.registry.get("1").await.unwrap().unwrap();
        assert_eq!(stored.indexing_status, IndexingStatus::Error);
        assert!(stored.last_error.unwrap().starts_with("embedding"));

        let name = h.pipeline.index.index_name("1", "1.txt");
        assert!(!h.pipeline.index.index_exists(&name).await.unwrap());
    }

    #[tokio::test]
    async fn readd_outside_any_collection_is_skipped() {
        let h = harness(Arc::new(HashEmbedder::new(DIM)));
        h.registry.insert(doc("1", Some("kept out"))).await.unwrap();

        let out = h.pipeline.run_indexing("1", IndexTrigger::ReAdd).await;
        assert!(out.skipped);
        assert_eq!(out.status, IndexingStatus::PendingIndex);
        let name = h.pipeline.index.index_name("1", "1.txt");
        assert!(!h.pipeline.index.index_exists(&name).await.unwrap());

        h.registry.add_to_collection("kb", "1").await.unwrap();
        let out = h.pipeline.run_indexing("1", IndexTrigger::ReAdd).await;
        assert!(!out.skipped);
        assert_eq!(out.status, IndexingStatus::Indexed);
    }

    #[tokio::test]
    async fn retract_keeps_index_while_a_collection_remains() {
        let h = harness(Arc::new(HashEmbedder::new(DIM)));
        h.registry.insert(doc("1", Some("shared notes"))).await.unwrap();
        h.registry.add_to_collection("kb", "1").await.unwrap();
        h.pipeline.run_indexing("1", IndexTrigger::ReAdd).await;
        let name = h.pipeline.index.index_name("1", "1.txt");

        assert!(!h.pipeline.retract("1").await.unwrap());
        assert!(h.pipeline.index.index_exists(&name).await.unwrap());

        h.registry.remove_from_collection("kb", "1").await.unwrap();
        assert!(h.pipeline.retract("1").await.unwrap());
        assert!(!h.pipeline.index.index_exists(&name).await.unwrap());
        let stored = h.registry.get("1").await.unwrap().unwrap();
        assert_eq!(stored.indexing_status, IndexingStatus::PendingIndex);
        assert_eq!(stored.last_error.as_deref(), Some(RETRACTED_NOTE));
    }

    #[tokio::test]
    async fn unknown_document_does_not_panic() {
        let h = harness(Arc::new(HashEmbedder::new(DIM)));
        let out = h.pipeline.run_indexing("ghost", IndexTrigger::Upload).await;
        assert_eq!(out.status, IndexingStatus::Error);
    }

    #[tokio::test]
    async fn concurrent_runs_for_one_document_serialize() {
        let h = Arc::new(harness(Arc::new(HashEmbedder::new(DIM))));
        h.registry.insert(doc("1", Some(&"y".repeat(900)))).await.unwrap();

        let runs = (0..4).map(|_| {
            let h = h.clone();
            tokio::spawn(async move { h.pipeline.run_indexing("1", IndexTrigger::Upload).await })
        });
        for r in futures::future::join_all(runs).await {
            assert_eq!(r.unwrap().status, IndexingStatus::Indexed);
        }
        assert!(h.pipeline.run_locks.lock().await.is_empty());
    }
}
