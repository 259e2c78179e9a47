//! Background indexing queue.
//!
//! [`IndexingQueue::schedule`] is synchronous and returns as soon as the job is
//! enqueued. A dispatcher task drains the channel and spawns one task per job,
//! bounded by a semaphore. Each job is attempted once; a panic inside a run is
//! caught at the join handle and recorded as `error`.

use std::{fmt, sync::Arc};

use serde::Serialize;
use tokio::{
    sync::{Semaphore, broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::errors::RagError;
use crate::pipeline::{IndexingOutcome, IndexingPipeline, RETRACTED_NOTE};
use crate::registry::{DocumentRegistry, IndexingStatus};

/// What caused a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexTrigger {
    Upload,
    /// Document (re-)added to a knowledge collection.
    ReAdd,
    /// Startup re-scan of documents left in `pending_index`.
    Recovery,
}

impl fmt::Display for IndexTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IndexTrigger::Upload => "upload",
            IndexTrigger::ReAdd => "re_add",
            IndexTrigger::Recovery => "recovery",
        })
    }
}

#[derive(Debug)]
struct Job {
    file_id: String,
    trigger: IndexTrigger,
}

/// Handle used to schedule pipeline runs. Cheap to clone.
#[derive(Clone)]
pub struct IndexingQueue {
    tx: mpsc::UnboundedSender<Job>,
    outcomes: broadcast::Sender<IndexingOutcome>,
}

impl IndexingQueue {
    /// Spawns the dispatcher on the current Tokio runtime.
    pub fn start(pipeline: Arc<IndexingPipeline>, concurrency: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (outcomes, _) = broadcast::channel(256);
        let dispatcher = tokio::spawn(dispatch(
            rx,
            pipeline,
            Arc::new(Semaphore::new(concurrency.max(1))),
            outcomes.clone(),
        ));
        (Self { tx, outcomes }, dispatcher)
    }

    /// Enqueues a run and returns immediately.
    ///
    /// # Errors
    /// `RagError::QueueClosed` only if the dispatcher has stopped.
    pub fn schedule(&self, file_id: impl Into<String>, trigger: IndexTrigger) -> Result<(), RagError> {
        let file_id = file_id.into();
        debug!(%file_id, %trigger, "scheduling indexing run");
        self.tx
            .send(Job { file_id, trigger })
            .map_err(|e| RagError::QueueClosed(format!("dropped run for {}", e.0.file_id)))
    }

    /// Stream of finished runs. Slow receivers may miss outcomes.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexingOutcome> {
        self.outcomes.subscribe()
    }
}

async fn dispatch(
    mut rx: mpsc::UnboundedReceiver<Job>,
    pipeline: Arc<IndexingPipeline>,
    permits: Arc<Semaphore>,
    outcomes: broadcast::Sender<IndexingOutcome>,
) {
    while let Some(job) = rx.recv().await {
        let permit = match permits.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => break,
        };
        let pipeline = pipeline.clone();
        let outcomes = outcomes.clone();

        tokio::spawn(async move {
            let Job { file_id, trigger } = job;
            let run = {
                let pipeline = pipeline.clone();
                let file_id = file_id.clone();
                tokio::spawn(async move { pipeline.run_indexing(&file_id, trigger).await })
            };

            let outcome = match run.await {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    error!(%file_id, %trigger, error = %join_err, "indexing task aborted");
                    let reason = format!("task: {join_err}");
                    if let Err(e) = pipeline
                        .registry()
                        .set_status(&file_id, IndexingStatus::Error, Some(reason.clone()))
                        .await
                    {
                        error!(%file_id, error = %e, "status write failed after abort");
                    }
                    IndexingOutcome {
                        file_id: file_id.clone(),
                        status: IndexingStatus::Error,
                        index_name: None,
                        chunks: 0,
                        error: Some(reason),
                        skipped: false,
                    }
                }
            };

            info!(
                %file_id,
                %trigger,
                status = %outcome.status,
                chunks = outcome.chunks,
                skipped = outcome.skipped,
                "indexing run finished"
            );
            let _ = outcomes.send(outcome);
            drop(permit);
        });
    }
    debug!("indexing dispatcher stopped");
}

/// Startup scan for documents a previous process left in `pending_index`.
///
/// Retracted documents are not pending work and are ignored. With
/// `reindex = false` the rest are only reported. Returns how many were scheduled.
pub async fn recover_pending(
    registry: &dyn DocumentRegistry,
    queue: &IndexingQueue,
    reindex: bool,
) -> Result<usize, RagError> {
    let pending: Vec<_> = registry
        .list_by_status(IndexingStatus::PendingIndex)
        .await?
        .into_iter()
        .filter(|d| d.last_error.as_deref() != Some(RETRACTED_NOTE))
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }

    if !reindex {
        for doc in &pending {
            warn!(
                file_id = %doc.file_id,
                file_name = %doc.file_name,
                "document left in pending_index by a previous run; re-add it or enable REINDEX_PENDING_ON_START"
            );
        }
        return Ok(0);
    }

    for doc in &pending {
        queue.schedule(doc.file_id.clone(), IndexTrigger::Recovery)?;
    }
    info!(count = pending.len(), "re-scheduled pending documents");
    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::ChunkConfig;
    use crate::embed::{EmbedFuture, EmbeddingGateway, EmbeddingsProvider, hash_embedder::HashEmbedder};
    use crate::index_store::VectorIndexStore;
    use crate::registry::{InMemoryRegistry, SourceDocument};
    use crate::store::memory::InMemoryVectorStore;

    const DIM: usize = 16;

    struct PanickingProvider;

    impl EmbeddingsProvider for PanickingProvider {
        fn embed_batch<'a>(&'a self, texts: &'a [String]) -> EmbedFuture<'a> {
            Box::pin(async move {
                if !texts.is_empty() {
                    panic!("embedding backend exploded");
                }
                Ok(Vec::new())
            })
        }
    }

    fn setup(provider: Arc<dyn EmbeddingsProvider>) -> (Arc<InMemoryRegistry>, IndexingQueue) {
        let registry = Arc::new(InMemoryRegistry::new());
        let pipeline = Arc::new(IndexingPipeline::new(
            registry.clone(),
            VectorIndexStore::new(Arc::new(InMemoryVectorStore::new()), "doc", DIM),
            EmbeddingGateway::new(provider, DIM, 8),
            ChunkConfig::default(),
        ));
        let (queue, _handle) = IndexingQueue::start(pipeline, 2);
        (registry, queue)
    }

    async fn next(rx: &mut broadcast::Receiver<IndexingOutcome>) -> IndexingOutcome {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("outcome in time")
            .expect("channel open")
    }

    #[tokio::test]
    async fn schedule_returns_before_run_completes() {
        let (registry, queue) = setup(Arc::new(HashEmbedder::new(DIM)));
        let mut rx = queue.subscribe();
        for id in ["a", "b", "c"] {
            registry
                .insert(SourceDocument::new(id, id, "txt", Some(format!("text of {id}")), None))
                .await
                .unwrap();
            queue.schedule(id, IndexTrigger::Upload).unwrap();
        }

        let mut done = Vec::new();
        for _ in 0..3 {
            let out = next(&mut rx).await;
            assert_eq!(out.status, IndexingStatus::Indexed);
            done.push(out.file_id);
        }
        done.sort();
        assert_eq!(done, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn panicking_run_is_recorded_as_error() {
        let (registry, queue) = setup(Arc::new(PanickingProvider));
        let mut rx = queue.subscribe();
        registry
            .insert(SourceDocument::new("p", "p.txt", "txt", Some("boom".into()), None))
            .await
            .unwrap();
        queue.schedule("p", IndexTrigger::Upload).unwrap();

        let out = next(&mut rx).await;
        assert_eq!(out.status, IndexingStatus::Error);
        let stored = registry.get("p").await.unwrap().unwrap();
        assert_eq!(stored.indexing_status, IndexingStatus::Error);
        assert!(stored.last_error.unwrap().starts_with("task"));
    }

    #[tokio::test]
    async fn recovery_respects_policy() {
        let (registry, queue) = setup(Arc::new(HashEmbedder::new(DIM)));
        registry
            .insert(SourceDocument::new("r", "r.txt", "txt", Some("left behind".into()), None))
            .await
            .unwrap();

        registry
            .insert(SourceDocument::new("gone", "g.txt", "txt", Some("retracted".into()), None))
            .await
            .unwrap();
        registry
            .set_status("gone", IndexingStatus::PendingIndex, Some(RETRACTED_NOTE.into()))
            .await
            .unwrap();

        assert_eq!(recover_pending(registry.as_ref(), &queue, false).await.unwrap(), 0);

        let mut rx = queue.subscribe();
        assert_eq!(recover_pending(registry.as_ref(), &queue, true).await.unwrap(), 1);
        let out = next(&mut rx).await;
        assert_eq!(out.file_id, "r");
        assert_eq!(out.status, IndexingStatus::Indexed);
    }
}
