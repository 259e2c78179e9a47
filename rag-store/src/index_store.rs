//! Per-document vector indexes on top of a [`VectorStore`] backend.

use std::{collections::BTreeMap, sync::Arc};

use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::errors::RagError;
use crate::naming;
use crate::record::{Chunk, ChunkPayload, ScoredChunk, VectorRecord};
use crate::store::VectorStore;

/// Resolves index names and drives create/upsert/search/delete for documents.
#[derive(Clone)]
pub struct VectorIndexStore {
    store: Arc<dyn VectorStore>,
    prefix: String,
    dim: usize,
}

impl VectorIndexStore {
    pub fn new(store: Arc<dyn VectorStore>, prefix: impl Into<String>, dim: usize) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            dim,
        }
    }

    /// Pure function of `(file_id, file_name)`.
    pub fn index_name(&self, file_id: &str, file_name: &str) -> String {
        naming::index_name(&self.prefix, file_id, file_name)
    }

    pub async fn index_exists(&self, name: &str) -> Result<bool, RagError> {
        self.store.collection_exists(name).await
    }

    /// Create-if-absent. Returns the index name.
    #[instrument(skip(self))]
    pub async fn create_index(&self, file_id: &str, file_name: &str) -> Result<String, RagError> {
        let name = self.index_name(file_id, file_name);
        self.store
            .create_collection(&name, self.dim)
            .await
            .map_err(|e| match e {
                RagError::IndexCreation(_) => e,
                other => RagError::IndexCreation(other.to_string()),
            })?;
        Ok(name)
    }

    /// Writes one vector per chunk under the document's index.
    ///
    /// # Errors
    /// `Upsert` when lengths differ or the store acknowledges a different count.
    #[instrument(skip(self, chunks, embeddings), fields(chunks = chunks.len()))]
    pub async fn upsert_chunks(
        &self,
        file_id: &str,
        file_name: &str,
        chunks: &[Chunk],
        embeddings: Vec<Vec<f32>>,
    ) -> Result<usize, RagError> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::Upsert(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let index_name = self.index_name(file_id, file_name);
        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(embeddings)
            .map(|(c, v)| VectorRecord {
                index_name: index_name.clone(),
                vector: v,
                payload: ChunkPayload::from(c),
            })
            .collect();

        let written = self.store.upsert(&index_name, records).await.map_err(|e| match e {
            RagError::Upsert(_) => e,
            other => RagError::Upsert(other.to_string()),
        })?;

        if written != chunks.len() {
            return Err(RagError::Upsert(format!(
                "store acknowledged {written} of {} points",
                chunks.len()
            )));
        }
        debug!(index = %index_name, written, "chunks upserted");
        Ok(written)
    }

    /// Searches each named index and returns its ranked matches.
    ///
    /// Indexes are queried concurrently. A failing index is logged and
    /// contributes an empty list; the call itself only fails if every index
    /// failed.
    #[instrument(skip(self, query, index_names), fields(indexes = index_names.len()))]
    pub async fn search(
        &self,
        query: &[f32],
        index_names: &[String],
        top_k: usize,
    ) -> Result<BTreeMap<String, Vec<ScoredChunk>>, RagError> {
        let calls = index_names.iter().map(|name| async move {
            (name, self.store.search(name, query, top_k).await)
        });

        let mut out = BTreeMap::new();
        let mut failures = 0usize;
        let mut last_err = None;
        for (name, res) in join_all(calls).await {
            match res {
                Ok(hits) => {
                    out.insert(name.clone(), hits);
                }
                Err(e) => {
                    warn!(index = %name, error = %e, "search failed, treating as no results");
                    failures += 1;
                    last_err = Some(e);
                    out.insert(name.clone(), Vec::new());
                }
            }
        }

        if !index_names.is_empty() && failures == index_names.len() {
            if let Some(e) = last_err {
                return Err(RagError::Search(e.to_string()));
            }
        }
        Ok(out)
    }

    /// Idempotent removal of a document's index.
    #[instrument(skip(self))]
    pub async fn delete_index(&self, file_id: &str, file_name: &str) -> Result<(), RagError> {
        let name = self.index_name(file_id, file_name);
        self.store.delete_collection(&name).await?;
        info!(index = %name, "index deleted");
        Ok(())
    }

    /// Drops points at positions `>= keep` left over from a longer previous run.
    pub async fn prune_tail(
        &self,
        file_id: &str,
        file_name: &str,
        keep: usize,
    ) -> Result<(), RagError> {
        let name = self.index_name(file_id, file_name);
        self.store.delete_tail(&name, keep as u64).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::chunk;
    use crate::config::ChunkConfig;
    use crate::embed::hash_embedder::HashEmbedder;
    use crate::record::ChunkMetadata;
    use crate::store::memory::InMemoryVectorStore;

    fn meta(id: &str, name: &str) -> ChunkMetadata {
        ChunkMetadata {
            file_id: id.into(),
            file_name: name.into(),
            file_type: "txt".into(),
            uploaded_by: None,
            uploaded_at: None,
        }
    }

    async fn indexed(
        store: &VectorIndexStore,
        emb: &HashEmbedder,
        id: &str,
        name: &str,
        text: &str,
    ) -> String {
        let chunks = chunk(text, ChunkConfig::default(), &meta(id, name)).unwrap();
        let vecs = chunks.iter().map(|c| emb.embed_one(&c.text)).collect();
        let idx = store.create_index(id, name).await.unwrap();
        let n = store.upsert_chunks(id, name, &chunks, vecs).await.unwrap();
        assert_eq!(n, chunks.len());
        idx
    }

    #[tokio::test]
    async fn create_is_idempotent_and_search_fans_out() {
        let backend = Arc::new(InMemoryVectorStore::new());
        let store = VectorIndexStore::new(backend, "doc", 64);
        let emb = HashEmbedder::new(64);

        let a = indexed(&store, &emb, "1", "budget.txt", "The annual budget is ten million").await;
        let b = indexed(&store, &emb, "2", "roadmap.txt", "Roadmap milestones for launch").await;
        assert_eq!(store.create_index("1", "budget.txt").await.unwrap(), a);
        assert!(store.index_exists(&a).await.unwrap());

        let q = emb.embed_one("annual budget");
        let res = store
            .search(&q, &[a.clone(), b.clone(), "doc_missing".into()], 3)
            .await
            .unwrap();
        assert_eq!(res.len(), 3);
        assert!(res["doc_missing"].is_empty());
        assert!(res[&a][0].score > res[&b][0].score);
    }

    #[tokio::test]
    async fn all_failed_search_is_an_error() {
        let store = VectorIndexStore::new(Arc::new(InMemoryVectorStore::new()), "doc", 8);
        let res = store.search(&[0.0; 8], &["nope".into()], 3).await;
        assert!(matches!(res, Err(RagError::Search(_))));
    }

    #[tokio::test]
    async fn mismatched_lengths_are_rejected() {
        let store = VectorIndexStore::new(Arc::new(InMemoryVectorStore::new()), "doc", 4);
        let chunks = chunk("abc", ChunkConfig::default(), &meta("1", "a")).unwrap();
        store.create_index("1", "a").await.unwrap();
        let err = store.upsert_chunks("1", "a", &chunks, vec![]).await.unwrap_err();
        assert!(matches!(err, RagError::Upsert(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let backend = Arc::new(InMemoryVectorStore::new());
        let store = VectorIndexStore::new(backend, "doc", 4);
        let name = store.create_index("1", "a").await.unwrap();
        store.delete_index("1", "a").await.unwrap();
        store.delete_index("1", "a").await.unwrap();
        assert!(!store.index_exists(&name).await.unwrap());
    }
}
