//! Process-local vector store with exact cosine search.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use crate::errors::RagError;
use crate::record::{ScoredChunk, VectorRecord};
use crate::store::{StoreFuture, VectorStore, clamp_score};

#[derive(Default)]
struct Collection {
    dim: usize,
    /// Keyed by chunk index, so re-upserting a position overwrites it.
    points: BTreeMap<u64, VectorRecord>,
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points in a collection, `None` if it does not exist.
    pub async fn point_count(&self, name: &str) -> Option<usize> {
        self.collections.read().await.get(name).map(|c| c.points.len())
    }
}

impl VectorStore for InMemoryVectorStore {
    fn collection_exists<'a>(&'a self, name: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move { Ok(self.collections.read().await.contains_key(name)) })
    }

    fn create_collection<'a>(&'a self, name: &'a str, dim: usize) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut w = self.collections.write().await;
            w.entry(name.to_string()).or_insert_with(|| Collection {
                dim,
                points: BTreeMap::new(),
            });
            Ok(())
        })
    }

    fn upsert<'a>(&'a self, name: &'a str, records: Vec<VectorRecord>) -> StoreFuture<'a, usize> {
        Box::pin(async move {
            let mut w = self.collections.write().await;
            let coll = w
                .get_mut(name)
                .ok_or_else(|| RagError::Upsert(format!("collection '{name}' does not exist")))?;

            for r in &records {
                if r.vector.len() != coll.dim {
                    return Err(RagError::VectorSizeMismatch {
                        got: r.vector.len(),
                        want: coll.dim,
                    });
                }
            }
            let n = records.len();
            for r in records {
                coll.points.insert(r.payload.chunk_index, r);
            }
            Ok(n)
        })
    }

    fn search<'a>(
        &'a self,
        name: &'a str,
        vector: &'a [f32],
        top_k: usize,
    ) -> StoreFuture<'a, Vec<ScoredChunk>> {
        Box::pin(async move {
            let r = self.collections.read().await;
            let coll = r
                .get(name)
                .ok_or_else(|| RagError::Search(format!("collection '{name}' does not exist")))?;

            let mut hits: Vec<ScoredChunk> = coll
                .points
                .values()
                .map(|p| ScoredChunk {
                    index_name: name.to_string(),
                    score: clamp_score(cosine(vector, &p.vector)),
                    payload: p.payload.clone(),
                })
                .collect();
            hits.sort_by(|a, b| b.score.total_cmp(&a.score));
            hits.truncate(top_k);
            Ok(hits)
        })
    }

    fn delete_collection<'a>(&'a self, name: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.collections.write().await.remove(name);
            Ok(())
        })
    }

    fn delete_tail<'a>(&'a self, name: &'a str, from_index: u64) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if let Some(coll) = self.collections.write().await.get_mut(name) {
                coll.points.split_off(&from_index);
            }
            Ok(())
        })
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ChunkPayload;

    fn rec(idx: u64, v: Vec<f32>) -> VectorRecord {
        VectorRecord {
            index_name: "c".into(),
            vector: v,
            payload: ChunkPayload {
                file_id: "f".into(),
                file_name: "f.txt".into(),
                file_type: "txt".into(),
                chunk_index: idx,
                text: format!("chunk {idx}"),
                uploaded_by: None,
                uploaded_at: None,
            },
        }
    }

    #[tokio::test]
    async fn create_is_idempotent_and_search_ranks() {
        let s = InMemoryVectorStore::new();
        s.create_collection("c", 2).await.unwrap();
        s.create_collection("c", 2).await.unwrap();
        s.upsert("c", vec![rec(0, vec![1.0, 0.0]), rec(1, vec![0.0, 1.0])])
            .await
            .unwrap();

        let hits = s.search("c", &[0.9, 0.1], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].payload.chunk_index, 0);
        assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
    }

    #[tokio::test]
    async fn negative_similarity_clamps_to_zero() {
        let s = InMemoryVectorStore::new();
        s.create_collection("c", 2).await.unwrap();
        s.upsert("c", vec![rec(0, vec![-1.0, 0.0])]).await.unwrap();
        let hits = s.search("c", &[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].score, 0.0);
    }

    #[tokio::test]
    async fn tail_delete_and_drop() {
        let s = InMemoryVectorStore::new();
        s.create_collection("c", 1).await.unwrap();
        let recs = (0..5).map(|i| rec(i, vec![1.0])).collect();
        s.upsert("c", recs).await.unwrap();
        s.delete_tail("c", 2).await.unwrap();
        assert_eq!(s.point_count("c").await, Some(2));

        s.delete_collection("c").await.unwrap();
        s.delete_collection("c").await.unwrap();
        assert_eq!(s.point_count("c").await, None);
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        let s = InMemoryVectorStore::new();
        s.create_collection("c", 3).await.unwrap();
        assert!(s.upsert("c", vec![rec(0, vec![1.0])]).await.is_err());
    }
}
