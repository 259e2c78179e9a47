//! Vector store backends addressed by collection (index) name.

use std::{future::Future, pin::Pin};

use crate::errors::RagError;
use crate::record::{ScoredChunk, VectorRecord};

pub mod memory;
pub mod qdrant;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RagError>> + Send + 'a>>;

/// Minimal collection-level API over a vector database.
///
/// Every method is scoped to one named collection; there is no cross-collection
/// state, so different documents can be written concurrently.
pub trait VectorStore: Send + Sync {
    fn collection_exists<'a>(&'a self, name: &'a str) -> StoreFuture<'a, bool>;

    /// Creates the collection if absent. Succeeds when it already exists.
    fn create_collection<'a>(&'a self, name: &'a str, dim: usize) -> StoreFuture<'a, ()>;

    /// Writes records (insert or overwrite by point id); returns how many were written.
    fn upsert<'a>(&'a self, name: &'a str, records: Vec<VectorRecord>) -> StoreFuture<'a, usize>;

    /// Top-`top_k` matches sorted by score, highest first.
    fn search<'a>(
        &'a self,
        name: &'a str,
        vector: &'a [f32],
        top_k: usize,
    ) -> StoreFuture<'a, Vec<ScoredChunk>>;

    /// Drops the collection. Missing collections are not an error.
    fn delete_collection<'a>(&'a self, name: &'a str) -> StoreFuture<'a, ()>;

    /// Removes points whose `chunk_index >= from_index`.
    fn delete_tail<'a>(&'a self, name: &'a str, from_index: u64) -> StoreFuture<'a, ()>;
}

/// Maps a raw similarity into `[0, 1]`.
pub(crate) fn clamp_score(raw: f32) -> f32 {
    if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) }
}
