//! Core data models used by the library.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Document metadata copied onto every chunk and stored with every vector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub file_id: String,
    pub file_name: String,
    pub file_type: String,
    #[serde(default)]
    pub uploaded_by: Option<String>,
    #[serde(default)]
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// A contiguous slice of a document's text with its zero-based position.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub index: usize,
    pub metadata: ChunkMetadata,
}

/// Payload stored alongside each vector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub file_id: String,
    pub file_name: String,
    pub file_type: String,
    pub chunk_index: u64,
    pub text: String,
    #[serde(default)]
    pub uploaded_by: Option<String>,
    #[serde(default)]
    pub uploaded_at: Option<String>,
}

impl From<&Chunk> for ChunkPayload {
    fn from(c: &Chunk) -> Self {
        Self {
            file_id: c.metadata.file_id.clone(),
            file_name: c.metadata.file_name.clone(),
            file_type: c.metadata.file_type.clone(),
            chunk_index: c.index as u64,
            text: c.text.clone(),
            uploaded_by: c.metadata.uploaded_by.clone(),
            uploaded_at: c.metadata.uploaded_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// A chunk's embedding plus its payload, addressed by `(index_name, chunk_index)`.
#[derive(Clone, Debug)]
pub struct VectorRecord {
    pub index_name: String,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

/// A single search hit. `score` is in `[0, 1]`, higher is more similar.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredChunk {
    pub index_name: String,
    pub score: f32,
    pub payload: ChunkPayload,
}
