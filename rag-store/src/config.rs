//! Runtime configuration for chunking, embedding, vector storage and the registry.

use std::str::FromStr;

use crate::errors::RagError;

/// Distance function of Qdrant collections (`VECTOR_DISTANCE`). The
/// in-memory store always ranks by cosine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DistanceKind {
    /// Cosine distance (recommended for most embeddings).
    Cosine,
    /// Dot product (useful for normalized vectors).
    Dot,
}

impl FromStr for DistanceKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceKind::Cosine),
            "dot" => Ok(DistanceKind::Dot),
            other => Err(RagError::Config(format!("unknown VECTOR_DISTANCE: {other}"))),
        }
    }
}

/// Where vectors are kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorBackend {
    Qdrant,
    /// Process-local store; contents are lost on restart.
    Memory,
}

impl FromStr for VectorBackend {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qdrant" => Ok(VectorBackend::Qdrant),
            "memory" | "in-memory" => Ok(VectorBackend::Memory),
            other => Err(RagError::Config(format!("unknown VECTOR_BACKEND: {other}"))),
        }
    }
}

/// Sliding window parameters, measured in characters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkConfig {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: 400,
            overlap: 100,
        }
    }
}

impl ChunkConfig {
    /// Rejects windows that would not advance (`overlap >= size`).
    pub fn validate(&self) -> Result<(), RagError> {
        if self.size == 0 {
            return Err(RagError::Config("chunk size must be > 0".into()));
        }
        if self.overlap >= self.size {
            return Err(RagError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.overlap, self.size
            )));
        }
        Ok(())
    }
}

/// Configuration for indexing and retrieval.
#[derive(Clone, Debug)]
pub struct RagConfig {
    pub backend: VectorBackend,
    /// Qdrant gRPC endpoint, e.g. `http://localhost:6334`.
    pub qdrant_url: String,
    /// Optional API key for Qdrant Cloud.
    pub qdrant_api_key: Option<String>,
    pub distance: DistanceKind,
    /// Upsert batch size (typical range: 128..512).
    pub upsert_batch: usize,
    /// Exact search flag (false = HNSW ANN).
    pub exact_search: bool,
    /// Expected embedding dimensionality; every vector is checked against it.
    pub embedding_dim: usize,
    /// Texts per embedding provider call.
    pub embedding_batch: usize,
    pub chunk: ChunkConfig,
    /// Prefix of every per-document index name.
    pub index_prefix: String,
    /// Maximum concurrent pipeline runs.
    pub index_concurrency: usize,
    /// `sqlite://...` or `memory`.
    pub registry_url: String,
    /// Re-schedule documents left in `pending_index` at startup.
    pub reindex_pending_on_start: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Qdrant,
            qdrant_url: "http://localhost:6334".into(),
            qdrant_api_key: None,
            distance: DistanceKind::Cosine,
            upsert_batch: 256,
            exact_search: false,
            embedding_dim: 1024,
            embedding_batch: 32,
            chunk: ChunkConfig::default(),
            index_prefix: "doc".into(),
            index_concurrency: 4,
            registry_url: "sqlite://data/registry.db".into(),
            reindex_pending_on_start: false,
        }
    }
}

impl RagConfig {
    /// Loads the config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, RagError> {
        let d = Self::default();
        let cfg = Self {
            backend: env_parse("VECTOR_BACKEND", d.backend)?,
            qdrant_url: env_string("QDRANT_URL").unwrap_or(d.qdrant_url),
            qdrant_api_key: env_string("QDRANT_API_KEY"),
            distance: env_parse("VECTOR_DISTANCE", d.distance)?,
            upsert_batch: env_parse("QDRANT_BATCH_SIZE", d.upsert_batch)?,
            exact_search: env_parse("QDRANT_EXACT_SEARCH", d.exact_search)?,
            embedding_dim: env_parse("EMBEDDING_DIM", d.embedding_dim)?,
            embedding_batch: env_parse("EMBEDDING_BATCH", d.embedding_batch)?,
            chunk: ChunkConfig {
                size: env_parse("CHUNK_SIZE", d.chunk.size)?,
                overlap: env_parse("CHUNK_OVERLAP", d.chunk.overlap)?,
            },
            index_prefix: env_string("INDEX_PREFIX").unwrap_or(d.index_prefix),
            index_concurrency: env_parse("INDEX_CONCURRENCY", d.index_concurrency)?,
            registry_url: env_string("REGISTRY_URL").unwrap_or(d.registry_url),
            reindex_pending_on_start: env_parse(
                "REINDEX_PENDING_ON_START",
                d.reindex_pending_on_start,
            )?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates config values.
    pub fn validate(&self) -> Result<(), RagError> {
        self.chunk.validate()?;
        if self.backend == VectorBackend::Qdrant && self.qdrant_url.trim().is_empty() {
            return Err(RagError::Config("qdrant_url is empty".into()));
        }
        if self.upsert_batch == 0 {
            return Err(RagError::Config("upsert_batch must be > 0".into()));
        }
        if self.embedding_dim == 0 {
            return Err(RagError::Config("embedding_dim must be > 0".into()));
        }
        if self.embedding_batch == 0 {
            return Err(RagError::Config("embedding_batch must be > 0".into()));
        }
        if self.index_concurrency == 0 {
            return Err(RagError::Config("index_concurrency must be > 0".into()));
        }
        let prefix_ok = !self.index_prefix.is_empty()
            && self
                .index_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !prefix_ok {
            return Err(RagError::Config(
                "index_prefix must be non-empty [A-Za-z0-9_-]".into(),
            ));
        }
        Ok(())
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T, RagError> {
    match env_string(name) {
        Some(v) => v
            .parse::<T>()
            .map_err(|_| RagError::Config(format!("invalid value for {name}: {v}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = RagConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.chunk, ChunkConfig { size: 400, overlap: 100 });
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        let mut cfg = RagConfig::default();
        cfg.chunk = ChunkConfig { size: 100, overlap: 100 };
        assert!(matches!(cfg.validate(), Err(RagError::Config(_))));
    }

    #[test]
    fn prefix_must_be_slug_safe() {
        let mut cfg = RagConfig::default();
        cfg.index_prefix = "my docs".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn backend_parses() {
        assert_eq!("Memory".parse::<VectorBackend>().unwrap(), VectorBackend::Memory);
        assert!("pinecone".parse::<VectorBackend>().is_err());
    }

    #[test]
    fn distance_parses() {
        assert_eq!(" DOT ".parse::<DistanceKind>().unwrap(), DistanceKind::Dot);
        assert_eq!("cosine".parse::<DistanceKind>().unwrap(), DistanceKind::Cosine);
        assert!("euclid".parse::<DistanceKind>().is_err());
    }
}
