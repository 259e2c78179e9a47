//! Embedding abstraction and the batching gateway in front of it.

use std::{future::Future, pin::Pin, sync::Arc};

use tracing::{debug, instrument};

use crate::errors::RagError;

pub mod hash_embedder;
pub mod profile_embedder;

/// Boxed future returned by providers.
pub type EmbedFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, RagError>> + Send + 'a>>;

/// Provider interface for embedding generation.
///
/// Implement this trait to plug in your own embedding backend (e.g., Ollama, OpenAI, local models).
/// Implementations must return exactly one vector per input, in input order.
pub trait EmbeddingsProvider: Send + Sync {
    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> EmbedFuture<'a>;
}

/// Order- and count-preserving front door for embeddings.
///
/// Splits input into provider-sized batches and checks every returned vector
/// against the configured dimension. Never substitutes zero vectors.
#[derive(Clone)]
pub struct EmbeddingGateway {
    provider: Arc<dyn EmbeddingsProvider>,
    dim: usize,
    batch: usize,
}

impl EmbeddingGateway {
    pub fn new(provider: Arc<dyn EmbeddingsProvider>, dim: usize, batch: usize) -> Self {
        Self {
            provider,
            dim,
            batch: batch.max(1),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Embeds `texts`, returning one vector per text in the same order.
    ///
    /// # Errors
    /// - `Embedding` on empty input, provider failure or count mismatch
    /// - `VectorSizeMismatch` when a vector has the wrong dimension
    #[instrument(skip_all, fields(texts = texts.len(), batch = self.batch))]
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Err(RagError::Embedding("empty input batch".into()));
        }

        let mut out = Vec::with_capacity(texts.len());
        for part in texts.chunks(self.batch) {
            let vectors = self.provider.embed_batch(part).await?;
            if vectors.len() != part.len() {
                return Err(RagError::Embedding(format!(
                    "provider returned {} vectors for {} inputs",
                    vectors.len(),
                    part.len()
                )));
            }
            for v in vectors {
                if v.len() != self.dim {
                    return Err(RagError::VectorSizeMismatch {
                        got: v.len(),
                        want: self.dim,
                    });
                }
                out.push(v);
            }
        }

        debug!(vectors = out.len(), "embeddings ready");
        Ok(out)
    }

    /// Embeds a single query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        if text.trim().is_empty() {
            return Err(RagError::Embedding("empty query".into()));
        }
        let mut v = self.embed(&[text.to_string()]).await?;
        v.pop()
            .ok_or_else(|| RagError::Embedding("provider returned no vector".into()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::embed::hash_embedder::HashEmbedder;

    struct CountingProvider {
        calls: AtomicUsize,
        dim: usize,
    }

    impl EmbeddingsProvider for CountingProvider {
        fn embed_batch<'a>(&'a self, texts: &'a [String]) -> EmbedFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(texts.iter().map(|t| vec![t.len() as f32; self.dim]).collect())
            })
        }
    }

    struct ShortProvider;

    impl EmbeddingsProvider for ShortProvider {
        fn embed_batch<'a>(&'a self, _texts: &'a [String]) -> EmbedFuture<'a> {
            Box::pin(async { Ok(vec![vec![0.1, 0.2]]) })
        }
    }

    #[tokio::test]
    async fn batches_preserve_order_and_count() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            dim: 2,
        });
        let gw = EmbeddingGateway::new(provider.clone(), 2, 2);
        let texts: Vec<String> = ["a", "bb", "ccc", "dddd", "eeeee"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let out = gw.embed(&texts).await.unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(out[2], vec![3.0, 3.0]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_input_and_wrong_dim_fail() {
        let gw = EmbeddingGateway::new(Arc::new(HashEmbedder::new(8)), 8, 4);
        assert!(matches!(gw.embed(&[]).await, Err(RagError::Embedding(_))));
        assert!(gw.embed_query("   ").await.is_err());

        let gw = EmbeddingGateway::new(Arc::new(HashEmbedder::new(8)), 16, 4);
        assert!(matches!(
            gw.embed_query("hello").await,
            Err(RagError::VectorSizeMismatch { got: 8, want: 16 })
        ));
    }

    #[tokio::test]
    async fn count_mismatch_is_an_error() {
        let gw = EmbeddingGateway::new(Arc::new(ShortProvider), 2, 8);
        let texts = vec!["a".to_string(), "b".to_string()];
        assert!(matches!(gw.embed(&texts).await, Err(RagError::Embedding(_))));
    }
}
