//! Deterministic offline embedder.
//!
//! Feature hashing over lowercase word tokens and character trigrams: each
//! feature lands in a bucket chosen by blake3 with a hash-derived sign, and the
//! result is L2-normalized. Texts sharing vocabulary get high cosine scores,
//! which is enough for tests and the in-memory backend.

use crate::embed::{EmbedFuture, EmbeddingsProvider};

#[derive(Clone, Debug)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let lower = text.to_lowercase();

        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.add_feature(&mut v, word.as_bytes(), 1.0);

            let chars: Vec<char> = word.chars().collect();
            for tri in chars.windows(3) {
                let s: String = tri.iter().collect();
                self.add_feature(&mut v, s.as_bytes(), 0.5);
            }
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }

    fn add_feature(&self, v: &mut [f32], feature: &[u8], weight: f32) {
        let h = blake3::hash(feature);
        let bytes = h.as_bytes();
        let mut idx = [0u8; 8];
        idx.copy_from_slice(&bytes[..8]);
        let bucket = (u64::from_le_bytes(idx) % self.dim as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign * weight;
    }
}

impl EmbeddingsProvider for HashEmbedder {
    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> EmbedFuture<'a> {
        Box::pin(async move { Ok(texts.iter().map(|t| self.embed_one(t)).collect()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cos(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn deterministic_and_normalized() {
        let e = HashEmbedder::new(64);
        let a = e.embed_one("Quarterly revenue grew");
        let b = e.embed_one("Quarterly revenue grew");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let e = HashEmbedder::new(256);
        let q = e.embed_one("revenue growth in the third quarter");
        let near = e.embed_one("third quarter revenue growth was strong");
        let far = e.embed_one("install the kitchen sink plumbing");
        assert!(cos(&q, &near) > cos(&q, &far));
    }
}
