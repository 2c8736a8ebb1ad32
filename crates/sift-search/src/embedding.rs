use crate::tokenizer::tokenize;
use crate::vector::l2_normalize;
use async_trait::async_trait;
use sift_core::{EmbeddingVector, SiftError, SiftResult};
use std::collections::HashMap;
use tracing::debug;

/// Most texts an embedding provider accepts in one call.
pub const MAX_EMBED_BATCH: usize = 250;

/// Turns text into fixed-length vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a search query.
    async fn embed_query(&self, text: &str) -> SiftResult<EmbeddingVector>;

    /// Embed a batch of documents, one vector per input text, in input order.
    ///
    /// Callers must keep batches within [`EmbeddingProvider::max_batch_size`];
    /// use [`embed_in_batches`] for arbitrary sizes.
    async fn embed_documents(&self, texts: &[String]) -> SiftResult<Vec<EmbeddingVector>>;

    /// Provider-imposed batch ceiling.
    fn max_batch_size(&self) -> usize {
        MAX_EMBED_BATCH
    }

    /// Length of every vector this provider produces.
    fn dimension(&self) -> usize;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// Embed any number of texts, chunked by the provider's batch ceiling.
///
/// Output order matches `texts`. A provider that returns the wrong number of
/// vectors for a chunk is reported as [`SiftError::UpstreamUnavailable`].
pub async fn embed_in_batches(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
) -> SiftResult<Vec<EmbeddingVector>> {
    let batch_size = provider.max_batch_size().clamp(1, MAX_EMBED_BATCH);
    let mut vectors = Vec::with_capacity(texts.len());

    for (batch, chunk) in texts.chunks(batch_size).enumerate() {
        let embedded = provider.embed_documents(chunk).await?;
        if embedded.len() != chunk.len() {
            return Err(SiftError::UpstreamUnavailable(format!(
                "{} returned {} embeddings for {} texts",
                provider.name(),
                embedded.len(),
                chunk.len()
            )));
        }
        debug!(provider = provider.name(), batch, size = chunk.len(), "Embedded batch");
        vectors.extend(embedded);
    }

    Ok(vectors)
}

/// Local hashed bag-of-words embedding.
///
/// Deterministic and offline: every token is hashed (FNV-1a) into three
/// positions of a fixed-size vector weighted by its term frequency, then the
/// vector is L2-normalized. Text without tokens embeds as the zero vector.
pub struct LocalEmbedding {
    dimension: usize,
}

impl LocalEmbedding {
    /// A local embedding with `dimension` components (at least 1).
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_text(&self, text: &str) -> EmbeddingVector {
        let mut vector = vec![0.0f32; self.dimension];
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return vector;
        }

        let mut freq: HashMap<&str, f32> = HashMap::new();
        for token in &tokens {
            *freq.entry(token.as_str()).or_insert(0.0) += 1.0;
        }

        let total = tokens.len() as f32;
        for (token, count) in &freq {
            let tf = count / total;
            let bytes = token.as_bytes();
            let positions = [
                (fnv1a(bytes, None), 1.0),
                (fnv1a(bytes, Some(1)), 0.7),
                (fnv1a(bytes, Some(2)), 0.5),
            ];
            for (hash, weight) in positions {
                vector[hash as usize % self.dimension] += tf * weight;
            }
        }

        l2_normalize(&mut vector);
        vector
    }
}

impl Default for LocalEmbedding {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed_query(&self, text: &str) -> SiftResult<EmbeddingVector> {
        Ok(self.embed_text(text))
    }

    async fn embed_documents(&self, texts: &[String]) -> SiftResult<Vec<EmbeddingVector>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// FNV-1a over `data`, optionally followed by one salt byte.
fn fnv1a(data: &[u8], salt: Option<u8>) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for &byte in data.iter().chain(salt.as_ref()) {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::vector::cosine_similarity;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_local_embedding_dimension_and_norm() {
        let emb = LocalEmbedding::new(128);
        let v = emb.embed_query("the quick brown fox").await.unwrap();
        assert_eq!(v.len(), 128);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_local_embedding_is_deterministic() {
        let emb = LocalEmbedding::default();
        let a = emb.embed_query("fall prevention").await.unwrap();
        let b = emb.embed_query("fall prevention").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_local_embedding_similar_texts() {
        let emb = LocalEmbedding::default();
        let v1 = emb.embed_query("rust programming language").await.unwrap();
        let v2 = emb.embed_query("rust programming systems").await.unwrap();
        let v3 = emb.embed_query("cooking recipes for dinner").await.unwrap();
        let s12 = cosine_similarity(&v1, &v2).unwrap();
        let s13 = cosine_similarity(&v1, &v3).unwrap();
        assert!(s12 > s13, "{s12} <= {s13}");
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let emb = LocalEmbedding::new(8);
        let v = emb.embed_query("  ...  ").await.unwrap();
        assert_eq!(v, vec![0.0; 8]);
    }

    struct CountingProvider {
        calls: AtomicUsize,
        max_batch: usize,
        drop_one: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed_query(&self, _text: &str) -> SiftResult<EmbeddingVector> {
            Ok(vec![1.0])
        }

        async fn embed_documents(&self, texts: &[String]) -> SiftResult<Vec<EmbeddingVector>> {
            assert!(texts.len() <= self.max_batch);
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut out: Vec<EmbeddingVector> = texts
                .iter()
                .map(|t| vec![t.parse::<f32>().unwrap()])
                .collect();
            if self.drop_one {
                out.pop();
            }
            Ok(out)
        }

        fn max_batch_size(&self) -> usize {
            self.max_batch
        }

        fn dimension(&self) -> usize {
            1
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_embed_in_batches_chunks_and_keeps_order() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            max_batch: 250,
            drop_one: false,
        };
        let texts: Vec<String> = (0..600).map(|i| i.to_string()).collect();
        let vectors = embed_in_batches(&provider, &texts).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(vectors.len(), 600);
        assert_eq!(vectors[0], vec![0.0]);
        assert_eq!(vectors[599], vec![599.0]);
    }

    #[tokio::test]
    async fn test_embed_in_batches_respects_smaller_ceiling() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            max_batch: 10,
            drop_one: false,
        };
        let texts: Vec<String> = (0..25).map(|i| i.to_string()).collect();
        embed_in_batches(&provider, &texts).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_embed_in_batches_rejects_short_response() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            max_batch: 250,
            drop_one: true,
        };
        let texts: Vec<String> = (0..3).map(|i| i.to_string()).collect();
        let err = embed_in_batches(&provider, &texts).await.unwrap_err();
        assert!(err.is_upstream());
    }

    #[tokio::test]
    async fn test_embed_in_batches_empty_input() {
        let provider = LocalEmbedding::new(4);
        assert!(embed_in_batches(&provider, &[]).await.unwrap().is_empty());
    }
}
