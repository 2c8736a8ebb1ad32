use crate::bm25::Bm25Params;
use crate::fusion::{FusionStrategy, FusionWeights};
use crate::rerank::MAX_RERANK_BATCH;
use serde::{Deserialize, Serialize};
use sift_core::{SiftError, SiftResult};
use std::time::Duration;

/// Ranking pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Weight of the normalized BM25 score in fusion.
    #[serde(default = "default_bm25_weight")]
    pub bm25_weight: f32,
    /// Weight of the normalized dense score in fusion.
    #[serde(default = "default_dense_weight")]
    pub dense_weight: f32,
    /// Candidate fetch limit; also the size of the lexical pool.
    #[serde(default = "default_bm25_top_k")]
    pub search_bm25_top_k: usize,
    /// How many of the best vector scores keep their dense contribution.
    #[serde(default = "default_dense_top_k")]
    pub search_dense_top_k: usize,
    /// `top_k` used when the request does not name one.
    #[serde(default = "default_final_top_k")]
    pub search_final_top_k: usize,
    /// Largest `top_k` a request may ask for.
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    #[serde(default = "default_reranker_top_n")]
    pub reranker_top_n: usize,
    /// Fused candidates handed to the reranker; capped at the provider ceiling.
    #[serde(default = "default_reranker_pool_size")]
    pub reranker_pool_size: usize,
    #[serde(default = "default_true")]
    pub rerank_enabled: bool,
    #[serde(default)]
    pub fusion: FusionStrategy,
    /// Rank offset for reciprocal rank fusion.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
    #[serde(default)]
    pub bm25: Bm25Params,
    #[serde(default = "default_upstream_timeout_ms")]
    pub embedding_timeout_ms: u64,
    #[serde(default = "default_upstream_timeout_ms")]
    pub rerank_timeout_ms: u64,
    /// Overall per-request deadline.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_bm25_weight() -> f32 {
    0.3
}
fn default_dense_weight() -> f32 {
    0.7
}
fn default_bm25_top_k() -> usize {
    500
}
fn default_dense_top_k() -> usize {
    50
}
fn default_final_top_k() -> usize {
    10
}
fn default_max_top_k() -> usize {
    50
}
fn default_reranker_top_n() -> usize {
    10
}
fn default_reranker_pool_size() -> usize {
    MAX_RERANK_BATCH
}
fn default_true() -> bool {
    true
}
fn default_rrf_k() -> f32 {
    60.0
}
fn default_max_query_chars() -> usize {
    500
}
fn default_upstream_timeout_ms() -> u64 {
    10_000
}
fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            bm25_weight: default_bm25_weight(),
            dense_weight: default_dense_weight(),
            search_bm25_top_k: default_bm25_top_k(),
            search_dense_top_k: default_dense_top_k(),
            search_final_top_k: default_final_top_k(),
            max_top_k: default_max_top_k(),
            reranker_top_n: default_reranker_top_n(),
            reranker_pool_size: default_reranker_pool_size(),
            rerank_enabled: true,
            fusion: FusionStrategy::default(),
            rrf_k: default_rrf_k(),
            max_query_chars: default_max_query_chars(),
            bm25: Bm25Params::default(),
            embedding_timeout_ms: default_upstream_timeout_ms(),
            rerank_timeout_ms: default_upstream_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl SearchConfig {
    /// Check value ranges.
    pub fn validate(&self) -> SiftResult<()> {
        for (name, weight) in [
            ("bm25_weight", self.bm25_weight),
            ("dense_weight", self.dense_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(SiftError::Config(format!(
                    "{name} must be a finite, non-negative number (got {weight})"
                )));
            }
        }
        for (name, value) in [
            ("search_bm25_top_k", self.search_bm25_top_k),
            ("search_dense_top_k", self.search_dense_top_k),
            ("search_final_top_k", self.search_final_top_k),
            ("max_top_k", self.max_top_k),
            ("reranker_top_n", self.reranker_top_n),
            ("reranker_pool_size", self.reranker_pool_size),
            ("max_query_chars", self.max_query_chars),
        ] {
            if value == 0 {
                return Err(SiftError::Config(format!("{name} must be at least 1")));
            }
        }
        if self.search_final_top_k > self.max_top_k {
            return Err(SiftError::Config(format!(
                "search_final_top_k ({}) exceeds max_top_k ({})",
                self.search_final_top_k, self.max_top_k
            )));
        }
        if !self.bm25.k1.is_finite() || self.bm25.k1 < 0.0 {
            return Err(SiftError::Config(format!("bm25.k1 must be >= 0 (got {})", self.bm25.k1)));
        }
        if !(0.0..=1.0).contains(&self.bm25.b) {
            return Err(SiftError::Config(format!(
                "bm25.b must be within [0, 1] (got {})",
                self.bm25.b
            )));
        }
        if !self.rrf_k.is_finite() || self.rrf_k < 0.0 {
            return Err(SiftError::Config(format!("rrf_k must be >= 0 (got {})", self.rrf_k)));
        }
        Ok(())
    }

    pub fn fusion_weights(&self) -> FusionWeights {
        FusionWeights {
            bm25_weight: self.bm25_weight,
            dense_weight: self.dense_weight,
        }
    }

    /// Reranker pool size clamped to the provider ceiling.
    pub fn effective_pool_size(&self) -> usize {
        self.reranker_pool_size.min(MAX_RERANK_BATCH)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }

    pub fn rerank_timeout(&self) -> Duration {
        Duration::from_millis(self.rerank_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Which embedding provider to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Offline hashed bag-of-words.
    #[default]
    Local,
    /// OpenAI-compatible embeddings endpoint.
    Http,
}

/// Embedding provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingBackend,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Environment variable holding the API key, if the endpoint needs one.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-004".to_string()
}
fn default_dimension() -> usize {
    256
}
fn default_batch_size() -> usize {
    crate::embedding::MAX_EMBED_BATCH
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::default(),
            base_url: default_base_url(),
            model: default_embedding_model(),
            api_key_env: None,
            dimension: default_dimension(),
            batch_size: default_batch_size(),
        }
    }
}

impl EmbeddingConfig {
    /// API key read from `api_key_env`, if set and present.
    pub fn api_key(&self) -> Option<String> {
        read_api_key(self.api_key_env.as_deref())
    }
}

/// Which reranking provider to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RerankerBackend {
    /// No reranking; fused order is final.
    #[default]
    None,
    /// HTTP ranking endpoint.
    Http,
}

/// Reranking provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankerConfig {
    #[serde(default)]
    pub provider: RerankerBackend,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_reranker_model")]
    pub model: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_reranker_model() -> String {
    "semantic-ranker-default-004".to_string()
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: RerankerBackend::default(),
            base_url: default_base_url(),
            model: default_reranker_model(),
            api_key_env: None,
        }
    }
}

impl RerankerConfig {
    /// API key read from `api_key_env`, if set and present.
    pub fn api_key(&self) -> Option<String> {
        read_api_key(self.api_key_env.as_deref())
    }
}

fn read_api_key(var: Option<&str>) -> Option<String> {
    var.and_then(|name| std::env::var(name).ok())
        .filter(|key| !key.is_empty())
}
