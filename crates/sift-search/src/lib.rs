//! Hybrid retrieval and ranking: BM25 plus dense vectors, fused, reranked and cached.
//!
//! A query is tokenized, scored lexically against the candidate documents of
//! a domain, scored by cosine similarity against their embeddings, fused into
//! one ranking and optionally reranked by an external model. Every upstream
//! call sits behind a namespaced TTL cache, and every upstream failure
//! degrades the result instead of failing the request.
//!
//! # Main types
//!
//! - [`SearchEngine`]: The query orchestrator.
//! - [`Cache`]: Namespaced TTL cache with LRU eviction.
//! - [`Bm25Index`]: BM25 index over one candidate batch.
//! - [`Reranker`]: Reranking client with batch ceiling and fallback.
//! - [`DocumentStore`]: Trait for candidate and embedding sources.
//! - [`EmbeddingProvider`] / [`RankingProvider`]: Upstream model traits.
//! - [`QueryExpander`]: Trait for adding related terms to a query.

/// BM25 lexical scoring.
pub mod bm25;
/// Namespaced TTL cache.
pub mod cache;
/// Ranking pipeline and provider configuration.
pub mod config;
/// Embedding provider trait and local implementation.
pub mod embedding;
/// Query orchestration.
pub mod engine;
/// Score fusion strategies.
pub mod fusion;
/// HTTP provider implementations.
pub mod providers;
/// Synonym-based query expansion.
pub mod query_expansion;
/// Reranking client and provider trait.
pub mod rerank;
/// Document store trait and implementations.
pub mod store;
/// Script-aware tokenizer.
pub mod tokenizer;
/// Cosine similarity.
pub mod vector;

pub use bm25::{Bm25Index, Bm25Params};
pub use cache::{Cache, CacheConfig, CacheEntryInfo, CacheMetrics, ClearReport};
pub use config::{EmbeddingConfig, RerankerConfig, SearchConfig};
pub use embedding::{embed_in_batches, EmbeddingProvider, LocalEmbedding};
pub use engine::{Degradation, SearchEngine, SearchHit, SearchRequest, SearchResult, SearchStage};
pub use fusion::{FusionStrategy, FusionWeights};
pub use providers::{HttpEmbeddingProvider, HttpRankingProvider};
pub use query_expansion::{ExpansionConfig, QueryExpander, RuleBasedExpander, SynonymGroup};
pub use rerank::{RankRecord, RankedRecord, RankingProvider, Reranker, MAX_RERANK_BATCH};
pub use store::{DocumentStore, InMemoryDocumentStore, JsonlDocumentStore, StoredDocument};
pub use tokenizer::tokenize;
pub use vector::{cosine_similarities, cosine_similarity};
