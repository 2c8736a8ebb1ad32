use crate::bm25::Bm25Index;
use crate::cache::{hash_key, namespaces, Cache, CacheEntryInfo, CacheMetrics, ClearReport};
use crate::config::SearchConfig;
use crate::embedding::EmbeddingProvider;
use crate::fusion::{self, FusionWeights};
use crate::query_expansion::QueryExpander;
use crate::rerank::{Candidate, RankingProvider, Reranker};
use crate::store::DocumentStore;
use crate::tokenizer::tokenize;
use crate::vector::cosine_similarities;
use serde::{Deserialize, Serialize};
use sift_core::{Document, EmbeddingVector, ScoredDocument, SiftError, SiftResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// A search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub domain: Option<String>,
    /// Number of results, `1..=max_top_k`. Defaults to `search_final_top_k`.
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub include_embeddings: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            domain: None,
            top_k: None,
            include_embeddings: false,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_embeddings(mut self, include: bool) -> Self {
        self.include_embeddings = include;
        self
    }
}

/// States a search moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchStage {
    Received,
    Tokenized,
    LexicalScored,
    VectorScored,
    Fused,
    Reranked,
    RerankSkipped,
    Completed,
    Failed,
}

/// A signal that was lost while answering a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Degradation {
    /// No query embedding; the ranking is BM25-only.
    EmbeddingUnavailable,
    /// Document embeddings were missing or incompatible; the ranking is BM25-only.
    VectorScoringFailed,
    /// The reranker failed; fused order stands.
    RerankFailed,
    /// The request deadline cut the pipeline short.
    DeadlineExceeded,
}

/// One ranked document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub score: ScoredDocument,
    pub document: Document,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<EmbeddingVector>,
}

/// Wall time spent per stage, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub candidates_ms: f64,
    pub lexical_ms: f64,
    pub vector_ms: f64,
    pub fusion_ms: f64,
    pub rerank_ms: f64,
}

/// Outcome of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub request_id: Uuid,
    pub query: String,
    pub ranked_documents: Vec<SearchHit>,
    /// Candidates scored before truncation.
    pub total_candidates: usize,
    pub reranked: bool,
    pub processing_time_ms: f64,
    pub trace: Vec<SearchStage>,
    #[serde(default)]
    pub degradations: Vec<Degradation>,
    /// Terms added by query expansion (lexical scoring only).
    #[serde(default)]
    pub expanded_terms: Vec<String>,
    #[serde(default)]
    pub from_cache: bool,
    #[serde(default)]
    pub timings: StageTimings,
}

impl SearchResult {
    /// `true` when any signal was lost.
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }
}

fn note(degradations: &mut Vec<Degradation>, degradation: Degradation) {
    if !degradations.contains(&degradation) {
        degradations.push(degradation);
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

/// Hybrid retrieval-and-rank orchestrator.
///
/// Holds its collaborators by handle; every search runs independently and
/// shares only the cache.
pub struct SearchEngine {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Option<Reranker>,
    expander: Option<Arc<dyn QueryExpander>>,
    cache: Arc<Cache>,
    config: SearchConfig,
}

impl SearchEngine {
    /// Create an engine without reranking or query expansion.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        cache: Arc<Cache>,
        config: SearchConfig,
    ) -> SiftResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            embedder,
            reranker: None,
            expander: None,
            cache,
            config,
        })
    }

    /// Enable reranking through `provider`.
    pub fn with_ranking_provider(mut self, provider: Arc<dyn RankingProvider>) -> Self {
        self.reranker = Some(Reranker::new(provider, self.config.rerank_timeout()));
        self
    }

    /// Expand queries before lexical scoring.
    pub fn with_expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// Start the periodic cache sweep at the configured interval.
    pub fn start_cache_sweeper(&self) -> JoinHandle<()> {
        self.cache
            .start_sweeper(self.cache.config().cleanup_interval())
    }

    pub fn cache_metrics(&self) -> CacheMetrics {
        self.cache.metrics()
    }

    pub fn cache_entries(&self, namespace: Option<&str>) -> Vec<CacheEntryInfo> {
        self.cache.entries(namespace)
    }

    pub fn clear_cache(&self, namespace: Option<&str>) -> ClearReport {
        self.cache.clear(namespace)
    }

    /// Rank documents for `request`.
    ///
    /// # Errors
    /// - [`SiftError::InvalidQuery`] for an empty or oversized query or an
    ///   out-of-range `top_k`.
    /// - [`SiftError::Store`] when no candidates can be fetched.
    /// - [`SiftError::DimensionMismatch`] when every document embedding has
    ///   the wrong length and BM25 found nothing either.
    ///
    /// Provider failures and deadline expiry degrade the result instead.
    pub async fn search(&self, request: SearchRequest) -> SiftResult<SearchResult> {
        let request_id = Uuid::new_v4();
        let span = info_span!("search", %request_id);
        let result = self.run(request_id, request).instrument(span.clone()).await;
        if let Err(e) = &result {
            span.in_scope(|| warn!(stage = ?SearchStage::Failed, error = %e, "Search failed"));
        }
        result
    }

    fn validate(&self, request: &SearchRequest) -> SiftResult<usize> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(SiftError::InvalidQuery("query is empty".into()));
        }
        let chars = query.chars().count();
        if chars > self.config.max_query_chars {
            return Err(SiftError::InvalidQuery(format!(
                "query is {chars} characters (max {})",
                self.config.max_query_chars
            )));
        }
        let top_k = request.top_k.unwrap_or(self.config.search_final_top_k);
        if top_k == 0 || top_k > self.config.max_top_k {
            return Err(SiftError::InvalidQuery(format!(
                "top_k must be within 1..={} (got {top_k})",
                self.config.max_top_k
            )));
        }
        Ok(top_k)
    }

    async fn run(&self, request_id: Uuid, request: SearchRequest) -> SiftResult<SearchResult> {
        let started = Instant::now();
        let deadline = started + self.config.request_timeout();
        let mut trace = vec![SearchStage::Received];
        let mut degradations = Vec::new();
        let mut timings = StageTimings::default();

        let top_k = self.validate(&request)?;
        let query = request.query.trim().to_string();
        let domain = request.domain.as_deref().filter(|d| !d.is_empty());

        let result_key = hash_key(&[
            &query,
            domain.unwrap_or("*"),
            &top_k.to_string(),
            if request.include_embeddings { "emb" } else { "-" },
        ]);
        if let Some(mut cached) = self
            .cache
            .get_as::<SearchResult>(namespaces::SEARCH_RESULTS, &result_key)
        {
            cached.request_id = request_id;
            cached.from_cache = true;
            cached.processing_time_ms = elapsed_ms(started);
            info!(results = cached.ranked_documents.len(), "Served search from cache");
            return Ok(cached);
        }

        // RECEIVED -> TOKENIZED
        let mut query_tokens = tokenize(&query);
        let expansion = self
            .expander
            .as_ref()
            .map(|e| e.expand(&query))
            .unwrap_or_default();
        for term in &expansion.added_terms {
            query_tokens.extend(tokenize(term));
        }
        trace.push(SearchStage::Tokenized);

        // TOKENIZED -> LEXICAL_SCORED
        let stage = Instant::now();
        let fetched = self.fetch_candidates(domain).await?;
        let total_candidates = fetched.len();
        timings.candidates_ms = elapsed_ms(stage);

        let stage = Instant::now();
        let corpus: Vec<Vec<String>> = fetched
            .iter()
            .map(|d| tokenize(&format!("{}\n{}", d.title, d.content)))
            .collect();
        let all_scores = Bm25Index::fit(&corpus, self.config.bm25).scores(&query_tokens);
        let (candidates, bm25_scores) =
            lexical_pool(fetched, all_scores, self.config.search_bm25_top_k);
        timings.lexical_ms = elapsed_ms(stage);
        trace.push(SearchStage::LexicalScored);
        debug!(
            scored = total_candidates,
            pool = candidates.len(),
            tokens = query_tokens.len(),
            "Lexical scoring done"
        );

        if candidates.is_empty() {
            trace.push(SearchStage::Completed);
            info!("No candidates for query");
            return Ok(SearchResult {
                request_id,
                query,
                ranked_documents: Vec::new(),
                total_candidates: 0,
                reranked: false,
                processing_time_ms: elapsed_ms(started),
                trace,
                degradations,
                expanded_terms: expansion.added_terms,
                from_cache: false,
                timings,
            });
        }

        // LEXICAL_SCORED -> VECTOR_SCORED
        let stage = Instant::now();
        let vector_scores = match self.query_embedding(&query, deadline).await {
            Ok(query_vec) => match self
                .vector_scores(&query_vec, &candidates, &bm25_scores, deadline)
                .await
            {
                Ok(Some(scores)) => Some(scores),
                Ok(None) => {
                    note(&mut degradations, Degradation::VectorScoringFailed);
                    None
                }
                Err(e) if e.is_upstream() => {
                    warn!(error = %e, "Document embeddings not loaded in time, ranking with BM25 only");
                    note(&mut degradations, Degradation::DeadlineExceeded);
                    None
                }
                Err(e) => return Err(e),
            },
            Err(e) => {
                let degradation = if Instant::now() >= deadline {
                    Degradation::DeadlineExceeded
                } else {
                    Degradation::EmbeddingUnavailable
                };
                warn!(error = %e, ?degradation, "Query embedding failed, ranking with BM25 only");
                note(&mut degradations, degradation);
                None
            }
        };
        timings.vector_ms = elapsed_ms(stage);
        if vector_scores.is_some() {
            trace.push(SearchStage::VectorScored);
        }

        // VECTOR_SCORED -> FUSED
        let stage = Instant::now();
        let weights = if vector_scores.is_some() {
            self.config.fusion_weights()
        } else {
            FusionWeights {
                bm25_weight: 1.0,
                dense_weight: 0.0,
            }
        };
        let scored: Vec<ScoredDocument> = candidates
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let dense = vector_scores.as_ref().map_or(0.0, |v| v[i]);
                ScoredDocument::new(d.id.clone(), bm25_scores[i], dense)
            })
            .collect();
        let fused = fusion::apply(self.config.fusion, scored, &weights, self.config.rrf_k);
        timings.fusion_ms = elapsed_ms(stage);
        trace.push(SearchStage::Fused);

        // FUSED -> RERANKED | RERANK_SKIPPED
        let stage = Instant::now();
        let pool_size = match &self.reranker {
            Some(_) if self.config.rerank_enabled => self.config.effective_pool_size(),
            _ => top_k,
        };
        let mut documents: HashMap<String, Document> =
            candidates.into_iter().map(|d| (d.id.clone(), d)).collect();
        let pool: Vec<Candidate> = fused
            .into_iter()
            .take(pool_size)
            .filter_map(|scored| {
                let document = documents.remove(&scored.document_id)?;
                Some(Candidate { scored, document })
            })
            .collect();

        let mut reranked = false;
        let mut ranked = match &self.reranker {
            Some(reranker) if self.config.rerank_enabled => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    warn!("Request deadline reached before reranking");
                    note(&mut degradations, Degradation::DeadlineExceeded);
                    trace.push(SearchStage::RerankSkipped);
                    pool
                } else {
                    let top_n = self.config.reranker_top_n.min(top_k);
                    let timeout = reranker.timeout().min(remaining);
                    let outcome = reranker.rerank_within(&query, pool, top_n, timeout).await?;
                    if outcome.reranked {
                        reranked = true;
                        trace.push(SearchStage::Reranked);
                    } else {
                        if outcome.fallback_reason.is_some() {
                            let degradation = if Instant::now() >= deadline {
                                Degradation::DeadlineExceeded
                            } else {
                                Degradation::RerankFailed
                            };
                            note(&mut degradations, degradation);
                        }
                        trace.push(SearchStage::RerankSkipped);
                    }
                    outcome.candidates
                }
            }
            _ => {
                trace.push(SearchStage::RerankSkipped);
                pool
            }
        };
        ranked.truncate(top_k);
        timings.rerank_ms = elapsed_ms(stage);

        let mut hits = Vec::with_capacity(ranked.len());
        for candidate in ranked {
            let embedding = if request.include_embeddings {
                self.document_embedding(&candidate.document.id).await
            } else {
                None
            };
            hits.push(SearchHit {
                score: candidate.scored,
                document: candidate.document,
                embedding,
            });
        }
        trace.push(SearchStage::Completed);

        let result = SearchResult {
            request_id,
            query,
            ranked_documents: hits,
            total_candidates,
            reranked,
            processing_time_ms: elapsed_ms(started),
            trace,
            degradations,
            expanded_terms: expansion.added_terms,
            from_cache: false,
            timings,
        };

        if result.is_degraded() {
            debug!("Degraded result not cached");
        } else if let Err(e) = self.cache.set_as(
            namespaces::SEARCH_RESULTS,
            &result_key,
            &result,
            self.cache.ttl_for(namespaces::SEARCH_RESULTS),
        ) {
            warn!(error = %e, "Failed to cache search result");
        }

        info!(
            candidates = result.total_candidates,
            results = result.ranked_documents.len(),
            reranked = result.reranked,
            degradations = result.degradations.len(),
            elapsed_ms = result.processing_time_ms,
            "Search completed"
        );
        Ok(result)
    }

    /// Every candidate of `domain` (or of the whole store), cache-first.
    async fn fetch_candidates(&self, domain: Option<&str>) -> SiftResult<Vec<Document>> {
        let key = hash_key(&["candidates", domain.unwrap_or("*")]);
        if let Some(docs) = self.cache.get_as::<Vec<Document>>(namespaces::VECTOR_DB, &key) {
            return Ok(docs);
        }

        let docs = self.store.fetch_candidates(domain, usize::MAX).await?;
        if let Err(e) = self.cache.set_as(
            namespaces::VECTOR_DB,
            &key,
            &docs,
            self.cache.ttl_for(namespaces::VECTOR_DB),
        ) {
            warn!(error = %e, "Failed to cache candidates");
        }
        Ok(docs)
    }

    /// Query embedding, cache-first, bounded by the request deadline.
    async fn query_embedding(&self, query: &str, deadline: Instant) -> SiftResult<EmbeddingVector> {
        let key = hash_key(&[query]);
        if let Some(vector) = self
            .cache
            .get_as::<EmbeddingVector>(namespaces::EMBEDDINGS, &key)
        {
            return Ok(vector);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(SiftError::UpstreamTimeout("request deadline exceeded".into()));
        }
        let timeout = self.config.embedding_timeout().min(remaining);
        let vector = tokio::time::timeout(timeout, self.embedder.embed_query(query))
            .await
            .map_err(|_| {
                SiftError::UpstreamTimeout(format!(
                    "{} did not answer within {}ms",
                    self.embedder.name(),
                    timeout.as_millis()
                ))
            })??;

        if let Err(e) = self.cache.set_as(
            namespaces::EMBEDDINGS,
            &key,
            &vector,
            self.cache.ttl_for(namespaces::EMBEDDINGS),
        ) {
            warn!(error = %e, "Failed to cache query embedding");
        }
        Ok(vector)
    }

    /// Stored embedding of one document, cache-first. Store errors read as `None`.
    async fn document_embedding(&self, document_id: &str) -> Option<EmbeddingVector> {
        let key = hash_key(&["embedding", document_id]);
        if let Some(vector) = self
            .cache
            .get_as::<EmbeddingVector>(namespaces::VECTOR_DB, &key)
        {
            return Some(vector);
        }

        match self.store.fetch_embedding(document_id).await {
            Ok(Some(vector)) => {
                if let Err(e) = self.cache.set_as(
                    namespaces::VECTOR_DB,
                    &key,
                    &vector,
                    self.cache.ttl_for(namespaces::VECTOR_DB),
                ) {
                    warn!(error = %e, "Failed to cache document embedding");
                }
                Some(vector)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(document_id, error = %e, "Failed to fetch document embedding");
                None
            }
        }
    }

    /// Dense scores per candidate, or `None` when no usable document
    /// embedding exists.
    ///
    /// # Errors
    /// - [`SiftError::DimensionMismatch`] when every document embedding has
    ///   the wrong length and no candidate has a positive BM25 score.
    /// - [`SiftError::UpstreamTimeout`] when the embeddings are not loaded
    ///   before `deadline`.
    async fn vector_scores(
        &self,
        query_vec: &[f32],
        candidates: &[Document],
        bm25_scores: &[f32],
        deadline: Instant,
    ) -> SiftResult<Option<Vec<f32>>> {
        let load = async {
            let mut vectors: Vec<EmbeddingVector> = Vec::with_capacity(candidates.len());
            for doc in candidates {
                vectors.push(self.document_embedding(&doc.id).await.unwrap_or_default());
            }
            vectors
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        let doc_vectors = tokio::time::timeout(remaining, load).await.map_err(|_| {
            SiftError::UpstreamTimeout(format!(
                "document embeddings for {} candidates not loaded before the deadline",
                candidates.len()
            ))
        })?;

        let available: Vec<&EmbeddingVector> =
            doc_vectors.iter().filter(|v| !v.is_empty()).collect();
        let mismatched = available
            .iter()
            .filter(|v| v.len() != query_vec.len())
            .count();

        if available.is_empty() {
            warn!("No document embeddings available, ranking with BM25 only");
            return Ok(None);
        }
        if mismatched == available.len() {
            let actual = available[0].len();
            if bm25_scores.iter().any(|s| *s > 0.0) {
                warn!(
                    expected = query_vec.len(),
                    actual, "Every document embedding has the wrong dimension, ranking with BM25 only"
                );
                return Ok(None);
            }
            return Err(SiftError::DimensionMismatch {
                expected: query_vec.len(),
                actual,
            });
        }
        if mismatched > 0 {
            warn!(mismatched, "Document embeddings with the wrong dimension scored 0");
        }

        let mut scores = cosine_similarities(query_vec, &doc_vectors);
        keep_top_dense(&mut scores, self.config.search_dense_top_k);
        Ok(Some(scores))
    }
}

/// The `k` best candidates by BM25 score, in store order.
///
/// Ties at the cut-off go to the earlier document.
fn lexical_pool(
    candidates: Vec<Document>,
    scores: Vec<f32>,
    k: usize,
) -> (Vec<Document>, Vec<f32>) {
    if candidates.len() <= k {
        return (candidates, scores);
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut keep = vec![false; scores.len()];
    for &i in order.iter().take(k) {
        keep[i] = true;
    }

    candidates
        .into_iter()
        .zip(scores)
        .zip(keep)
        .filter_map(|(pair, kept)| kept.then_some(pair))
        .unzip()
}

/// Keep the positive contribution of only the `k` best dense scores.
fn keep_top_dense(scores: &mut [f32], k: usize) {
    if scores.len() <= k {
        return;
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for &idx in &order[k..] {
        scores[idx] = scores[idx].min(0.0);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::embedding::LocalEmbedding;
    use crate::store::{InMemoryDocumentStore, StoredDocument};

    fn engine(docs: Vec<StoredDocument>, config: SearchConfig) -> SearchEngine {
        SearchEngine::new(
            Arc::new(InMemoryDocumentStore::from_documents(docs)),
            Arc::new(LocalEmbedding::new(64)),
            Arc::new(Cache::new(CacheConfig::default())),
            config,
        )
        .unwrap()
    }

    fn doc(id: &str, content: &str) -> StoredDocument {
        StoredDocument::new(Document::new(id, "general", "", content))
    }

    #[test]
    fn test_lexical_pool_keeps_best_in_store_order() {
        let docs: Vec<Document> = ["a", "b", "c", "d"]
            .iter()
            .map(|id| Document::new(*id, "general", "", ""))
            .collect();
        let (pool, scores) = lexical_pool(docs.clone(), vec![0.0, 2.0, 0.0, 1.0], 2);
        let ids: Vec<&str> = pool.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);
        assert_eq!(scores, vec![2.0, 1.0]);

        let (pool, _) = lexical_pool(docs.clone(), vec![0.0; 4], 3);
        let ids: Vec<&str> = pool.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let (pool, _) = lexical_pool(docs, vec![0.0; 4], 10);
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn test_keep_top_dense() {
        let mut scores = vec![0.1, 0.9, -0.2, 0.5];
        keep_top_dense(&mut scores, 2);
        assert_eq!(scores, vec![0.0, 0.9, -0.2, 0.5]);

        let mut short = vec![0.3];
        keep_top_dense(&mut short, 5);
        assert_eq!(short, vec![0.3]);
    }

    #[tokio::test]
    async fn test_rejects_invalid_queries() {
        let e = engine(vec![doc("a", "x")], SearchConfig::default());
        for bad in [
            SearchRequest::new("   "),
            SearchRequest::new("x".repeat(501)),
            SearchRequest::new("ok").with_top_k(0),
            SearchRequest::new("ok").with_top_k(51),
        ] {
            let err = e.search(bad).await.unwrap_err();
            assert!(err.is_validation(), "{err}");
        }
    }

    #[tokio::test]
    async fn test_bm25_only_when_documents_have_no_embeddings() {
        let e = engine(
            vec![doc("a", "rust rust rust"), doc("b", "cooking"), doc("c", "rust")],
            SearchConfig::default(),
        );
        let result = e.search(SearchRequest::new("rust")).await.unwrap();
        assert_eq!(result.degradations, vec![Degradation::VectorScoringFailed]);
        assert!(!result.trace.contains(&SearchStage::VectorScored));
        assert_eq!(result.ranked_documents[0].document.id, "a");
        assert_eq!(result.ranked_documents[1].document.id, "c");
    }

    #[tokio::test]
    async fn test_empty_candidate_set() {
        let e = engine(vec![doc("a", "x")], SearchConfig::default());
        let result = e
            .search(SearchRequest::new("x").with_domain("elsewhere"))
            .await
            .unwrap();
        assert!(result.ranked_documents.is_empty());
        assert_eq!(result.total_candidates, 0);
        assert_eq!(result.trace.last(), Some(&SearchStage::Completed));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_everywhere_without_lexical_signal_fails() {
        let e = engine(
            vec![
                doc("a", "alpha").with_embedding(vec![1.0, 0.0]),
                doc("b", "beta").with_embedding(vec![0.0, 1.0]),
            ],
            SearchConfig::default(),
        );
        let err = e.search(SearchRequest::new("gamma")).await.unwrap_err();
        assert!(matches!(err, SiftError::DimensionMismatch { expected: 64, actual: 2 }));

        // with lexical signal the same data degrades instead
        let result = e.search(SearchRequest::new("alpha")).await.unwrap();
        assert_eq!(result.degradations, vec![Degradation::VectorScoringFailed]);
        assert_eq!(result.ranked_documents[0].document.id, "a");
    }

    #[tokio::test]
    async fn test_search_results_are_cached() {
        let e = engine(vec![doc("a", "rust").with_embedding(vec![1.0; 64])], SearchConfig::default());
        let first = e.search(SearchRequest::new("rust")).await.unwrap();
        assert!(!first.from_cache);
        assert!(first.degradations.is_empty());

        let second = e.search(SearchRequest::new("rust")).await.unwrap();
        assert!(second.from_cache);
        assert_ne!(first.request_id, second.request_id);
        assert_eq!(first.ranked_documents, second.ranked_documents);
    }

    #[tokio::test]
    async fn test_result_serializes_flat_scores() {
        let e = engine(vec![doc("a", "rust").with_embedding(vec![1.0; 64])], SearchConfig::default());
        let result = e
            .search(SearchRequest::new("rust").with_embeddings(true))
            .await
            .unwrap();
        let json = serde_json::to_value(&result).unwrap();
        let hit = &json["ranked_documents"][0];
        assert_eq!(hit["document_id"], "a");
        assert!(hit["fused_score"].is_number());
        assert_eq!(hit["embedding"].as_array().unwrap().len(), 64);
        assert_eq!(json["trace"][0], "RECEIVED");
    }
}
