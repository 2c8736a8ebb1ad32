use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sift_core::{Document, ScoredDocument, SiftError, SiftResult};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Most records the reranking provider accepts in one call.
pub const MAX_RERANK_BATCH: usize = 200;

/// One record sent to the reranking provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankRecord {
    pub id: String,
    pub title: String,
    pub content: String,
}

/// One score returned by the reranking provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRecord {
    pub id: String,
    pub score: f32,
}

/// Scores `(query, record)` pairs with a second-pass model.
#[async_trait]
pub trait RankingProvider: Send + Sync {
    /// Score `records` against `query`, returning at most `top_n` of them.
    async fn rank(
        &self,
        query: &str,
        records: &[RankRecord],
        top_n: usize,
    ) -> SiftResult<Vec<RankedRecord>>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// A fused candidate together with the document it scores.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub scored: ScoredDocument,
    pub document: Document,
}

impl Candidate {
    fn to_record(&self) -> RankRecord {
        RankRecord {
            id: self.document.id.clone(),
            title: self.document.title.clone(),
            content: format!("{}\n{}", self.document.title, self.document.content),
        }
    }
}

/// Result of a rerank attempt.
#[derive(Debug, Clone)]
pub struct RerankOutcome {
    /// Candidates in final order, at most `top_n`.
    pub candidates: Vec<Candidate>,
    /// `false` when the input order was kept because the provider failed.
    pub reranked: bool,
    /// Why the fallback was taken, when it was.
    pub fallback_reason: Option<String>,
}

/// Client for the reranking provider with a timeout and graceful fallback.
pub struct Reranker {
    provider: Arc<dyn RankingProvider>,
    timeout: Duration,
}

impl Reranker {
    pub fn new(provider: Arc<dyn RankingProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Configured per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Rerank with the configured timeout.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<Candidate>,
        top_n: usize,
    ) -> SiftResult<RerankOutcome> {
        self.rerank_within(query, candidates, top_n, self.timeout)
            .await
    }

    /// Rerank, giving the provider at most `timeout`.
    ///
    /// # Errors
    /// [`SiftError::BatchTooLarge`] when more than [`MAX_RERANK_BATCH`]
    /// candidates are passed; the provider is not called. Provider failures
    /// never surface as errors: the first `top_n` candidates are returned in
    /// input order with `reranked = false`.
    pub async fn rerank_within(
        &self,
        query: &str,
        mut candidates: Vec<Candidate>,
        top_n: usize,
        timeout: Duration,
    ) -> SiftResult<RerankOutcome> {
        if candidates.len() > MAX_RERANK_BATCH {
            return Err(SiftError::BatchTooLarge {
                size: candidates.len(),
                max: MAX_RERANK_BATCH,
            });
        }

        if candidates.is_empty() || top_n == 0 {
            candidates.truncate(top_n);
            return Ok(RerankOutcome {
                candidates,
                reranked: false,
                fallback_reason: None,
            });
        }

        let records: Vec<RankRecord> = candidates.iter().map(Candidate::to_record).collect();
        let call = self.provider.rank(query, &records, top_n);
        let ranked = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(ranked)) => ranked,
            Ok(Err(e)) => return Ok(fallback(candidates, top_n, self.provider.name(), &e)),
            Err(_) => {
                let e = SiftError::UpstreamTimeout(format!(
                    "{} did not answer within {}ms",
                    self.provider.name(),
                    timeout.as_millis()
                ));
                return Ok(fallback(candidates, top_n, self.provider.name(), &e));
            }
        };

        let submitted = candidates.len();
        let reranked = apply_scores(candidates, &ranked, top_n);
        match reranked {
            Ok(result) => {
                info!(
                    provider = self.provider.name(),
                    submitted,
                    returned = result.len(),
                    "Reranked candidates"
                );
                Ok(RerankOutcome {
                    candidates: result,
                    reranked: true,
                    fallback_reason: None,
                })
            }
            Err(original) => {
                let e = SiftError::UpstreamUnavailable(format!(
                    "{} returned no known record ids",
                    self.provider.name()
                ));
                Ok(fallback(original, top_n, self.provider.name(), &e))
            }
        }
    }
}

fn fallback(
    mut candidates: Vec<Candidate>,
    top_n: usize,
    provider: &str,
    error: &SiftError,
) -> RerankOutcome {
    warn!(provider, error = %error, "Reranking failed, keeping fused order");
    candidates.truncate(top_n);
    RerankOutcome {
        candidates,
        reranked: false,
        fallback_reason: Some(error.to_string()),
    }
}

/// Attach provider scores, drop unmatched ids, sort and truncate.
///
/// Returns the untouched candidates as `Err` when not a single returned id
/// matched, so the caller can fall back.
fn apply_scores(
    candidates: Vec<Candidate>,
    ranked: &[RankedRecord],
    top_n: usize,
) -> Result<Vec<Candidate>, Vec<Candidate>> {
    let scores: HashMap<&str, f32> = ranked
        .iter()
        .filter(|r| r.score.is_finite())
        .map(|r| (r.id.as_str(), r.score))
        .collect();

    if !candidates
        .iter()
        .any(|c| scores.contains_key(c.document.id.as_str()))
    {
        return Err(candidates);
    }

    let mut matched: Vec<Candidate> = candidates
        .into_iter()
        .filter_map(|mut c| {
            let score = *scores.get(c.document.id.as_str())?;
            c.scored.rerank_score = Some(score);
            Some(c)
        })
        .collect();

    matched.sort_by(|a, b| {
        b.scored
            .rerank_score
            .partial_cmp(&a.scored.rerank_score)
            .unwrap_or(Ordering::Equal)
    });
    matched.truncate(top_n);
    Ok(matched)
}
