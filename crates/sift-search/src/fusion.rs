use serde::{Deserialize, Serialize};
use sift_core::ScoredDocument;
use std::cmp::Ordering;

/// The rank assigned to a document that has no signal in one score family
/// when computing Reciprocal Rank Fusion.
const MISSING_RANK: f32 = 1000.0;

/// Relative weight of each score family.
///
/// The weights do not have to sum to 1.0, but configurations should keep
/// them normalized so fused scores stay in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    /// Contribution of lexical (BM25) relevance.
    pub bm25_weight: f32,
    /// Contribution of semantic (dense vector) relevance.
    pub dense_weight: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            bm25_weight: 0.3,
            dense_weight: 0.7,
        }
    }
}

/// How the two score families are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionStrategy {
    /// Weighted sum of per-request min-max normalized scores.
    #[default]
    Weighted,
    /// Weighted Reciprocal Rank Fusion.
    Rrf,
}

/// Min-max normalize a score family to `[0, 1]`.
///
/// Non-finite scores count as 0. A family with no spread carries no ranking
/// information: positive values map to 1.0 and the rest to 0.0.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    let clean: Vec<f32> = scores
        .iter()
        .map(|s| if s.is_finite() { *s } else { 0.0 })
        .collect();

    let Some(min) = clean.iter().copied().reduce(f32::min) else {
        return Vec::new();
    };
    let max = clean.iter().copied().fold(min, f32::max);
    let range = max - min;

    if range <= f32::EPSILON {
        return clean
            .iter()
            .map(|s| if *s > 0.0 { 1.0 } else { 0.0 })
            .collect();
    }

    clean.iter().map(|s| (s - min) / range).collect()
}

/// Sort descending by fused score; `sort_by` is stable, so ties keep
/// corpus order.
fn sort_by_fused(docs: &mut [ScoredDocument]) {
    docs.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(Ordering::Equal)
    });
}

/// Weighted min-max fusion.
///
/// `candidates` carry raw `bm25_score` and `vector_score` in corpus order.
/// Returns them with `fused_score = w_bm25 * norm(bm25) + w_dense * norm(vector)`,
/// best first.
pub fn fuse(mut candidates: Vec<ScoredDocument>, weights: &FusionWeights) -> Vec<ScoredDocument> {
    let bm25: Vec<f32> = candidates.iter().map(|c| c.bm25_score).collect();
    let dense: Vec<f32> = candidates.iter().map(|c| c.vector_score).collect();
    let bm25_norm = min_max_normalize(&bm25);
    let dense_norm = min_max_normalize(&dense);

    for (i, candidate) in candidates.iter_mut().enumerate() {
        candidate.fused_score =
            weights.bm25_weight * bm25_norm[i] + weights.dense_weight * dense_norm[i];
    }

    sort_by_fused(&mut candidates);
    candidates
}

/// 1-based rank of each candidate within one score family, or `None` for
/// candidates without a positive score in that family.
fn family_ranks(scores: &[f32]) -> Vec<Option<usize>> {
    let mut order: Vec<usize> = (0..scores.len()).filter(|&i| scores[i] > 0.0).collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![None; scores.len()];
    for (rank, idx) in order.into_iter().enumerate() {
        ranks[idx] = Some(rank + 1);
    }
    ranks
}

/// Weighted Reciprocal Rank Fusion.
///
/// ```text
/// fused = w_bm25 / (k + rank_bm25) + w_dense / (k + rank_dense)
/// ```
///
/// Candidates without a positive score in a family get `MISSING_RANK` for it.
pub fn fuse_rrf(
    mut candidates: Vec<ScoredDocument>,
    weights: &FusionWeights,
    rrf_k: f32,
) -> Vec<ScoredDocument> {
    let bm25: Vec<f32> = candidates.iter().map(|c| c.bm25_score).collect();
    let dense: Vec<f32> = candidates.iter().map(|c| c.vector_score).collect();
    let bm25_ranks = family_ranks(&bm25);
    let dense_ranks = family_ranks(&dense);

    for (i, candidate) in candidates.iter_mut().enumerate() {
        let b_rank = bm25_ranks[i].map_or(MISSING_RANK, |r| r as f32);
        let d_rank = dense_ranks[i].map_or(MISSING_RANK, |r| r as f32);
        candidate.fused_score =
            weights.bm25_weight / (rrf_k + b_rank) + weights.dense_weight / (rrf_k + d_rank);
    }

    sort_by_fused(&mut candidates);
    candidates
}

/// Apply the configured fusion strategy.
pub fn apply(
    strategy: FusionStrategy,
    candidates: Vec<ScoredDocument>,
    weights: &FusionWeights,
    rrf_k: f32,
) -> Vec<ScoredDocument> {
    match strategy {
        FusionStrategy::Weighted => fuse(candidates, weights),
        FusionStrategy::Rrf => fuse_rrf(candidates, weights, rrf_k),
    }
}
