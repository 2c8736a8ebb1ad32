use sift_core::{SiftError, SiftResult};
use tracing::{debug, warn};

/// Cosine similarity `dot(a, b) / (‖a‖·‖b‖)`, clipped to `[-1, 1]`.
///
/// Accumulates in `f64` so the result is symmetric in its arguments and
/// stable for long vectors.
///
/// # Errors
/// - [`SiftError::DimensionMismatch`] when the lengths differ.
/// - [`SiftError::ZeroVector`] when either norm is zero (including empty vectors).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> SiftResult<f32> {
    if a.len() != b.len() {
        return Err(SiftError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }

    if na == 0.0 || nb == 0.0 {
        return Err(SiftError::ZeroVector);
    }

    let similarity = dot / (na.sqrt() * nb.sqrt());
    Ok(similarity.clamp(-1.0, 1.0) as f32)
}

/// Similarities of `query` against each document vector, in input order.
///
/// A failing pair scores `0.0`; one bad document embedding never invalidates
/// the rest of the batch.
pub fn cosine_similarities<V: AsRef<[f32]>>(query: &[f32], docs: &[V]) -> Vec<f32> {
    docs.iter()
        .enumerate()
        .map(|(i, doc)| match cosine_similarity(query, doc.as_ref()) {
            Ok(sim) => sim,
            Err(e) if e.is_data_quality() => {
                debug!(doc_index = i, error = %e, "Unusable document vector, scoring 0");
                0.0
            }
            Err(e) => {
                warn!(doc_index = i, error = %e, "Similarity failed, scoring 0");
                0.0
            }
        })
        .collect()
}

/// L2-normalize a vector in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector {
            *v /= norm;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let v = vec![0.3, -1.2, 4.0, 0.01];
        assert!((cosine_similarity(&v, &v).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).unwrap().abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b).unwrap() + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_symmetric_and_bounded() {
        let vectors = [
            vec![0.1f32, 0.2, 0.3],
            vec![-5.0, 2.5, 0.0],
            vec![1e-3, 1e3, -7.0],
            vec![3.0, 3.0, 3.0],
        ];
        for a in &vectors {
            for b in &vectors {
                let ab = cosine_similarity(a, b).unwrap();
                let ba = cosine_similarity(b, a).unwrap();
                assert_eq!(ab, ba);
                assert!((-1.0..=1.0).contains(&ab));
            }
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            SiftError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_zero_vector() {
        let err = cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, SiftError::ZeroVector));
        assert!(matches!(
            cosine_similarity(&[], &[]).unwrap_err(),
            SiftError::ZeroVector
        ));
    }

    #[test]
    fn test_batch_substitutes_zero_for_failures() {
        let query = vec![1.0, 0.0, 0.0];
        let docs = vec![
            vec![1.0, 0.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
        ];
        let sims = cosine_similarities(&query, &docs);
        assert_eq!(sims.len(), 4);
        assert!((sims[0] - 1.0).abs() < 1e-6);
        assert_eq!(sims[1], 0.0);
        assert_eq!(sims[2], 0.0);
        assert!(sims[3].abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
