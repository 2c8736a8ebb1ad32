use thiserror::Error;

/// A convenience `Result` alias using [`SiftError`].
pub type SiftResult<T> = Result<T, SiftError>;

/// Top-level error type for the sift retrieval engine.
///
/// Only [`SiftError::InvalidQuery`] is meant to reach the caller of a search
/// directly. Everything else is absorbed at the component boundary that
/// produced it and turned into a degraded result.
#[derive(Error, Debug)]
pub enum SiftError {
    /// Empty, oversized or otherwise malformed search input.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Two embedding vectors of different lengths were compared.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Length of the left-hand (query) vector.
        expected: usize,
        /// Length of the right-hand (document) vector.
        actual: usize,
    },

    /// One side of a similarity comparison has zero norm.
    #[error("Zero vector in similarity comparison")]
    ZeroVector,

    /// An upstream provider did not answer before its deadline.
    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// An upstream provider refused, failed or returned garbage.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// More records than the reranking provider accepts in one call.
    #[error("Batch too large: {size} records (max {max})")]
    BatchTooLarge {
        /// Number of records handed to the call.
        size: usize,
        /// Provider ceiling.
        max: usize,
    },

    /// The cache could not store or decode a value.
    #[error("Cache error: {0}")]
    Cache(String),

    /// The document store could not produce candidates.
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid configuration value.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SiftError {
    /// `true` for failures of an external provider (embedding or ranking).
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            SiftError::UpstreamTimeout(_) | SiftError::UpstreamUnavailable(_)
        )
    }

    /// `true` for user input errors that surface as 4xx-equivalents.
    pub fn is_validation(&self) -> bool {
        matches!(self, SiftError::InvalidQuery(_))
    }

    /// `true` for per-pair vector data defects.
    pub fn is_data_quality(&self) -> bool {
        matches!(
            self,
            SiftError::DimensionMismatch { .. } | SiftError::ZeroVector
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_helpers() {
        assert!(SiftError::UpstreamTimeout("embed".into()).is_upstream());
        assert!(SiftError::UpstreamUnavailable("rank".into()).is_upstream());
        assert!(!SiftError::ZeroVector.is_upstream());

        assert!(SiftError::InvalidQuery("empty".into()).is_validation());
        assert!(!SiftError::Cache("poisoned".into()).is_validation());

        assert!(SiftError::ZeroVector.is_data_quality());
        assert!(SiftError::DimensionMismatch {
            expected: 3,
            actual: 2
        }
        .is_data_quality());
    }

    #[test]
    fn test_display_messages() {
        let err = SiftError::BatchTooLarge { size: 201, max: 200 };
        assert_eq!(err.to_string(), "Batch too large: 201 records (max 200)");

        let err = SiftError::DimensionMismatch {
            expected: 768,
            actual: 3,
        };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 768, got 3");
    }
}
