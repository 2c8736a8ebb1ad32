//! Core types and error definitions for the sift retrieval engine.
//!
//! This crate provides the foundational types shared across all sift crates:
//! the error taxonomy and the document/score data model that flows through
//! the ranking pipeline.
//!
//! # Main types
//!
//! - [`SiftError`]: Unified error enum for every ranking stage.
//! - [`SiftResult`]: Convenience alias for `Result<T, SiftError>`.
//! - [`Document`]: A knowledge item fetched from the document store.
//! - [`ScoredDocument`]: Per-document scores produced by fusion and reranking.
//! - [`EmbeddingVector`]: Dense embedding of a query or document.

/// Error taxonomy.
pub mod error;

pub use error::{SiftError, SiftResult};

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Dense embedding of a query or a document.
///
/// All vectors compared against each other must share one length.
pub type EmbeddingVector = Vec<f32>;

// --- Documents ---

/// A knowledge item as yielded by the document store.
///
/// Documents are immutable once fetched; the orchestrator owns them for the
/// lifetime of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned identifier, unique within the store.
    pub id: String,
    /// Domain used for candidate filtering (e.g. `"nursing"`).
    #[serde(default)]
    pub domain: String,
    /// Human-readable title.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    /// Body text; a `null` body is read as an empty document.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    /// Free-form tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Arbitrary key-value metadata carried through to the caller.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Document {
    /// Creates a document with the given id, domain, title and content.
    pub fn new(
        id: impl Into<String>,
        domain: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            domain: domain.into(),
            title: title.into(),
            content: content.into(),
            tags: BTreeSet::new(),
            metadata: HashMap::new(),
        }
    }

    /// Adds a tag. Chainable builder method.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// --- Scores ---

/// Scores attached to one candidate document.
///
/// Created by score fusion; the reranker fills in `rerank_score`. Read-only
/// after that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    /// Id of the scored [`Document`].
    pub document_id: String,
    /// Raw BM25 score.
    pub bm25_score: f32,
    /// Raw cosine similarity against the query embedding.
    pub vector_score: f32,
    /// Weighted combination of the normalized lexical and dense scores.
    pub fused_score: f32,
    /// Relevance score assigned by the reranking provider, if reranked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

impl ScoredDocument {
    /// Creates a score record that has not been through fusion yet.
    pub fn new(document_id: impl Into<String>, bm25_score: f32, vector_score: f32) -> Self {
        Self {
            document_id: document_id.into(),
            bm25_score,
            vector_score,
            fused_score: 0.0,
            rerank_score: None,
        }
    }
}
