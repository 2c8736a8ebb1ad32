use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// BM25 tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term-frequency saturation. Typical range 1.2 to 2.0.
    #[serde(default = "default_k1")]
    pub k1: f32,
    /// Length normalization strength in `[0, 1]`.
    #[serde(default = "default_b")]
    pub b: f32,
    /// Floor applied to every IDF so very common terms keep a small positive weight.
    #[serde(default = "default_epsilon")]
    pub epsilon: f32,
}

fn default_k1() -> f32 {
    1.5
}

fn default_b() -> f32 {
    0.75
}

fn default_epsilon() -> f32 {
    0.25
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
            epsilon: default_epsilon(),
        }
    }
}

/// Aggregate statistics over one scoring batch.
///
/// Built per request from the candidate set and dropped afterwards; the
/// candidate set changes with every query and domain filter.
#[derive(Debug, Clone, Default)]
pub struct CorpusStats {
    /// Number of documents in the batch.
    pub doc_count: usize,
    /// Mean token count per document (0 for an empty corpus).
    pub avg_doc_length: f32,
    /// token -> number of documents containing it.
    pub doc_freqs: HashMap<String, usize>,
    /// token -> floored IDF.
    pub idf: HashMap<String, f32>,
}

impl CorpusStats {
    /// IDF of `term`, or `None` when the term is outside the vocabulary.
    pub fn idf(&self, term: &str) -> Option<f32> {
        self.idf.get(term).copied()
    }
}

/// Per-document term statistics.
#[derive(Debug, Clone, Default)]
pub struct DocumentTerms {
    /// token -> occurrences in this document.
    pub term_freqs: HashMap<String, u32>,
    /// Token count of the document.
    pub length: usize,
}

impl DocumentTerms {
    /// Count term frequencies of one tokenized document.
    pub fn from_tokens(tokens: &[String]) -> Self {
        let mut term_freqs: HashMap<String, u32> = HashMap::new();
        for token in tokens {
            *term_freqs.entry(token.clone()).or_insert(0) += 1;
        }
        Self {
            term_freqs,
            length: tokens.len(),
        }
    }
}

/// Compute corpus statistics for a batch of tokenized documents.
///
/// IDF uses `ln((N - df + 0.5) / (df + 0.5) + 1)`, floored at `params.epsilon`.
pub fn fit(corpus: &[Vec<String>], params: &Bm25Params) -> CorpusStats {
    let doc_count = corpus.len();
    if doc_count == 0 {
        return CorpusStats::default();
    }

    let total_len: usize = corpus.iter().map(Vec::len).sum();
    let avg_doc_length = total_len as f32 / doc_count as f32;

    let mut doc_freqs: HashMap<String, usize> = HashMap::new();
    for doc in corpus {
        let unique: HashSet<&String> = doc.iter().collect();
        for token in unique {
            *doc_freqs.entry(token.clone()).or_insert(0) += 1;
        }
    }

    let n = doc_count as f32;
    let idf = doc_freqs
        .iter()
        .map(|(token, &df)| {
            let df = df as f32;
            let value = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            (token.clone(), value.max(params.epsilon))
        })
        .collect();

    CorpusStats {
        doc_count,
        avg_doc_length,
        doc_freqs,
        idf,
    }
}

/// BM25 score of a single document.
///
/// ```text
/// score = Σ IDF(t) * (tf * (k1 + 1)) / (tf + k1 * (1 - b + b * dl / avgdl))
/// ```
///
/// Each distinct query term counts once. Terms outside the corpus vocabulary
/// contribute zero, and so does every term when `avgdl` is zero.
pub fn score(
    query: &[String],
    stats: &CorpusStats,
    doc: &DocumentTerms,
    params: &Bm25Params,
) -> f32 {
    if query.is_empty() || stats.avg_doc_length <= 0.0 {
        return 0.0;
    }

    let length_ratio = doc.length as f32 / stats.avg_doc_length;
    let norm = params.k1 * (1.0 - params.b + params.b * length_ratio);

    let mut seen: HashSet<&str> = HashSet::new();
    let mut total = 0.0;
    for term in query {
        if !seen.insert(term.as_str()) {
            continue;
        }
        let Some(idf) = stats.idf(term) else {
            continue;
        };
        let tf = doc.term_freqs.get(term).copied().unwrap_or(0) as f32;
        if tf == 0.0 {
            continue;
        }
        total += idf * (tf * (params.k1 + 1.0)) / (tf + norm);
    }
    total
}

/// A BM25 index fitted to one batch of candidate documents.
///
/// Documents are addressed by their position in the batch, which is the
/// candidate order handed to [`Bm25Index::fit`].
#[derive(Debug, Clone)]
pub struct Bm25Index {
    params: Bm25Params,
    stats: CorpusStats,
    documents: Vec<DocumentTerms>,
}

impl Bm25Index {
    /// Fit an index over tokenized documents.
    pub fn fit(corpus: &[Vec<String>], params: Bm25Params) -> Self {
        let stats = fit(corpus, &params);
        let documents = corpus.iter().map(|d| DocumentTerms::from_tokens(d)).collect();
        Self {
            params,
            stats,
            documents,
        }
    }

    /// Score of the document at `doc_index`; 0 for an out-of-range index.
    pub fn score(&self, query: &[String], doc_index: usize) -> f32 {
        self.documents
            .get(doc_index)
            .map_or(0.0, |doc| score(query, &self.stats, doc, &self.params))
    }

    /// Scores of every document, in batch order.
    pub fn scores(&self, query: &[String]) -> Vec<f32> {
        self.documents
            .iter()
            .map(|doc| score(query, &self.stats, doc, &self.params))
            .collect()
    }
}
