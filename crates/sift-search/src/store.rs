use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sift_core::{Document, EmbeddingVector, SiftError, SiftResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::info;

/// A document together with its precomputed embedding, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub document: Document,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<EmbeddingVector>,
}

impl StoredDocument {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: EmbeddingVector) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Source of candidate documents and their embeddings.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Up to `limit` documents, optionally restricted to one domain, in store order.
    async fn fetch_candidates(&self, domain: Option<&str>, limit: usize)
        -> SiftResult<Vec<Document>>;

    /// Stored embedding of a document, `None` when it has none or is unknown.
    async fn fetch_embedding(&self, document_id: &str) -> SiftResult<Option<EmbeddingVector>>;
}

#[derive(Default)]
struct Entries {
    docs: Vec<StoredDocument>,
    by_id: HashMap<String, usize>,
}

impl Entries {
    fn upsert(&mut self, entry: StoredDocument) {
        match self.by_id.get(&entry.document.id) {
            Some(&idx) => self.docs[idx] = entry,
            None => {
                self.by_id.insert(entry.document.id.clone(), self.docs.len());
                self.docs.push(entry);
            }
        }
    }
}

/// Document store held entirely in memory.
pub struct InMemoryDocumentStore {
    entries: RwLock<Entries>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
        }
    }

    /// A store preloaded with `docs`; later duplicates of an id replace earlier ones.
    pub fn from_documents(docs: impl IntoIterator<Item = StoredDocument>) -> Self {
        let mut entries = Entries::default();
        for doc in docs {
            entries.upsert(doc);
        }
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Insert or replace a document by id.
    pub async fn insert(&self, entry: StoredDocument) {
        self.entries.write().await.upsert(entry);
    }

    /// Attach an embedding to a document. Returns `false` for an unknown id.
    pub async fn set_embedding(&self, document_id: &str, embedding: EmbeddingVector) -> bool {
        let mut entries = self.entries.write().await;
        let Some(&idx) = entries.by_id.get(document_id) else {
            return false;
        };
        entries.docs[idx].embedding = Some(embedding);
        true
    }

    /// Documents that have no embedding yet, in store order.
    pub async fn missing_embeddings(&self) -> Vec<Document> {
        self.entries
            .read()
            .await
            .docs
            .iter()
            .filter(|e| e.embedding.is_none())
            .map(|e| e.document.clone())
            .collect()
    }

    pub async fn all(&self) -> Vec<StoredDocument> {
        self.entries.read().await.docs.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.docs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn fetch_candidates(
        &self,
        domain: Option<&str>,
        limit: usize,
    ) -> SiftResult<Vec<Document>> {
        let entries = self.entries.read().await;
        Ok(entries
            .docs
            .iter()
            .filter(|e| domain.map_or(true, |d| e.document.domain == d))
            .take(limit)
            .map(|e| e.document.clone())
            .collect())
    }

    async fn fetch_embedding(&self, document_id: &str) -> SiftResult<Option<EmbeddingVector>> {
        let entries = self.entries.read().await;
        Ok(entries
            .by_id
            .get(document_id)
            .and_then(|&idx| entries.docs[idx].embedding.clone()))
    }
}

/// Document store persisted as JSONL, one [`StoredDocument`] per line.
///
/// The file is loaded once on open; [`JsonlDocumentStore::save`] rewrites it.
pub struct JsonlDocumentStore {
    path: PathBuf,
    inner: InMemoryDocumentStore,
}

impl JsonlDocumentStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> SiftResult<Self> {
        let path = path.into();
        let inner = InMemoryDocumentStore::new();

        if path.exists() {
            let data = tokio::fs::read_to_string(&path).await.map_err(|e| {
                SiftError::Store(format!("Failed to read {}: {e}", path.display()))
            })?;
            for (lineno, line) in data.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let entry: StoredDocument = serde_json::from_str(line).map_err(|e| {
                    SiftError::Store(format!(
                        "Invalid JSONL entry at {}:{}: {e}",
                        path.display(),
                        lineno + 1
                    ))
                })?;
                inner.insert(entry).await;
            }
            info!(path = %path.display(), documents = inner.len().await, "Loaded document store");
        }

        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// In-memory view of the loaded documents.
    pub fn documents(&self) -> &InMemoryDocumentStore {
        &self.inner
    }

    /// Rewrite the file with the current contents.
    pub async fn save(&self) -> SiftResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SiftError::Store(format!("Failed to create dir: {e}")))?;
        }

        let mut data = String::new();
        for entry in self.inner.all().await {
            data.push_str(&serde_json::to_string(&entry)?);
            data.push('\n');
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| SiftError::Store(format!("Failed to write store: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| SiftError::Store(format!("Failed to replace store: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonlDocumentStore {
    async fn fetch_candidates(
        &self,
        domain: Option<&str>,
        limit: usize,
    ) -> SiftResult<Vec<Document>> {
        self.inner.fetch_candidates(domain, limit).await
    }

    async fn fetch_embedding(&self, document_id: &str) -> SiftResult<Option<EmbeddingVector>> {
        self.inner.fetch_embedding(document_id).await
    }
}
