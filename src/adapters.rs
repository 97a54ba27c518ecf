//! External collaborator interfaces.
//!
//! The pipeline consumes embeddings, vector search, text generation, and
//! structured document metadata through the narrow traits defined here.
//! Implementations are opaque services as far as the core is concerned —
//! the HTTP-backed ones live in [`generate`](crate::generate), and this
//! module ships in-memory reference implementations suitable for tests
//! and small local collections.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{DocentError, Result};
use crate::models::{ChunkLocation, QueryScope, RetrievedChunk};

// ═══════════════════════════════════════════════════════════════════════
// Traits
// ═══════════════════════════════════════════════════════════════════════

/// Turns text into an embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Returns the embedding dimensionality.
    fn dims(&self) -> usize;
}

/// Similarity search over the indexed chunk collection.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `top_k` chunks most similar to `vector`, restricted
    /// to `scope`, with similarity at or above `min_similarity`.
    /// Results are ordered by descending similarity.
    async fn search_similar(
        &self,
        vector: &[f32],
        scope: &QueryScope,
        top_k: usize,
        min_similarity: f64,
    ) -> Result<Vec<RetrievedChunk>>;
}

/// Streaming fragment callback. Invoked once per produced fragment, in
/// production order.
pub type ChunkSink<'a> = Box<dyn FnMut(&str) + Send + 'a>;

/// The generative backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// One blocking call; returns the full answer text.
    async fn generate(&self, spec: &crate::models::PromptSpec) -> Result<String>;

    /// Incremental generation. `on_chunk` is invoked once per fragment
    /// in strictly increasing order; the return value is the fully
    /// concatenated text.
    async fn generate_stream(
        &self,
        spec: &crate::models::PromptSpec,
        on_chunk: ChunkSink<'_>,
    ) -> Result<String>;
}

/// Location of a file inside the user's folder tree.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileLocation {
    pub document_id: String,
    pub file_name: String,
    pub folder_path: String,
}

/// Metadata describing one stored file.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FileEntry {
    pub document_id: String,
    pub file_name: String,
    pub folder_path: String,
    pub content_type: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Filters for [`DocumentStore::list_files`].
#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    /// Restrict to a folder (normalized name match).
    pub folder_name: Option<String>,
    /// Restrict to a document type, e.g. `"pdf"`.
    pub document_type: Option<String>,
}

/// One phrase occurrence found by [`DocumentStore::search_mentions`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Mention {
    pub document_id: String,
    pub document_name: String,
    pub snippet: String,
    pub location: ChunkLocation,
}

/// Structured metadata/document-store operations used by the router's
/// non-retrieval handlers.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Find a file by (normalized) name. `None` when no file matches —
    /// a success path, not an error.
    async fn lookup_file_location(&self, user_id: &str, name: &str)
        -> Result<Option<FileLocation>>;

    /// List the user's files, optionally filtered.
    async fn list_files(&self, user_id: &str, filters: &ListFilters) -> Result<Vec<FileEntry>>;

    /// Literal phrase search across indexed chunk text.
    async fn search_mentions(&self, user_id: &str, phrase: &str) -> Result<Vec<Mention>>;
}

// ═══════════════════════════════════════════════════════════════════════
// Vector utilities
// ═══════════════════════════════════════════════════════════════════════

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

// ═══════════════════════════════════════════════════════════════════════
// In-memory reference implementations
// ═══════════════════════════════════════════════════════════════════════

/// An indexed chunk held by [`InMemoryIndex`].
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub document_name: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub location: ChunkLocation,
}

/// An in-memory vector index using cosine similarity.
///
/// Chunks live in a `HashMap` behind a `tokio::sync::RwLock`. Suitable
/// for tests and small local collections; production deployments plug in
/// a real index behind the same trait.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    chunks: RwLock<HashMap<String, IndexedChunk>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, chunk: IndexedChunk) {
        let mut chunks = self.chunks.write().await;
        chunks.insert(chunk.chunk_id.clone(), chunk);
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }
}

fn scope_admits(scope: &QueryScope, document_id: &str) -> bool {
    match scope {
        QueryScope::All => true,
        QueryScope::Document(id) => id == document_id,
        QueryScope::Documents(ids) => ids.iter().any(|id| id == document_id),
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn search_similar(
        &self,
        vector: &[f32],
        scope: &QueryScope,
        top_k: usize,
        min_similarity: f64,
    ) -> Result<Vec<RetrievedChunk>> {
        let chunks = self.chunks.read().await;

        let mut scored: Vec<RetrievedChunk> = chunks
            .values()
            .filter(|c| scope_admits(scope, &c.document_id))
            .map(|c| {
                let similarity = cosine_similarity(&c.embedding, vector) as f64;
                RetrievedChunk {
                    chunk_id: c.chunk_id.clone(),
                    document_id: c.document_id.clone(),
                    document_name: c.document_name.clone(),
                    content: c.content.clone(),
                    similarity,
                    location: c.location.clone(),
                    metadata: serde_json::Value::Null,
                }
            })
            .filter(|c| c.similarity >= min_similarity)
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// In-memory document store backing the router's structured lookups.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    files: RwLock<Vec<FileEntry>>,
    chunk_texts: RwLock<Vec<Mention>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_file(&self, entry: FileEntry) {
        self.files.write().await.push(entry);
    }

    /// Register chunk text so `search_mentions` can find phrases in it.
    pub async fn add_chunk_text(&self, mention: Mention) {
        self.chunk_texts.write().await.push(mention);
    }
}

/// Normalize a file name the same way entity extraction does: strip the
/// extension, replace `_`/`-` with spaces, collapse whitespace, lowercase.
pub fn normalize_file_name(name: &str) -> String {
    let stem = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() <= 5 => stem,
        _ => name,
    };
    stem.chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn lookup_file_location(
        &self,
        _user_id: &str,
        name: &str,
    ) -> Result<Option<FileLocation>> {
        let target = normalize_file_name(name);
        let files = self.files.read().await;
        Ok(files
            .iter()
            .find(|f| normalize_file_name(&f.file_name) == target)
            .map(|f| FileLocation {
                document_id: f.document_id.clone(),
                file_name: f.file_name.clone(),
                folder_path: f.folder_path.clone(),
            }))
    }

    async fn list_files(&self, _user_id: &str, filters: &ListFilters) -> Result<Vec<FileEntry>> {
        let files = self.files.read().await;
        Ok(files
            .iter()
            .filter(|f| {
                filters
                    .folder_name
                    .as_ref()
                    .map(|folder| {
                        normalize_file_name(&f.folder_path) == normalize_file_name(folder)
                    })
                    .unwrap_or(true)
            })
            .filter(|f| {
                filters
                    .document_type
                    .as_ref()
                    .map(|t| f.content_type.eq_ignore_ascii_case(t))
                    .unwrap_or(true)
            })
            .cloned()
            .collect())
    }

    async fn search_mentions(&self, _user_id: &str, phrase: &str) -> Result<Vec<Mention>> {
        let needle = phrase.to_lowercase();
        if needle.trim().is_empty() {
            return Err(DocentError::Store("empty search phrase".to_string()));
        }
        let texts = self.chunk_texts.read().await;
        Ok(texts
            .iter()
            .filter(|m| m.snippet.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_normalize_file_name() {
        assert_eq!(normalize_file_name("koda_checklist.pdf"), "koda checklist");
        assert_eq!(normalize_file_name("Q1-Report.xlsx"), "q1 report");
        assert_eq!(normalize_file_name("notes"), "notes");
    }

    #[tokio::test]
    async fn test_index_respects_scope() {
        let index = InMemoryIndex::new();
        index
            .upsert(IndexedChunk {
                chunk_id: "c1".into(),
                document_id: "d1".into(),
                document_name: "one.pdf".into(),
                content: "alpha".into(),
                embedding: vec![1.0, 0.0],
                location: ChunkLocation::None,
            })
            .await;
        index
            .upsert(IndexedChunk {
                chunk_id: "c2".into(),
                document_id: "d2".into(),
                document_name: "two.pdf".into(),
                content: "beta".into(),
                embedding: vec![1.0, 0.0],
                location: ChunkLocation::None,
            })
            .await;

        let scoped = index
            .search_similar(&[1.0, 0.0], &QueryScope::Document("d1".into()), 10, 0.0)
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].document_id, "d1");
    }

    #[tokio::test]
    async fn test_index_filters_below_min_similarity() {
        let index = InMemoryIndex::new();
        index
            .upsert(IndexedChunk {
                chunk_id: "c1".into(),
                document_id: "d1".into(),
                document_name: "one.pdf".into(),
                content: "alpha".into(),
                embedding: vec![1.0, 0.0],
                location: ChunkLocation::None,
            })
            .await;

        // Orthogonal query: similarity 0.
        let hits = index
            .search_similar(&[0.0, 1.0], &QueryScope::All, 10, 0.5)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_store_lookup_normalizes() {
        let store = InMemoryDocumentStore::new();
        store
            .add_file(FileEntry {
                document_id: "d1".into(),
                file_name: "koda_checklist.pdf".into(),
                folder_path: "Reports".into(),
                content_type: "pdf".into(),
                updated_at: chrono::Utc::now(),
            })
            .await;

        let hit = store
            .lookup_file_location("u1", "Koda Checklist")
            .await
            .unwrap();
        assert_eq!(hit.unwrap().document_id, "d1");

        let miss = store.lookup_file_location("u1", "passport").await.unwrap();
        assert!(miss.is_none());
    }
}
