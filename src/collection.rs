//! Local collection loading.
//!
//! A small JSON-described document collection for the CLI and for
//! development: each file carries its chunk texts and optional
//! locations. At load time every chunk is embedded and upserted into an
//! [`InMemoryIndex`], and file metadata plus chunk text are registered
//! in an [`InMemoryDocumentStore`] so the navigation, listing, and
//! mentions handlers work against the same data.

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::adapters::{
    Embedder, FileEntry, InMemoryDocumentStore, InMemoryIndex, IndexedChunk, Mention,
};
use crate::error::{DocentError, Result};
use crate::models::ChunkLocation;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionFile {
    pub files: Vec<CollectionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionEntry {
    pub document_id: String,
    pub file_name: String,
    #[serde(default)]
    pub folder_path: String,
    #[serde(default)]
    pub content_type: String,
    pub chunks: Vec<CollectionChunk>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionChunk {
    pub text: String,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub slide: Option<u32>,
    #[serde(default)]
    pub cell: Option<String>,
}

impl CollectionChunk {
    fn location(&self) -> ChunkLocation {
        if let Some(cell) = &self.cell {
            ChunkLocation::Cell(cell.clone())
        } else if let Some(page) = self.page {
            ChunkLocation::Page(page)
        } else if let Some(slide) = self.slide {
            ChunkLocation::Slide(slide)
        } else {
            ChunkLocation::None
        }
    }
}

/// Parse a collection description from disk.
pub fn read_collection(path: &Path) -> Result<CollectionFile> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DocentError::Config(format!("failed to read collection {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        DocentError::Config(format!("failed to parse collection {}: {}", path.display(), e))
    })
}

/// Embed and index every chunk of the collection.
///
/// Returns the populated index and document store.
pub async fn load_collection(
    collection: &CollectionFile,
    embedder: &Arc<dyn Embedder>,
) -> Result<(Arc<InMemoryIndex>, Arc<InMemoryDocumentStore>)> {
    let index = Arc::new(InMemoryIndex::new());
    let store = Arc::new(InMemoryDocumentStore::new());

    let mut chunk_count = 0usize;
    for file in &collection.files {
        store
            .add_file(FileEntry {
                document_id: file.document_id.clone(),
                file_name: file.file_name.clone(),
                folder_path: file.folder_path.clone(),
                content_type: file.content_type.clone(),
                updated_at: chrono::Utc::now(),
            })
            .await;

        for (i, chunk) in file.chunks.iter().enumerate() {
            let embedding = embedder.embed(&chunk.text).await?;
            let location = chunk.location();
            index
                .upsert(IndexedChunk {
                    chunk_id: format!("{}:{}", file.document_id, i),
                    document_id: file.document_id.clone(),
                    document_name: file.file_name.clone(),
                    content: chunk.text.clone(),
                    embedding,
                    location: location.clone(),
                })
                .await;
            store
                .add_chunk_text(Mention {
                    document_id: file.document_id.clone(),
                    document_name: file.file_name.clone(),
                    snippet: chunk.text.clone(),
                    location,
                })
                .await;
            chunk_count += 1;
        }
    }

    info!(
        files = collection.files.len(),
        chunks = chunk_count,
        "loaded collection"
    );

    Ok((index, store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collection_json() {
        let collection: CollectionFile = serde_json::from_str(
            r#"{
                "files": [{
                    "documentId": "d1",
                    "fileName": "report.pdf",
                    "folderPath": "Reports",
                    "contentType": "pdf",
                    "chunks": [
                        { "text": "Revenue grew 12%.", "page": 4 },
                        { "text": "=SUM(B2:B9)", "cell": "Sheet1!B10" }
                    ]
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(collection.files.len(), 1);
        assert_eq!(collection.files[0].chunks.len(), 2);
        assert_eq!(
            collection.files[0].chunks[0].location(),
            ChunkLocation::Page(4)
        );
        assert_eq!(
            collection.files[0].chunks[1].location(),
            ChunkLocation::Cell("Sheet1!B10".to_string())
        );
    }
}
