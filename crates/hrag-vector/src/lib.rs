//! hrag Vector - Namespaced vector index
//!
//! Every user owns one namespace inside a single shared collection. All
//! reads and deletes go through a namespace filter, so the trait below has
//! no operation that can touch another user's vectors except
//! `clear_index`, which is reserved for administrators.

use async_trait::async_trait;
use hrag_core::{ChunkRecord, DocumentSummary, Namespace, Result, RetrievedChunk};

pub mod embedding;
pub mod qdrant_store;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use embedding::{
    check_dimensions, create_embedding_client, EmbeddingClient, OllamaEmbedding, OpenAiEmbedding,
};
pub use qdrant_store::QdrantStore;

/// Trait for namespaced vector database operations
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the index if it does not exist yet (idempotent)
    async fn ensure_index(&self) -> Result<()>;

    /// Insert or replace chunk records
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<()>;

    /// Nearest chunks within one namespace, best first
    async fn search(
        &self,
        namespace: &Namespace,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>>;

    /// Chunks of a namespace ordered by source and position; the first
    /// `limit` in that order are returned
    async fn namespace_chunks(
        &self,
        namespace: &Namespace,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>>;

    /// Documents held in a namespace, newest first
    async fn list_documents(&self, namespace: &Namespace) -> Result<Vec<DocumentSummary>>;

    /// Delete one document's chunks, returning how many were removed
    async fn delete_document(&self, namespace: &Namespace, source: &str) -> Result<u64>;

    /// Delete a namespace's chunks, returning how many were removed
    async fn delete_namespace(&self, namespace: &Namespace) -> Result<u64>;

    /// Delete every vector of every namespace; the index stays usable
    async fn clear_index(&self) -> Result<()>;

    /// Check that the backend answers
    async fn health_check(&self) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Order chunks by source, then by position in the document
pub fn sort_by_position(chunks: &mut [RetrievedChunk]) {
    chunks.sort_by(|a, b| {
        a.source
            .cmp(&b.source)
            .then(a.chunk_index.cmp(&b.chunk_index))
    });
}

/// Order documents newest first, then by name
pub fn sort_newest_first(documents: &mut [DocumentSummary]) {
    documents.sort_by(|a, b| {
        b.ingested_at
            .cmp(&a.ingested_at)
            .then_with(|| a.source.cmp(&b.source))
    });
}
