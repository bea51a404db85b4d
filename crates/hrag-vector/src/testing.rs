//! In-process stand-ins for the vector database and embedding model

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use hrag_core::{ChunkRecord, DocumentSummary, HragError, Namespace, Result, RetrievedChunk};
use tokio::sync::RwLock;

use crate::{EmbeddingClient, VectorStore};

/// Brute-force vector store kept in memory
#[derive(Default)]
pub struct MemoryVectorStore {
    records: RwLock<Vec<ChunkRecord>>,
    index_created: AtomicBool,
    unavailable: AtomicBool,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all namespaces
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn index_created(&self) -> bool {
        self.index_created.load(Ordering::SeqCst)
    }

    /// Make health checks fail (or pass again)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn to_retrieved(record: &ChunkRecord, score: f32) -> RetrievedChunk {
    RetrievedChunk {
        text: record.text.clone(),
        score,
        source: record.source.clone(),
        chunk_index: record.chunk_index,
        start_index: record.start_index,
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ensure_index(&self) -> Result<()> {
        self.index_created.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert(&self, records: &[ChunkRecord]) -> Result<()> {
        let mut stored = self.records.write().await;
        for record in records {
            stored.retain(|r| r.id != record.id);
            stored.push(record.clone());
        }
        Ok(())
    }

    async fn search(
        &self,
        namespace: &Namespace,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let stored = self.records.read().await;
        let mut hits: Vec<RetrievedChunk> = stored
            .iter()
            .filter(|r| &r.namespace == namespace)
            .map(|r| to_retrieved(r, cosine(&r.vector, vector)))
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn namespace_chunks(
        &self,
        namespace: &Namespace,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let stored = self.records.read().await;
        let mut chunks: Vec<RetrievedChunk> = stored
            .iter()
            .filter(|r| &r.namespace == namespace)
            .map(|r| to_retrieved(r, 1.0))
            .collect();
        crate::sort_by_position(&mut chunks);
        chunks.truncate(limit);
        Ok(chunks)
    }

    async fn list_documents(&self, namespace: &Namespace) -> Result<Vec<DocumentSummary>> {
        let stored = self.records.read().await;
        let mut documents: BTreeMap<String, DocumentSummary> = BTreeMap::new();
        for record in stored.iter().filter(|r| &r.namespace == namespace) {
            let entry = documents
                .entry(record.source.clone())
                .or_insert_with(|| DocumentSummary {
                    source: record.source.clone(),
                    chunk_count: 0,
                    ingested_at: None,
                });
            entry.chunk_count += 1;
            entry.ingested_at = entry.ingested_at.max(Some(record.ingested_at));
        }
        let mut documents: Vec<DocumentSummary> = documents.into_values().collect();
        crate::sort_newest_first(&mut documents);
        Ok(documents)
    }

    async fn delete_document(&self, namespace: &Namespace, source: &str) -> Result<u64> {
        let mut stored = self.records.write().await;
        let before = stored.len();
        stored.retain(|r| !(&r.namespace == namespace && r.source == source));
        Ok((before - stored.len()) as u64)
    }

    async fn delete_namespace(&self, namespace: &Namespace) -> Result<u64> {
        let mut stored = self.records.write().await;
        let before = stored.len();
        stored.retain(|r| &r.namespace != namespace);
        Ok((before - stored.len()) as u64)
    }

    async fn clear_index(&self) -> Result<()> {
        self.records.write().await.clear();
        self.index_created.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(HragError::VectorStoreError("vector store unavailable".to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Deterministic bag-of-words embedding.
///
/// Each lowercase word is hashed into one of `dimension` buckets, and the
/// result is L2-normalised, so texts sharing words score as similar.
pub struct HashEmbedding {
    dimension: usize,
    calls: AtomicUsize,
    fail: bool,
}

impl HashEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    /// An embedder whose every call fails
    pub fn failing(dimension: usize) -> Self {
        Self {
            fail: true,
            ..Self::new(dimension)
        }
    }

    /// Number of texts embedded so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail {
            return Err(HragError::EmbeddingError("embedding backend down".to_string()));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        "hash"
    }
}
