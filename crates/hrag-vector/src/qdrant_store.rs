//! Qdrant implementation for vector storage
//!
//! All users share one collection. Each point carries its owner in the
//! `namespace` payload field, which has a keyword index, and every query
//! is filtered on it.
//!
//! Author: hephaex@gmail.com

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hrag_core::{
    ChunkRecord, DocumentSummary, HragError, Namespace, Result, RetrievedChunk, VectorConfig,
};
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeleteCollectionBuilder, DeletePointsBuilder, Distance, FieldType, Filter, PointId,
    PointStruct, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde::Serialize;
use tracing::{debug, info};

/// Page size used when walking a namespace with scroll
const SCROLL_PAGE: u32 = 256;

/// Qdrant vector store implementation
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantStore {
    /// Create a new Qdrant connection
    pub fn new(config: &VectorConfig) -> Result<Self> {
        let client = Qdrant::from_url(&config.qdrant_url)
            .api_key(config.qdrant_api_key.clone())
            .build()
            .map_err(|e| HragError::VectorStoreError(format!("Qdrant connection failed: {e}")))?;

        Ok(Self {
            client,
            collection: config.collection.clone(),
            dimension: config.dimension,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn collection_exists(&self) -> Result<bool> {
        let collections = self.client.list_collections().await.map_err(|e| {
            HragError::VectorStoreError(format!("Failed to list collections: {e}"))
        })?;

        Ok(collections
            .collections
            .iter()
            .any(|c| c.name == self.collection))
    }

    async fn count(&self, filter: Filter) -> Result<u64> {
        let response = self
            .client
            .count(
                CountPointsBuilder::new(&self.collection)
                    .filter(filter)
                    .exact(true),
            )
            .await
            .map_err(|e| HragError::VectorStoreError(format!("Failed to count vectors: {e}")))?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn delete_matching(&self, filter: Filter) -> Result<u64> {
        let matched = self.count(filter.clone()).await?;
        if matched == 0 {
            return Ok(0);
        }

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(filter)
                    .wait(true),
            )
            .await
            .map_err(|e| HragError::VectorStoreError(format!("Failed to delete vectors: {e}")))?;

        Ok(matched)
    }

    /// Walk every point matching `filter`, stopping after `limit` points
    async fn scroll_payloads(
        &self,
        filter: Filter,
        limit: usize,
    ) -> Result<Vec<HashMap<String, Value>>> {
        let mut payloads = Vec::new();
        let mut offset: Option<PointId> = None;

        while payloads.len() < limit {
            let page = (limit - payloads.len()).min(SCROLL_PAGE as usize) as u32;
            let mut request = ScrollPointsBuilder::new(&self.collection)
                .filter(filter.clone())
                .limit(page)
                .with_payload(true)
                .with_vectors(false);
            if let Some(next) = offset.take() {
                request = request.offset(next);
            }

            let response = self
                .client
                .scroll(request)
                .await
                .map_err(|e| HragError::VectorStoreError(format!("Failed to scroll vectors: {e}")))?;

            payloads.extend(response.result.into_iter().map(|p| p.payload));

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(payloads)
    }
}

fn namespace_filter(namespace: &Namespace) -> Filter {
    Filter::must([Condition::matches("namespace", namespace.to_string())])
}

/// Payload stored with each vector
#[derive(Debug, Serialize)]
struct ChunkPayload<'a> {
    namespace: &'a str,
    source: &'a str,
    chunk_index: u32,
    start_index: usize,
    text: &'a str,
    ingested_at: String,
}

impl<'a> From<&'a ChunkRecord> for ChunkPayload<'a> {
    fn from(record: &'a ChunkRecord) -> Self {
        Self {
            namespace: record.namespace.as_str(),
            source: &record.source,
            chunk_index: record.chunk_index,
            start_index: record.start_index,
            text: &record.text,
            ingested_at: record.ingested_at.to_rfc3339(),
        }
    }
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> String {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_default()
}

fn payload_int(payload: &HashMap<String, Value>, key: &str) -> i64 {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(n)) => *n,
        Some(Kind::DoubleValue(n)) => *n as i64,
        _ => 0,
    }
}

fn chunk_from_payload(payload: &HashMap<String, Value>, score: f32) -> RetrievedChunk {
    RetrievedChunk {
        text: payload_str(payload, "text"),
        score,
        source: payload_str(payload, "source"),
        chunk_index: payload_int(payload, "chunk_index").max(0) as u32,
        start_index: payload_int(payload, "start_index").max(0) as usize,
    }
}

#[async_trait]
impl super::VectorStore for QdrantStore {
    async fn ensure_index(&self) -> Result<()> {
        if self.collection_exists().await? {
            return Ok(());
        }

        info!(collection = %self.collection, dimension = self.dimension, "Creating collection");
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                ),
            )
            .await
            .map_err(|e| {
                HragError::VectorStoreError(format!("Failed to create collection: {e}"))
            })?;

        self.client
            .create_field_index(CreateFieldIndexCollectionBuilder::new(
                &self.collection,
                "namespace",
                FieldType::Keyword,
            ))
            .await
            .map_err(|e| {
                HragError::VectorStoreError(format!("Failed to create namespace index: {e}"))
            })?;

        Ok(())
    }

    async fn upsert(&self, records: &[ChunkRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = records
            .iter()
            .map(|record| {
                let payload: HashMap<String, Value> =
                    serde_json::to_value(ChunkPayload::from(record))
                        .ok()
                        .and_then(|v| v.as_object().cloned())
                        .unwrap_or_default()
                        .into_iter()
                        .map(|(k, v)| (k, v.into()))
                        .collect();

                PointStruct::new(record.id.to_string(), record.vector.clone(), payload)
            })
            .collect();

        debug!(points = points.len(), collection = %self.collection, "Upserting vectors");
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|e| HragError::VectorStoreError(format!("Failed to upsert vectors: {e}")))?;

        Ok(())
    }

    async fn search(
        &self,
        namespace: &Namespace,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector.to_vec(), limit as u64)
                    .filter(namespace_filter(namespace))
                    .with_payload(true),
            )
            .await
            .map_err(|e| HragError::VectorStoreError(format!("Vector search failed: {e}")))?;

        Ok(results
            .result
            .into_iter()
            .map(|point| chunk_from_payload(&point.payload, point.score))
            .collect())
    }

    async fn namespace_chunks(
        &self,
        namespace: &Namespace,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        // Scroll walks points in id order, so the whole namespace is read
        // before the position order is applied
        let payloads = self
            .scroll_payloads(namespace_filter(namespace), usize::MAX)
            .await?;

        let mut chunks: Vec<RetrievedChunk> = payloads
            .iter()
            .map(|p| chunk_from_payload(p, 1.0))
            .collect();
        super::sort_by_position(&mut chunks);
        chunks.truncate(limit);

        Ok(chunks)
    }

    async fn list_documents(&self, namespace: &Namespace) -> Result<Vec<DocumentSummary>> {
        let payloads = self
            .scroll_payloads(namespace_filter(namespace), usize::MAX)
            .await?;

        let mut documents: BTreeMap<String, DocumentSummary> = BTreeMap::new();
        for payload in &payloads {
            let source = payload_str(payload, "source");
            let ingested_at = DateTime::parse_from_rfc3339(&payload_str(payload, "ingested_at"))
                .ok()
                .map(|t| t.with_timezone(&Utc));

            let entry = documents
                .entry(source.clone())
                .or_insert_with(|| DocumentSummary {
                    source,
                    chunk_count: 0,
                    ingested_at: None,
                });
            entry.chunk_count += 1;
            entry.ingested_at = entry.ingested_at.max(ingested_at);
        }

        let mut documents: Vec<DocumentSummary> = documents.into_values().collect();
        super::sort_newest_first(&mut documents);
        Ok(documents)
    }

    async fn delete_document(&self, namespace: &Namespace, source: &str) -> Result<u64> {
        let filter = Filter::must([
            Condition::matches("namespace", namespace.to_string()),
            Condition::matches("source", source.to_string()),
        ]);
        self.delete_matching(filter).await
    }

    async fn delete_namespace(&self, namespace: &Namespace) -> Result<u64> {
        if !self.collection_exists().await? {
            return Ok(0);
        }
        self.delete_matching(namespace_filter(namespace)).await
    }

    async fn clear_index(&self) -> Result<()> {
        if self.collection_exists().await? {
            info!(collection = %self.collection, "Dropping collection");
            self.client
                .delete_collection(DeleteCollectionBuilder::new(&self.collection))
                .await
                .map_err(|e| {
                    HragError::VectorStoreError(format!("Failed to delete collection: {e}"))
                })?;
        }
        self.ensure_index().await
    }

    async fn health_check(&self) -> Result<()> {
        self.client
            .health_check()
            .await
            .map(|_| ())
            .map_err(|e| HragError::VectorStoreError(format!("Qdrant health check failed: {e}")))
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_from_record() {
        let ns = Namespace::parse("alice").unwrap();
        let record = ChunkRecord::new(ns, "labs.pdf", 2, 300, "LDL 130 mg/dL", vec![0.0; 4]);

        let value = serde_json::to_value(ChunkPayload::from(&record)).unwrap();
        assert_eq!(value["namespace"], "alice");
        assert_eq!(value["source"], "labs.pdf");
        assert_eq!(value["chunk_index"], 2);
        assert_eq!(value["start_index"], 300);
        assert_eq!(value["text"], "LDL 130 mg/dL");
        assert!(value["ingested_at"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_chunk_from_payload() {
        let json = serde_json::json!({
            "namespace": "alice",
            "source": "labs.pdf",
            "chunk_index": 4,
            "start_index": 512,
            "text": "HbA1c 5.4%",
        });
        let payload: HashMap<String, Value> = json
            .as_object()
            .cloned()
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k, v.into()))
            .collect();

        let chunk = chunk_from_payload(&payload, 0.87);
        assert_eq!(chunk.text, "HbA1c 5.4%");
        assert_eq!(chunk.source, "labs.pdf");
        assert_eq!(chunk.chunk_index, 4);
        assert_eq!(chunk.start_index, 512);
        assert_eq!(chunk.score, 0.87);
    }

    #[test]
    fn test_missing_payload_fields_default() {
        let chunk = chunk_from_payload(&HashMap::new(), 0.5);
        assert!(chunk.text.is_empty());
        assert_eq!(chunk.chunk_index, 0);
    }

    #[tokio::test]
    async fn test_store_creation() {
        let store = QdrantStore::new(&VectorConfig::default()).unwrap();
        assert_eq!(store.collection(), "rag-index");
    }
}
