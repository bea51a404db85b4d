//! hrag Core - Domain types, traits, and shared errors
//!
//! This crate defines the abstractions shared by the ingestion and
//! retrieval pipeline:
//! - Error types
//! - User namespaces (per-user isolation key)
//! - Chunk records stored in the vector index
//! - The LLM client trait
//! - Configuration management
//!
//! Author: hephaex@gmail.com

pub mod config;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::{
    AdminConfig, AppConfig, ConfigError, EmbeddingProvider, IngestConfig, LimitsConfig, LlmConfig,
    LlmProvider, LoggingConfig, ServerConfig, StoreConfig, VectorConfig,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Quotas
// ============================================================================

/// Which daily allowance a request draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaKind {
    Upload,
    Query,
}

impl std::fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upload => write!(f, "upload"),
            Self::Query => write!(f, "query"),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for hrag operations
#[derive(Error, Debug)]
pub enum HragError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Daily {kind} limit of {limit} reached")]
    RateLimited { kind: QuotaKind, limit: u32 },

    #[error("Document limit reached: at most {limit} documents per user")]
    DocumentLimit { limit: usize },

    #[error("Counter store error: {0}")]
    StoreError(String),

    #[error("Vector store error: {0}")]
    VectorStoreError(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Text extraction error: {0}")]
    ExtractionError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, HragError>;

// ============================================================================
// Namespaces
// ============================================================================

/// Maximum accepted length of a user id
pub const MAX_NAMESPACE_LEN: usize = 128;

/// A validated user identifier.
///
/// Every vector written for a user carries this value, and every search is
/// filtered by it. It is also embedded in counter keys and temp file
/// names; the accepted alphabet is `[A-Za-z0-9._-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    /// Validate and wrap a raw user id
    pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
        let id = raw.as_ref().trim();

        if id.is_empty() {
            return Err(HragError::ValidationError(
                "user_id cannot be empty".to_string(),
            ));
        }

        if id.chars().count() > MAX_NAMESPACE_LEN {
            return Err(HragError::ValidationError(format!(
                "user_id exceeds {MAX_NAMESPACE_LEN} characters"
            )));
        }

        if id == "." || id == ".." {
            return Err(HragError::ValidationError(format!(
                "user_id '{id}' is reserved"
            )));
        }

        let valid = id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(HragError::ValidationError(format!(
                "user_id '{id}' contains unsupported characters"
            )));
        }

        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Namespace {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Namespace {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Namespace::parse(raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Chunk Models
// ============================================================================

/// A chunk ready to be written to the vector index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Point id in the vector store
    pub id: Uuid,

    /// Owning user namespace
    pub namespace: Namespace,

    /// Original filename of the uploaded document
    pub source: String,

    /// Position of the chunk within its document
    pub chunk_index: u32,

    /// Character offset of the chunk in the assembled document text
    pub start_index: usize,

    /// Chunk text
    pub text: String,

    /// Embedding vector
    pub vector: Vec<f32>,

    /// Ingestion timestamp
    pub ingested_at: DateTime<Utc>,
}

impl ChunkRecord {
    /// Create a new chunk record
    pub fn new(
        namespace: Namespace,
        source: impl Into<String>,
        chunk_index: u32,
        start_index: usize,
        text: impl Into<String>,
        vector: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            namespace,
            source: source.into(),
            chunk_index,
            start_index,
            text: text.into(),
            vector,
            ingested_at: Utc::now(),
        }
    }
}

/// A chunk returned from a namespace search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Chunk text
    pub text: String,

    /// Similarity score (higher is better)
    pub score: f32,

    /// Original filename
    pub source: String,

    /// Position of the chunk within its document
    pub chunk_index: u32,

    /// Character offset in the document text
    pub start_index: usize,
}

/// One document held in a user's namespace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSummary {
    /// Original filename
    pub source: String,

    /// Number of chunks indexed for it
    pub chunk_count: u64,

    /// When the document was ingested
    pub ingested_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Traits
// ============================================================================

/// Trait for LLM clients
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a response
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate a streaming response
    async fn generate_stream(
        &self,
        prompt: &str,
    ) -> Result<futures::stream::BoxStream<'static, Result<String>>>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_accepts_object_ids() {
        let ns = Namespace::parse("65f1a2b3c4d5e6f708192a3b").unwrap();
        assert_eq!(ns.as_str(), "65f1a2b3c4d5e6f708192a3b");

        let ns = Namespace::parse("  user_1.test-a ").unwrap();
        assert_eq!(ns.as_str(), "user_1.test-a");
    }

    #[test]
    fn test_namespace_rejects_invalid() {
        assert!(Namespace::parse("").is_err());
        assert!(Namespace::parse("   ").is_err());
        assert!(Namespace::parse("..").is_err());
        assert!(Namespace::parse("../etc").is_err());
        assert!(Namespace::parse("a b").is_err());
        assert!(Namespace::parse("user:1").is_err());
        assert!(Namespace::parse("x".repeat(MAX_NAMESPACE_LEN + 1)).is_err());
        assert!(Namespace::parse("x".repeat(MAX_NAMESPACE_LEN)).is_ok());
    }

    #[test]
    fn test_namespace_deserialize_validates() {
        let ok: Namespace = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(ok.to_string(), "alice");

        let err = serde_json::from_str::<Namespace>("\"bad id\"");
        assert!(err.is_err());
    }

    #[test]
    fn test_chunk_record_builder() {
        let ns = Namespace::parse("alice").unwrap();
        let record = ChunkRecord::new(ns.clone(), "report.pdf", 3, 420, "text", vec![0.1, 0.2]);

        assert_eq!(record.namespace, ns);
        assert_eq!(record.source, "report.pdf");
        assert_eq!(record.chunk_index, 3);
        assert_eq!(record.start_index, 420);
        assert_eq!(record.vector.len(), 2);
    }

    #[test]
    fn test_quota_kind_names() {
        assert_eq!(QuotaKind::Upload.to_string(), "upload");
        assert_eq!(serde_json::to_string(&QuotaKind::Query).unwrap(), "\"query\"");
        let kind: QuotaKind = serde_json::from_str("\"upload\"").unwrap();
        assert_eq!(kind, QuotaKind::Upload);
    }

    #[test]
    fn test_rate_limited_message() {
        let err = HragError::RateLimited {
            kind: QuotaKind::Query,
            limit: 10,
        };
        assert_eq!(err.to_string(), "Daily query limit of 10 reached");
    }
}
