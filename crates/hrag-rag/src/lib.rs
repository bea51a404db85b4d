//! hrag RAG - Report ingestion and question answering
//!
//! Two halves share the same vector store and embedder:
//! - `IngestPipeline` turns an uploaded PDF into namespaced chunk vectors
//! - `RagAgent` answers a user's question from that user's chunks only
//!
//! Author: hephaex@gmail.com

use std::sync::Arc;
use std::time::Instant;

use futures::stream::BoxStream;
use hrag_core::config::VectorConfig;
use hrag_core::{HragError, LlmClient, Namespace, Result, RetrievedChunk};
use hrag_vector::{EmbeddingClient, VectorStore};
use serde::Serialize;

pub mod cache;
pub mod ingest;
pub mod llm;
pub mod prompt;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use cache::{CacheConfig, CacheStatsReport, EmbeddingCache};
pub use ingest::{pdf_filename, IngestPipeline, IngestReport, TempUpload};
pub use llm::{create_llm_client, GeminiClient, OllamaClient, OpenAiClient};
pub use prompt::PromptBuilder;

/// Message for a query against an empty namespace
pub const NO_DOCUMENTS: &str = "No documents found for this user.";

// ============================================================================
// Configuration
// ============================================================================

/// Retrieval settings
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// Chunks retrieved for a focused question
    pub top_k: usize,

    /// Maximum context length for LLM (in characters)
    pub max_context_length: usize,

    /// Upper bound on chunks read for a document-wide question
    pub max_namespace_chunks: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_context_length: 8000,
            max_namespace_chunks: 5000,
        }
    }
}

impl From<&VectorConfig> for RagConfig {
    fn from(config: &VectorConfig) -> Self {
        Self {
            top_k: config.top_k,
            max_namespace_chunks: config.max_namespace_chunks,
            ..Self::default()
        }
    }
}

// ============================================================================
// Query Analysis
// ============================================================================

/// How much of the user's material a question needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryScope {
    /// Summaries and overviews read every chunk in document order
    DocumentWide,
    /// Everything else uses top-k similarity search
    Focused,
}

const DOCUMENT_WIDE_WORDS: &[&str] = &[
    "summarise",
    "summarize",
    "summary",
    "overview",
    "entire",
    "whole",
    "all",
];

impl QueryScope {
    pub fn classify(question: &str) -> Self {
        let lower = question.to_lowercase();
        let wide = lower
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| DOCUMENT_WIDE_WORDS.contains(&word));

        if wide {
            Self::DocumentWide
        } else {
            Self::Focused
        }
    }
}

// ============================================================================
// Agent
// ============================================================================

/// Answer to one question
#[derive(Debug, Clone, Serialize)]
pub struct AgentAnswer {
    pub answer: String,
    /// Distinct documents the context came from, in first-use order
    pub sources: Vec<String>,
    pub chunks_used: usize,
    pub scope: QueryScope,
    pub processing_time_ms: u64,
}

/// Streaming answer; sources are known before the first fragment
pub struct AgentStream {
    pub sources: Vec<String>,
    pub scope: QueryScope,
    pub stream: BoxStream<'static, Result<String>>,
}

/// Retrieval context prepared for the LLM
struct PreparedQuery {
    scope: QueryScope,
    chunks: Vec<RetrievedChunk>,
    prompt: String,
}

/// Question answering over a user's own reports
pub struct RagAgent {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    llm: Arc<dyn LlmClient>,
    cache: EmbeddingCache,
    config: RagConfig,
}

impl RagAgent {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        llm: Arc<dyn LlmClient>,
        config: RagConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            llm,
            cache: EmbeddingCache::new(),
            config,
        }
    }

    pub fn with_cache(mut self, cache: EmbeddingCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    pub fn llm_name(&self) -> &str {
        self.llm.name()
    }

    /// Top-k chunks of the namespace most similar to the question
    pub async fn retrieve(
        &self,
        namespace: &Namespace,
        question: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let vector = self
            .cache
            .get_or_embed(self.embedder.as_ref(), question)
            .await?;
        let results = self.store.search(namespace, &vector, k).await?;
        tracing::debug!("Vector search returned {} results", results.len());
        Ok(results)
    }

    /// Every chunk of the namespace in document order
    pub async fn all_chunks(&self, namespace: &Namespace) -> Result<Vec<RetrievedChunk>> {
        self.store
            .namespace_chunks(namespace, self.config.max_namespace_chunks)
            .await
    }

    pub async fn answer(&self, namespace: &Namespace, question: &str) -> Result<AgentAnswer> {
        let start = Instant::now();
        let prepared = self.prepare(namespace, question).await?;

        tracing::info!(
            "Calling LLM with prompt length: {} chars",
            prepared.prompt.len()
        );
        let answer = self.llm.generate(&prepared.prompt).await?;
        tracing::info!("LLM response received: {} chars", answer.len());

        Ok(AgentAnswer {
            answer: answer.trim().to_string(),
            sources: distinct_sources(&prepared.chunks),
            chunks_used: prepared.chunks.len(),
            scope: prepared.scope,
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    pub async fn answer_stream(&self, namespace: &Namespace, question: &str) -> Result<AgentStream> {
        let prepared = self.prepare(namespace, question).await?;
        let stream = self.llm.generate_stream(&prepared.prompt).await?;

        Ok(AgentStream {
            sources: distinct_sources(&prepared.chunks),
            scope: prepared.scope,
            stream,
        })
    }

    async fn prepare(&self, namespace: &Namespace, question: &str) -> Result<PreparedQuery> {
        let question = question.trim();
        if question.is_empty() {
            return Err(HragError::ValidationError(
                "query cannot be empty".to_string(),
            ));
        }

        let scope = QueryScope::classify(question);
        tracing::info!(user = %namespace, ?scope, "RAG query started");

        let chunks = match scope {
            QueryScope::DocumentWide => self.all_chunks(namespace).await?,
            QueryScope::Focused => {
                self.retrieve(namespace, question, self.config.top_k)
                    .await?
            }
        };

        if chunks.is_empty() {
            return Err(HragError::NotFound(NO_DOCUMENTS.to_string()));
        }

        let builder = PromptBuilder::for_reports()
            .add_chunks(&chunks, self.config.max_context_length)
            .question(question);
        let used = builder.context_len();
        let prompt = builder.build();

        let mut chunks = chunks;
        chunks.truncate(used);

        Ok(PreparedQuery {
            scope,
            chunks,
            prompt,
        })
    }
}

fn distinct_sources(chunks: &[RetrievedChunk]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for chunk in chunks {
        if !sources.contains(&chunk.source) {
            sources.push(chunk.source.clone());
        }
    }
    sources
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use hrag_core::testing::ScriptedLlm;
    use hrag_core::ChunkRecord;
    use hrag_vector::testing::{HashEmbedding, MemoryVectorStore};

    struct Fixture {
        store: Arc<MemoryVectorStore>,
        embedder: Arc<HashEmbedding>,
        llm: Arc<ScriptedLlm>,
        agent: RagAgent,
    }

    fn fixture(config: RagConfig) -> Fixture {
        let store = Arc::new(MemoryVectorStore::new());
        let embedder = Arc::new(HashEmbedding::new(64));
        let llm = Arc::new(ScriptedLlm::new("Your LDL is above range."));
        let agent = RagAgent::new(store.clone(), embedder.clone(), llm.clone(), config);
        Fixture {
            store,
            embedder,
            llm,
            agent,
        }
    }

    async fn seed(f: &Fixture, user: &str, source: &str, texts: &[&str]) {
        let ns = Namespace::parse(user).unwrap();
        let mut records = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let vector = f.embedder.embed(text).await.unwrap();
            records.push(ChunkRecord::new(ns.clone(), source, i as u32, i * 100, *text, vector));
        }
        f.store.upsert(&records).await.unwrap();
    }

    fn ns(user: &str) -> Namespace {
        Namespace::parse(user).unwrap()
    }

    #[test]
    fn test_query_scope() {
        assert_eq!(QueryScope::classify("Summarise my report"), QueryScope::DocumentWide);
        assert_eq!(QueryScope::classify("give me an OVERVIEW"), QueryScope::DocumentWide);
        assert_eq!(QueryScope::classify("explain the whole thing"), QueryScope::DocumentWide);
        assert_eq!(QueryScope::classify("Is my LDL high?"), QueryScope::Focused);
        // substring matches do not count
        assert_eq!(QueryScope::classify("Is my cholesterol normal?"), QueryScope::Focused);
    }

    #[test]
    fn test_rag_config_defaults() {
        let config = RagConfig::default();
        assert_eq!(config.top_k, 5);
        assert_eq!(config.max_context_length, 8000);

        let from_vector = RagConfig::from(&VectorConfig::default());
        assert_eq!(from_vector.top_k, 5);
    }

    #[tokio::test]
    async fn test_answer_uses_only_own_namespace() {
        let f = fixture(RagConfig::default());
        seed(&f, "alice", "labs.pdf", &["LDL cholesterol 162 mg/dL high", "HDL 41 mg/dL"]).await;
        seed(&f, "bob", "secret.pdf", &["Bob's LDL cholesterol 99 mg/dL"]).await;

        let answer = f.agent.answer(&ns("alice"), "What is my LDL cholesterol?").await.unwrap();

        assert_eq!(answer.answer, "Your LDL is above range.");
        assert_eq!(answer.sources, vec!["labs.pdf".to_string()]);
        assert_eq!(answer.scope, QueryScope::Focused);

        let prompt = &f.llm.prompts()[0];
        assert!(prompt.contains("LDL cholesterol 162"));
        assert!(!prompt.contains("Bob"));
    }

    #[tokio::test]
    async fn test_document_wide_reads_every_chunk_in_order() {
        let f = fixture(RagConfig {
            top_k: 1,
            ..RagConfig::default()
        });
        seed(&f, "alice", "labs.pdf", &["first part", "second part", "third part"]).await;

        let answer = f.agent.answer(&ns("alice"), "Summarize my report").await.unwrap();
        assert_eq!(answer.scope, QueryScope::DocumentWide);
        assert_eq!(answer.chunks_used, 3);

        let prompt = &f.llm.prompts()[0];
        let first = prompt.find("first part").unwrap();
        let third = prompt.find("third part").unwrap();
        assert!(first < third);
    }

    #[tokio::test]
    async fn test_context_is_trimmed() {
        let f = fixture(RagConfig {
            max_context_length: 15,
            ..RagConfig::default()
        });
        seed(&f, "alice", "labs.pdf", &["0123456789", "abcdefghij", "klmnopqrst"]).await;

        let answer = f.agent.answer(&ns("alice"), "overview please").await.unwrap();
        assert_eq!(answer.chunks_used, 1);
    }

    #[tokio::test]
    async fn test_empty_namespace_is_not_found() {
        let f = fixture(RagConfig::default());
        seed(&f, "bob", "labs.pdf", &["text"]).await;

        for question in ["What is my LDL?", "summary"] {
            let err = f.agent.answer(&ns("alice"), question).await.unwrap_err();
            assert_eq!(err.to_string(), format!("Not found: {NO_DOCUMENTS}"));
        }
        assert!(f.llm.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let f = fixture(RagConfig::default());
        let err = f.agent.answer(&ns("alice"), "   ").await.unwrap_err();
        assert!(matches!(err, HragError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_query_embedding_is_cached() {
        let f = fixture(RagConfig::default());
        seed(&f, "alice", "labs.pdf", &["glucose 98 mg/dL"]).await;
        let before = f.embedder.calls();

        f.agent.retrieve(&ns("alice"), "glucose?", 5).await.unwrap();
        f.agent.retrieve(&ns("alice"), "glucose?", 5).await.unwrap();

        assert_eq!(f.embedder.calls(), before + 1);
        assert_eq!(f.agent.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_answer_stream() {
        let f = fixture(RagConfig::default());
        seed(&f, "alice", "labs.pdf", &["LDL 162"]).await;

        let streamed = f.agent.answer_stream(&ns("alice"), "LDL?").await.unwrap();
        assert_eq!(streamed.sources, vec!["labs.pdf".to_string()]);

        let parts: Vec<String> = streamed
            .stream
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(parts.concat(), "Your LDL is above range.");
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let store = Arc::new(MemoryVectorStore::new());
        let embedder = Arc::new(HashEmbedding::new(8));
        let agent = RagAgent::new(
            store.clone(),
            embedder.clone(),
            Arc::new(ScriptedLlm::failing()),
            RagConfig::default(),
        );
        let vector = embedder.embed("x").await.unwrap();
        store
            .upsert(&[ChunkRecord::new(ns("alice"), "a.pdf", 0, 0, "x", vector)])
            .await
            .unwrap();

        let err = agent.answer(&ns("alice"), "x?").await.unwrap_err();
        assert!(matches!(err, HragError::LlmError(_)));
    }
}
