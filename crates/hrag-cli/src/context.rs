//! Backend wiring for CLI commands

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use hrag_core::config::AppConfig;
use hrag_core::LlmClient;
use hrag_ocr::{DocumentOcr, OcrManager, PdfRasterizer, TesseractConfig};
use hrag_parser::PdfParser;
use hrag_quota::{CounterStore, DailyQuota, MemoryCounterStore, QuotaLimits, RedisCounterStore};
use hrag_rag::{create_llm_client, IngestPipeline, RagAgent, RagConfig};
use hrag_vector::{create_embedding_client, EmbeddingClient, QdrantStore, VectorStore};

/// Shared context for CLI commands.
///
/// Only the vector store is connected up front; the embedder, LLM and
/// counter store are built by the commands that need them.
pub struct CliContext {
    pub config: AppConfig,
    pub store: Arc<dyn VectorStore>,
}

impl CliContext {
    /// Load configuration from `path` (TOML) or the environment
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => AppConfig::from_file(path)?.with_env_override()?,
            None => AppConfig::from_env()?,
        };
        config.validate()?;

        let store = QdrantStore::new(&config.vector)
            .with_context(|| format!("Failed to connect to Qdrant at {}", config.vector.qdrant_url))?;

        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    fn embedder(&self) -> anyhow::Result<Arc<dyn EmbeddingClient>> {
        Ok(Arc::from(create_embedding_client(&self.config.llm)?))
    }

    fn llm(&self) -> anyhow::Result<Arc<dyn LlmClient>> {
        Ok(Arc::from(create_llm_client(&self.config.llm)?))
    }

    fn ocr(&self) -> Option<Arc<dyn DocumentOcr>> {
        if !self.config.ingest.ocr_enabled {
            return None;
        }
        let manager = OcrManager::detect(
            TesseractConfig::default().with_language(&self.config.ingest.ocr_language),
        );
        manager
            .pdf_ocr(PdfRasterizer::new(self.config.ingest.ocr_dpi))
            .map(|ocr| Arc::new(ocr) as Arc<dyn DocumentOcr>)
    }

    pub fn pipeline(&self) -> anyhow::Result<IngestPipeline> {
        let mut pipeline = IngestPipeline::new(
            Arc::new(PdfParser::new()),
            self.embedder()?,
            Arc::clone(&self.store),
            &self.config.ingest,
            self.config.vector.dimension,
        )?
        .with_max_documents(self.config.limits.max_documents_per_user);

        if let Some(ocr) = self.ocr() {
            pipeline = pipeline.with_ocr(ocr);
        }
        Ok(pipeline)
    }

    pub fn agent(&self) -> anyhow::Result<RagAgent> {
        Ok(RagAgent::new(
            Arc::clone(&self.store),
            self.embedder()?,
            self.llm()?,
            RagConfig::from(&self.config.vector),
        ))
    }

    pub async fn quota(&self) -> anyhow::Result<DailyQuota> {
        let counters: Arc<dyn CounterStore> = match &self.config.store.redis_url {
            Some(url) => Arc::new(RedisCounterStore::connect(url).await?),
            None => {
                tracing::warn!("REDIS_URL not set, usage shown is for this process only");
                Arc::new(MemoryCounterStore::new())
            }
        };
        Ok(DailyQuota::new(counters, QuotaLimits::from(&self.config.limits)))
    }
}
