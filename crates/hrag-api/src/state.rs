//! Application state management
//!
//! Author: hephaex@gmail.com

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use hrag_core::config::AppConfig;
use hrag_core::LlmClient;
use hrag_ocr::{DocumentOcr, OcrManager, PdfRasterizer, TesseractConfig};
use hrag_parser::{DocumentParser, PdfParser};
use hrag_quota::{
    CounterStore, DailyQuota, MemoryCounterStore, QueryHistory, QuotaLimits, RedisCounterStore,
};
use hrag_rag::{create_llm_client, EmbeddingCache, IngestPipeline, RagAgent, RagConfig};
use hrag_vector::{create_embedding_client, EmbeddingClient, QdrantStore, VectorStore};
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;

/// Latency histogram buckets
#[derive(Debug, Default, Clone)]
pub struct LatencyBuckets {
    pub under_10ms: u64,
    pub ms_10_50: u64,
    pub ms_50_100: u64,
    pub ms_100_500: u64,
    pub ms_500_1000: u64,
    pub over_1s: u64,
}

impl LatencyBuckets {
    fn record(&mut self, latency_us: u64) {
        match latency_us / 1000 {
            0..=9 => self.under_10ms += 1,
            10..=49 => self.ms_10_50 += 1,
            50..=99 => self.ms_50_100 += 1,
            100..=499 => self.ms_100_500 += 1,
            500..=999 => self.ms_500_1000 += 1,
            _ => self.over_1s += 1,
        }
    }
}

/// Per-endpoint request statistics
#[derive(Debug, Default, Clone)]
pub struct EndpointMetrics {
    pub status_counts: HashMap<u16, u64>,
    pub latency_buckets: LatencyBuckets,
    pub total_latency_us: u64,
    pub latency_count: u64,
    pub min_latency_us: u64,
    pub max_latency_us: u64,
}

impl EndpointMetrics {
    fn record(&mut self, status: u16, latency_us: u64) {
        *self.status_counts.entry(status).or_insert(0) += 1;
        self.latency_buckets.record(latency_us);
        self.total_latency_us += latency_us;
        self.min_latency_us = if self.latency_count == 0 {
            latency_us
        } else {
            self.min_latency_us.min(latency_us)
        };
        self.max_latency_us = self.max_latency_us.max(latency_us);
        self.latency_count += 1;
    }
}

/// Pluggable backends behind the application state
pub struct Backends {
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn EmbeddingClient>,
    pub llm: Arc<dyn LlmClient>,
    pub parser: Arc<dyn DocumentParser>,
    pub ocr: Option<Arc<dyn DocumentOcr>>,
    pub counters: Arc<dyn CounterStore>,
}

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Vector index shared by every user namespace
    pub store: Arc<dyn VectorStore>,
    pub ingest: IngestPipeline,
    pub agent: RagAgent,
    /// Daily upload and query allowances
    pub quota: DailyQuota,
    /// Per-document questions, answers and descriptions
    pub history: QueryHistory,
    /// Per-endpoint metrics
    pub metrics: RwLock<HashMap<String, EndpointMetrics>>,
}

impl AppState {
    /// Create application state over explicit backends
    pub fn new(config: AppConfig, backends: Backends) -> anyhow::Result<Self> {
        let mut ingest = IngestPipeline::new(
            backends.parser,
            Arc::clone(&backends.embedder),
            Arc::clone(&backends.store),
            &config.ingest,
            config.vector.dimension,
        )?
        .with_max_documents(config.limits.max_documents_per_user);
        if let Some(ocr) = backends.ocr {
            ingest = ingest.with_ocr(ocr);
        }

        let agent = RagAgent::new(
            Arc::clone(&backends.store),
            backends.embedder,
            backends.llm,
            RagConfig::from(&config.vector),
        )
        .with_cache(EmbeddingCache::new());

        let history = QueryHistory::new(
            Arc::clone(&backends.counters),
            config.limits.history_per_document,
        );
        let quota = DailyQuota::new(backends.counters, QuotaLimits::from(&config.limits));

        Ok(Self {
            config,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            store: backends.store,
            ingest,
            agent,
            quota,
            history,
            metrics: RwLock::new(HashMap::new()),
        })
    }

    /// Connect the production backends described by `config`
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn VectorStore> = Arc::new(QdrantStore::new(&config.vector)?);
        let embedder: Arc<dyn EmbeddingClient> = Arc::from(create_embedding_client(&config.llm)?);
        let llm: Arc<dyn LlmClient> = Arc::from(create_llm_client(&config.llm)?);

        let ocr = if config.ingest.ocr_enabled {
            let manager =
                OcrManager::detect(TesseractConfig::default().with_language(&config.ingest.ocr_language));
            manager
                .pdf_ocr(PdfRasterizer::new(config.ingest.ocr_dpi))
                .map(|ocr| Arc::new(ocr) as Arc<dyn DocumentOcr>)
        } else {
            None
        };

        let counters: Arc<dyn CounterStore> = match &config.store.redis_url {
            Some(url) => Arc::new(RedisCounterStore::connect(url).await?),
            None => {
                tracing::warn!("REDIS_URL not set, daily limits are kept in process memory");
                Arc::new(MemoryCounterStore::new())
            }
        };

        if let Err(e) = store.ensure_index().await {
            tracing::warn!("Vector index not ready at startup: {e}");
        }

        tracing::info!(
            llm = llm.name(),
            embedder = embedder.model(),
            ocr = ocr.is_some(),
            counters = counters.name(),
            "Backends initialised"
        );

        Self::new(
            config,
            Backends {
                store,
                embedder,
                llm,
                parser: Arc::new(PdfParser::new()),
                ocr,
                counters,
            },
        )
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Record one finished request
    pub async fn record_request(&self, endpoint: String, status: u16, latency_us: u64) {
        self.increment_requests();
        self.metrics
            .write()
            .await
            .entry(endpoint)
            .or_default()
            .record(status, latency_us);
    }

    /// Query-embedding cache hits and misses
    pub fn get_cache_stats(&self) -> (u64, u64) {
        let stats = self.agent.cache().stats();
        (stats.hits, stats.misses)
    }

    /// Whether `candidate` equals the configured admin key.
    ///
    /// Always false when no key is configured.
    pub fn admin_key_matches(&self, candidate: &str) -> bool {
        match self.config.admin.key.as_deref() {
            Some(key) if !key.is_empty() => key.as_bytes().ct_eq(candidate.as_bytes()).into(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_metrics() {
        let mut metrics = EndpointMetrics::default();
        metrics.record(200, 5_000);
        metrics.record(200, 120_000);
        metrics.record(429, 2_000_000);

        assert_eq!(metrics.status_counts[&200], 2);
        assert_eq!(metrics.status_counts[&429], 1);
        assert_eq!(metrics.latency_count, 3);
        assert_eq!(metrics.min_latency_us, 5_000);
        assert_eq!(metrics.max_latency_us, 2_000_000);
        assert_eq!(metrics.latency_buckets.under_10ms, 1);
        assert_eq!(metrics.latency_buckets.ms_100_500, 1);
        assert_eq!(metrics.latency_buckets.over_1s, 1);
    }
}
