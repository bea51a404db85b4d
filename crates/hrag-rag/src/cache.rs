//! Embedding cache for query vectors
//!
//! Query embeddings are kept in a moka cache keyed by model and text.
//! Chunk embeddings at ingestion time bypass the cache.
//!
//! Author: hephaex@gmail.com

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hrag_core::Result;
use hrag_vector::EmbeddingClient;
use moka::future::Cache;
use serde::Serialize;

/// Cache sizing
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached vectors
    pub max_capacity: u64,

    /// Time-to-live of an entry (in seconds)
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            // 384 floats per entry, ~15MB at capacity
            max_capacity: 10_000,
            ttl_seconds: 3600,
        }
    }
}

/// Cache for embedding vectors
#[derive(Clone)]
pub struct EmbeddingCache {
    cache: Cache<CacheKey, Arc<Vec<f32>>>,
    stats: Arc<CacheStats>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::with_config(&CacheConfig::default())
    }

    pub fn with_config(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(Duration::from_secs(config.ttl_seconds))
            .build();

        Self {
            cache,
            stats: Arc::new(CacheStats::default()),
        }
    }

    pub async fn get(&self, model: &str, text: &str) -> Option<Arc<Vec<f32>>> {
        let result = self.cache.get(&cache_key(model, text)).await;
        if result.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    pub async fn put(&self, model: &str, text: &str, embedding: Vec<f32>) {
        self.cache
            .insert(cache_key(model, text), Arc::new(embedding))
            .await;
    }

    /// Return the cached vector or compute and remember it
    pub async fn get_or_embed(
        &self,
        embedder: &dyn EmbeddingClient,
        text: &str,
    ) -> Result<Arc<Vec<f32>>> {
        if let Some(hit) = self.get(embedder.model(), text).await {
            return Ok(hit);
        }

        let vector = Arc::new(embedder.embed(text).await?);
        self.cache
            .insert(cache_key(embedder.model(), text), Arc::clone(&vector))
            .await;
        Ok(vector)
    }

    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        self.stats.reset();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn stats(&self) -> CacheStatsReport {
        self.stats.report()
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Model name and trimmed query text, compared in full
type CacheKey = (String, String);

fn cache_key(model: &str, text: &str) -> CacheKey {
    (model.to_string(), text.trim().to_string())
}

// ============================================================================
// Cache Statistics
// ============================================================================

#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    fn report(&self) -> CacheStatsReport {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStatsReport {
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}

/// Snapshot of cache effectiveness
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsReport {
    pub hits: u64,
    pub misses: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}
