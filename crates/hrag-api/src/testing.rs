//! In-process backends for router tests

use std::sync::Arc;

use axum::Router;
use hrag_core::config::AppConfig;
use hrag_core::testing::ScriptedLlm;
use hrag_quota::MemoryCounterStore;
use hrag_rag::testing::PlainTextParser;
use hrag_vector::testing::{HashEmbedding, MemoryVectorStore};

use crate::create_router;
use crate::state::{AppState, Backends};

/// Answer returned by the scripted LLM
pub const TEST_ANSWER: &str = "Your LDL cholesterol is above the reference range.";

/// Admin key configured for tests
pub const TEST_ADMIN_KEY: &str = "test-admin-key";

/// Configuration with small vectors and a known admin key
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.vector.dimension = 64;
    config.admin.key = Some(TEST_ADMIN_KEY.to_string());
    config.ingest.temp_dir = std::env::temp_dir().join("hrag-api-tests");
    config
}

/// State over in-memory store, hashing embedder and scripted LLM.
///
/// Uploaded "PDFs" are read as plain UTF-8 text.
pub fn test_state(config: AppConfig) -> Arc<AppState> {
    test_state_with_llm(config, ScriptedLlm::new(TEST_ANSWER))
}

pub fn test_state_with_llm(config: AppConfig, llm: ScriptedLlm) -> Arc<AppState> {
    build_state(config, Arc::new(MemoryVectorStore::new()), llm)
}

/// State over a store the caller keeps a handle to
pub fn test_state_with_store(config: AppConfig, store: Arc<MemoryVectorStore>) -> Arc<AppState> {
    build_state(config, store, ScriptedLlm::new(TEST_ANSWER))
}

fn build_state(config: AppConfig, store: Arc<MemoryVectorStore>, llm: ScriptedLlm) -> Arc<AppState> {
    let backends = Backends {
        store,
        embedder: Arc::new(HashEmbedding::new(config.vector.dimension)),
        llm: Arc::new(llm),
        parser: Arc::new(PlainTextParser),
        ocr: None,
        counters: Arc::new(MemoryCounterStore::new()),
    };
    Arc::new(AppState::new(config, backends).expect("test state"))
}

/// Router over fresh in-memory backends
pub fn create_router_for_testing() -> Router {
    create_router(test_state(test_config()))
}
