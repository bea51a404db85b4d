//! hrag Configuration Management
//!
//! Handles configuration from environment variables and TOML files
//! with defaults suitable for local development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Vector database connection
    pub vector: VectorConfig,

    /// LLM and embedding provider configuration
    pub llm: LlmConfig,

    /// Document ingestion settings
    pub ingest: IngestConfig,

    /// Daily per-user limits
    pub limits: LimitsConfig,

    /// Admin operations
    pub admin: AdminConfig,

    /// Counter store connection
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_override()
    }

    /// Merge with environment variables (env takes precedence).
    ///
    /// Every variable that is set replaces the value from the file.
    pub fn with_env_override(self) -> Result<Self, ConfigError> {
        let mut config = self;

        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("API_PORT") {
            config.server.port = parse_var("API_PORT", port)?;
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            config.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Qdrant
        if let Ok(url) = std::env::var("QDRANT_URL") {
            config.vector.qdrant_url = url;
        }
        if let Ok(key) = std::env::var("QDRANT_API_KEY") {
            config.vector.qdrant_api_key = Some(key);
        }
        if let Ok(name) = std::env::var("PINECONE_INDEX_NAME") {
            config.vector.collection = name;
        }
        if let Ok(name) = std::env::var("QDRANT_COLLECTION") {
            config.vector.collection = name;
        }
        if let Ok(dim) = std::env::var("VECTOR_DIMENSION") {
            config.vector.dimension = parse_var("VECTOR_DIMENSION", dim)?;
        }

        // LLM
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider.parse()?;
        }
        if let Ok(provider) = std::env::var("EMBEDDING_PROVIDER") {
            config.llm.embedding_provider = provider.parse()?;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.llm.openai_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            config.llm.google_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            config.llm.ollama_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            config.llm.model = model;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }

        // Ingestion
        if let Ok(dir) = std::env::var("TEMP_DIR") {
            config.ingest.temp_dir = PathBuf::from(dir);
        }
        if let Ok(enabled) = std::env::var("OCR_ENABLED") {
            config.ingest.ocr_enabled = parse_bool("OCR_ENABLED", &enabled)?;
        }
        if let Ok(lang) = std::env::var("OCR_LANGUAGE") {
            config.ingest.ocr_language = lang;
        }
        if let Ok(size) = std::env::var("CHUNK_SIZE") {
            config.ingest.chunk_size = parse_var("CHUNK_SIZE", size)?;
        }
        if let Ok(overlap) = std::env::var("CHUNK_OVERLAP") {
            config.ingest.chunk_overlap = parse_var("CHUNK_OVERLAP", overlap)?;
        }

        // Limits
        if let Ok(limit) = std::env::var("PDF_DAILY_LIMIT") {
            config.limits.uploads_per_day = parse_var("PDF_DAILY_LIMIT", limit)?;
        }
        if let Ok(limit) = std::env::var("QUERY_DAILY_LIMIT") {
            config.limits.queries_per_day = parse_var("QUERY_DAILY_LIMIT", limit)?;
        }
        if let Ok(limit) = std::env::var("MAX_DOCUMENTS_PER_USER") {
            config.limits.max_documents_per_user = parse_var("MAX_DOCUMENTS_PER_USER", limit)?;
        }
        if let Ok(limit) = std::env::var("HISTORY_PER_DOCUMENT") {
            config.limits.history_per_document = parse_var("HISTORY_PER_DOCUMENT", limit)?;
        }

        // Admin
        if let Ok(key) = std::env::var("ADMIN") {
            if !key.is_empty() {
                config.admin.key = Some(key);
            }
        }

        // Redis
        if let Ok(url) = std::env::var("REDIS_URL") {
            if !url.is_empty() {
                config.store.redis_url = Some(url);
            }
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.logging.json_format = format.eq_ignore_ascii_case("json");
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ingest.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ingest.chunk_size".to_string(),
                value: "0".to_string(),
            });
        }
        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return Err(ConfigError::InvalidValue {
                key: "ingest.chunk_overlap".to_string(),
                value: format!(
                    "{} (must be smaller than chunk_size {})",
                    self.ingest.chunk_overlap, self.ingest.chunk_size
                ),
            });
        }
        if self.vector.dimension == 0 {
            return Err(ConfigError::InvalidValue {
                key: "vector.dimension".to_string(),
                value: "0".to_string(),
            });
        }
        if self.limits.uploads_per_day == 0 || self.limits.queries_per_day == 0 {
            return Err(ConfigError::InvalidValue {
                key: "limits".to_string(),
                value: "daily limits must be positive".to_string(),
            });
        }
        if self.limits.max_documents_per_user == 0 {
            return Err(ConfigError::InvalidValue {
                key: "limits.max_documents_per_user".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Maximum request body size in bytes (upload limit)
    pub max_body_size: usize,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_body_size: 20 * 1024 * 1024, // 20MB
            // Empty by default - set via CORS_ORIGINS env var
            cors_origins: vec![],
        }
    }
}

/// Vector database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Qdrant gRPC URL
    pub qdrant_url: String,

    /// Qdrant API key (cloud deployments)
    pub qdrant_api_key: Option<String>,

    /// Collection holding every user's chunks
    pub collection: String,

    /// Vector dimension (must match embedding model)
    pub dimension: usize,

    /// Number of chunks returned per query
    pub top_k: usize,

    /// Upper bound when reading a whole namespace
    pub max_namespace_chunks: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            qdrant_url: "http://localhost:6334".to_string(),
            qdrant_api_key: None,
            collection: "rag-index".to_string(),
            dimension: 384, // all-MiniLM-L6-v2
            top_k: 5,
            max_namespace_chunks: 5000,
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider used for answer generation
    pub provider: LlmProvider,

    /// Provider used for embeddings
    pub embedding_provider: EmbeddingProvider,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL; any OpenAI-compatible endpoint works
    pub openai_base_url: Option<String>,

    /// Google Generative Language API key
    pub google_api_key: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Model name to use
    pub model: String,

    /// Embedding model name
    pub embedding_model: String,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Gemini,
            embedding_provider: EmbeddingProvider::Ollama,
            openai_api_key: None,
            openai_base_url: None,
            google_api_key: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "gemini-2.0-flash".to_string(),
            embedding_model: "all-minilm".to_string(),
            max_tokens: 1024,
            temperature: 0.2,
            timeout_secs: 60,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
    Gemini,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "gemini" | "google" => Ok(Self::Gemini),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Supported embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    OpenAI,
    Ollama,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ConfigError::InvalidValue {
                key: "EMBEDDING_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Document ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Where uploads are staged while being processed
    pub temp_dir: PathBuf,

    /// Chunk size in characters
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,

    /// Extracted text shorter than this is treated as an image-only PDF
    pub min_text_chars: usize,

    /// Texts per embedding request
    pub embed_batch_size: usize,

    /// Fall back to OCR for image-only PDFs
    pub ocr_enabled: bool,

    /// Tesseract language codes
    pub ocr_language: String,

    /// Rasterisation resolution for OCR
    pub ocr_dpi: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir().join("hrag-uploads"),
            chunk_size: 150,
            chunk_overlap: 20,
            min_text_chars: 50,
            embed_batch_size: 64,
            ocr_enabled: false,
            ocr_language: "eng".to_string(),
            ocr_dpi: 300,
        }
    }
}

/// Per-user limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// PDF uploads allowed per UTC day
    pub uploads_per_day: u32,

    /// Queries allowed per UTC day
    pub queries_per_day: u32,

    /// Distinct documents a user may keep indexed
    pub max_documents_per_user: usize,

    /// Query history entries kept per document
    pub history_per_document: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            uploads_per_day: 2,
            queries_per_day: 10,
            max_documents_per_user: 10,
            history_per_document: 50,
        }
    }
}

/// Admin operation configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AdminConfig {
    /// Shared admin key; admin endpoints refuse every request when unset
    pub key: Option<String>,
}

/// Counter store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// Redis URL; an in-process store is used when unset
    pub redis_url: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for hrag and tower_http targets when RUST_LOG is unset
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.vector.collection, "rag-index");
        assert_eq!(config.vector.dimension, 384);
        assert_eq!(config.vector.top_k, 5);
        assert_eq!(config.ingest.chunk_size, 150);
        assert_eq!(config.ingest.chunk_overlap, 20);
        assert_eq!(config.limits.uploads_per_day, 2);
        assert_eq!(config.limits.queries_per_day, 10);
        assert!(config.admin.key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_llm_provider_parse() {
        assert_eq!(
            "openai".parse::<LlmProvider>().unwrap(),
            LlmProvider::OpenAI
        );
        assert_eq!(
            "Google".parse::<LlmProvider>().unwrap(),
            LlmProvider::Gemini
        );
        assert_eq!(
            "ollama".parse::<EmbeddingProvider>().unwrap(),
            EmbeddingProvider::Ollama
        );
        assert!("invalid".parse::<LlmProvider>().is_err());
        assert!("gemini".parse::<EmbeddingProvider>().is_err());
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let mut config = AppConfig::default();
        config.ingest.chunk_overlap = config.ingest.chunk_size;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.vector.dimension = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.limits.queries_per_day = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("OCR_ENABLED", "TRUE").unwrap());
        assert!(!parse_bool("OCR_ENABLED", "off").unwrap());
        assert!(parse_bool("OCR_ENABLED", "maybe").is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hrag.toml");
        std::fs::write(&path, "[server]\nport = 9000\n").unwrap();

        std::env::set_var("PDF_DAILY_LIMIT", "5");
        std::env::set_var("OCR_ENABLED", "true");
        let config = AppConfig::from_file(&path).and_then(AppConfig::with_env_override);
        std::env::remove_var("PDF_DAILY_LIMIT");
        std::env::remove_var("OCR_ENABLED");

        let config = config.unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.limits.uploads_per_day, 5);
        assert!(config.ingest.ocr_enabled);
        assert_eq!(config.limits.queries_per_day, 10);
    }

    #[test]
    fn test_from_toml_partial() {
        let config: AppConfig = toml::from_str(
            r#"
            [limits]
            queries_per_day = 25

            [vector]
            collection = "reports"
            "#,
        )
        .unwrap();

        assert_eq!(config.limits.queries_per_day, 25);
        assert_eq!(config.limits.uploads_per_day, 2);
        assert_eq!(config.vector.collection, "reports");
        assert_eq!(config.vector.dimension, 384);
    }
}
