//! Report ingestion pipeline
//!
//! Upload → text extraction (OCR fallback for scans) → chunking →
//! embedding → namespaced upsert. A re-uploaded filename replaces the
//! chunks it had before.
//!
//! Author: hephaex@gmail.com

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use hrag_core::{ChunkRecord, HragError, IngestConfig, Namespace, Result};
use hrag_ocr::DocumentOcr;
use hrag_parser::{
    sanitize_filename, DocumentParser, FileType, RecursiveSplitter, SplitterConfig, PAGE_SEPARATOR,
};
use hrag_vector::{check_dimensions, EmbeddingClient, VectorStore};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Rejection message for anything that is not a PDF
pub const INVALID_FILE_TYPE: &str = "Invalid file type. Only PDF allowed..";

/// Rejection message for documents without usable text
pub const EMPTY_DOCUMENT: &str = "PDF appears empty or image-based";

/// Validate an uploaded filename, returning its sanitized form
pub fn pdf_filename(raw: Option<&str>) -> Result<String> {
    let name = raw
        .and_then(sanitize_filename)
        .ok_or_else(|| HragError::ValidationError(INVALID_FILE_TYPE.to_string()))?;

    if FileType::from_path(Path::new(&name)) != FileType::Pdf {
        return Err(HragError::ValidationError(INVALID_FILE_TYPE.to_string()));
    }
    Ok(name)
}

// ============================================================================
// Temp uploads
// ============================================================================

/// An uploaded file parked on disk while it is processed.
///
/// The file is removed when the guard is dropped, whether ingestion
/// succeeded, failed or the request was cancelled.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
}

impl TempUpload {
    /// Write `bytes` to `{dir}/{user}_{uuid}_{filename}`
    pub async fn write(
        dir: &Path,
        namespace: &Namespace,
        filename: &str,
        bytes: &[u8],
    ) -> Result<Self> {
        let filename = sanitize_filename(filename)
            .ok_or_else(|| HragError::ValidationError(INVALID_FILE_TYPE.to_string()))?;

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| HragError::Other(anyhow_io("create temp dir", e)))?;

        let path = dir.join(format!("{namespace}_{}_{filename}", Uuid::new_v4().simple()));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| HragError::Other(anyhow_io("write upload", e)))?;

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed temp upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove temp upload"),
        }
    }
}

fn anyhow_io(action: &str, e: std::io::Error) -> anyhow::Error {
    anyhow::Error::new(e).context(format!("Failed to {action}"))
}

// ============================================================================
// Pipeline
// ============================================================================

/// Outcome of one ingested document
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub filename: String,
    pub pages: usize,
    pub characters: usize,
    pub chunk_count: usize,
    pub ocr_applied: bool,
    /// Chunks of an earlier upload with the same filename that were replaced
    pub replaced_chunks: u64,
    pub processing_time_ms: u64,
}

/// Extracted text before chunking
struct ExtractedText {
    text: String,
    pages: usize,
    ocr_applied: bool,
}

/// Turns uploaded PDFs into namespaced chunk vectors
pub struct IngestPipeline {
    parser: Arc<dyn DocumentParser>,
    ocr: Option<Arc<dyn DocumentOcr>>,
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    splitter: RecursiveSplitter,
    min_text_chars: usize,
    embed_batch_size: usize,
    max_documents: usize,
    dimension: usize,
}

impl IngestPipeline {
    pub fn new(
        parser: Arc<dyn DocumentParser>,
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        config: &IngestConfig,
        dimension: usize,
    ) -> Result<Self> {
        let splitter =
            RecursiveSplitter::new(SplitterConfig::new(config.chunk_size, config.chunk_overlap))
                .map_err(|e| HragError::ConfigError(e.to_string()))?;

        Ok(Self {
            parser,
            ocr: None,
            embedder,
            store,
            splitter,
            min_text_chars: config.min_text_chars,
            embed_batch_size: config.embed_batch_size.max(1),
            max_documents: usize::MAX,
            dimension,
        })
    }

    /// Enable the OCR fallback for scanned documents
    pub fn with_ocr(mut self, ocr: Arc<dyn DocumentOcr>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    /// Cap the number of distinct documents a user may hold
    pub fn with_max_documents(mut self, max: usize) -> Self {
        self.max_documents = max;
        self
    }

    pub fn ocr_enabled(&self) -> bool {
        self.ocr.is_some()
    }

    /// Ingest one PDF into the user's namespace
    pub async fn ingest(
        &self,
        namespace: &Namespace,
        path: &Path,
        filename: &str,
    ) -> Result<IngestReport> {
        let start = Instant::now();

        self.store.ensure_index().await?;
        self.check_capacity(namespace, filename).await?;

        let extracted = self.extract(path).await?;
        let characters = extracted.text.chars().count();

        let splitter = self.splitter.clone();
        let text = extracted.text;
        let chunks = tokio::task::spawn_blocking(move || splitter.split_with_offsets(&text))
            .await
            .map_err(|e| HragError::ExtractionError(format!("Chunking task failed: {e}")))?;
        if chunks.is_empty() {
            return Err(HragError::ValidationError(EMPTY_DOCUMENT.to_string()));
        }
        debug!(user = %namespace, filename, chunks = chunks.len(), "Document chunked");

        let mut records = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.embed_batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;

            if vectors.len() != texts.len() {
                return Err(HragError::EmbeddingError(format!(
                    "Expected {} embeddings, got {}",
                    texts.len(),
                    vectors.len()
                )));
            }
            check_dimensions(&vectors, self.dimension)?;

            records.extend(batch.iter().zip(vectors).map(|(chunk, vector)| {
                ChunkRecord::new(
                    namespace.clone(),
                    filename,
                    chunk.index,
                    chunk.start_index,
                    chunk.content.clone(),
                    vector,
                )
            }));
        }

        let replaced_chunks = self.store.delete_document(namespace, filename).await?;
        for batch in records.chunks(self.embed_batch_size) {
            self.store.upsert(batch).await?;
        }

        let report = IngestReport {
            filename: filename.to_string(),
            pages: extracted.pages,
            characters,
            chunk_count: records.len(),
            ocr_applied: extracted.ocr_applied,
            replaced_chunks,
            processing_time_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            user = %namespace,
            filename,
            chunks = report.chunk_count,
            ocr = report.ocr_applied,
            replaced = report.replaced_chunks,
            "Document indexed"
        );
        Ok(report)
    }

    async fn check_capacity(&self, namespace: &Namespace, filename: &str) -> Result<()> {
        if self.max_documents == usize::MAX {
            return Ok(());
        }

        let documents = self.store.list_documents(namespace).await?;
        let replacing = documents.iter().any(|d| d.source == filename);
        if !replacing && documents.len() >= self.max_documents {
            return Err(HragError::DocumentLimit {
                limit: self.max_documents,
            });
        }
        Ok(())
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedText> {
        let parser = Arc::clone(&self.parser);
        let owned = path.to_path_buf();
        let parsed = tokio::task::spawn_blocking(move || parser.parse(&owned))
            .await
            .map_err(|e| HragError::ExtractionError(format!("Extraction task failed: {e}")))?;

        let (text, pages) = match parsed {
            Ok(doc) => (doc.full_text(), doc.pages.len()),
            Err(e) if self.ocr.is_some() => {
                warn!(error = %e, "Text extraction failed, trying OCR");
                (String::new(), 0)
            }
            Err(e) => return Err(HragError::ExtractionError(e.to_string())),
        };

        if meaningful_chars(&text) >= self.min_text_chars {
            return Ok(ExtractedText {
                text,
                pages,
                ocr_applied: false,
            });
        }

        if let Some(ocr) = &self.ocr {
            info!(engine = ocr.name(), "Little or no embedded text, running OCR");
            let ocr = Arc::clone(ocr);
            let owned = path.to_path_buf();
            let recognized = tokio::task::spawn_blocking(move || ocr.recognize(&owned))
                .await
                .map_err(|e| HragError::ExtractionError(format!("OCR task failed: {e}")))?;

            match recognized {
                Ok(results) => {
                    let ocr_text = results
                        .iter()
                        .map(|r| r.text.trim())
                        .filter(|t| !t.is_empty())
                        .collect::<Vec<_>>()
                        .join(PAGE_SEPARATOR);

                    if meaningful_chars(&ocr_text) >= self.min_text_chars {
                        return Ok(ExtractedText {
                            text: ocr_text,
                            pages: results.len().max(pages),
                            ocr_applied: true,
                        });
                    }
                }
                Err(e) => warn!(error = %e, "OCR failed"),
            }
        }

        Err(HragError::ValidationError(EMPTY_DOCUMENT.to_string()))
    }
}

fn meaningful_chars(text: &str) -> usize {
    text.trim().chars().count()
}

// ============================================================================
// Tests
// ============================================================================
