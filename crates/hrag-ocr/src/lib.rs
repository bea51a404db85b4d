//! hrag OCR - Optical Character Recognition fallback
//!
//! Scanned reports carry no text layer, so they are rasterised with
//! `pdftoppm` and each page image is run through the Tesseract CLI.
//! Both tools are external; nothing here implements recognition itself.
//!
//! Author: hephaex@gmail.com

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR engine not available: {0}")]
    EngineNotAvailable(String),

    #[error("PDF rasterisation failed: {0}")]
    RasterizeFailed(String),

    #[error("OCR execution failed: {0}")]
    ExecutionFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OcrError>;

/// OCR result for a single page
#[derive(Debug, Clone)]
pub struct OcrResult {
    /// Extracted text content
    pub text: String,
    /// Page number (1-based)
    pub page: u32,
    /// Language pack used
    pub language: Option<String>,
}

impl OcrResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            page: 1,
            language: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Trait for OCR engines working on single images
pub trait OcrEngine: Send + Sync {
    /// Extract text from an image file
    fn extract_text(&self, image_path: &Path) -> Result<OcrResult>;

    /// Extract text from page images, numbering results in order
    fn extract_text_batch(&self, image_paths: &[PathBuf]) -> Result<Vec<OcrResult>> {
        image_paths
            .iter()
            .enumerate()
            .map(|(i, path)| {
                let mut result = self.extract_text(path)?;
                result.page = (i + 1) as u32;
                Ok(result)
            })
            .collect()
    }

    /// Check if the engine is available on the system
    fn is_available(&self) -> bool;

    fn name(&self) -> &str;
}

/// OCR over a whole PDF document
pub trait DocumentOcr: Send + Sync {
    /// Recognise every page of a PDF
    fn recognize(&self, pdf_path: &Path) -> Result<Vec<OcrResult>>;

    fn name(&self) -> &str;
}

// ============================================================================
// Tesseract OCR Engine
// ============================================================================

/// Tesseract OCR engine configuration
#[derive(Debug, Clone)]
pub struct TesseractConfig {
    /// Language code(s), e.g. "eng" or "eng+kor"
    pub language: String,
    /// Page segmentation mode (PSM)
    pub psm: Option<u8>,
    /// OCR engine mode (OEM)
    pub oem: Option<u8>,
    /// Path to tesseract executable
    pub executable_path: Option<String>,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            psm: None,
            oem: None,
            executable_path: None,
        }
    }
}

impl TesseractConfig {
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_psm(mut self, psm: u8) -> Self {
        self.psm = Some(psm);
        self
    }

    pub fn with_oem(mut self, oem: u8) -> Self {
        self.oem = Some(oem);
        self
    }

    pub fn with_executable(mut self, path: impl Into<String>) -> Self {
        self.executable_path = Some(path.into());
        self
    }
}

/// Tesseract CLI wrapper
pub struct TesseractEngine {
    config: TesseractConfig,
}

impl TesseractEngine {
    pub fn new() -> Self {
        Self {
            config: TesseractConfig::default(),
        }
    }

    pub fn with_config(config: TesseractConfig) -> Self {
        Self { config }
    }

    fn executable(&self) -> &str {
        self.config
            .executable_path
            .as_deref()
            .unwrap_or("tesseract")
    }

    fn build_args(&self, image_path: &Path) -> Vec<String> {
        let mut args = vec![
            image_path.display().to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.config.language.clone(),
        ];

        if let Some(psm) = self.config.psm {
            args.push("--psm".to_string());
            args.push(psm.to_string());
        }

        if let Some(oem) = self.config.oem {
            args.push("--oem".to_string());
            args.push(oem.to_string());
        }

        args
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrEngine for TesseractEngine {
    fn extract_text(&self, image_path: &Path) -> Result<OcrResult> {
        let output = Command::new(self.executable())
            .args(self.build_args(image_path))
            .output()
            .map_err(|e| OcrError::EngineNotAvailable(format!("{}: {e}", self.executable())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::ExecutionFailed(format!(
                "Tesseract failed: {stderr}"
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(OcrResult::new(text).with_language(self.config.language.clone()))
    }

    fn is_available(&self) -> bool {
        Command::new(self.executable())
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

// ============================================================================
// PDF Rasterizer
// ============================================================================

/// Renders PDF pages to PNG images with poppler's `pdftoppm`
#[derive(Debug, Clone)]
pub struct PdfRasterizer {
    /// Render resolution
    pub dpi: u32,
    /// Path to pdftoppm executable
    pub executable_path: Option<String>,
}

impl Default for PdfRasterizer {
    fn default() -> Self {
        Self {
            dpi: 300,
            executable_path: None,
        }
    }
}

impl PdfRasterizer {
    pub fn new(dpi: u32) -> Self {
        Self {
            dpi,
            ..Default::default()
        }
    }

    fn executable(&self) -> &str {
        self.executable_path.as_deref().unwrap_or("pdftoppm")
    }

    fn build_args(&self, pdf_path: &Path, prefix: &Path) -> Vec<String> {
        vec![
            "-r".to_string(),
            self.dpi.to_string(),
            "-png".to_string(),
            pdf_path.display().to_string(),
            prefix.display().to_string(),
        ]
    }

    pub fn is_available(&self) -> bool {
        Command::new(self.executable())
            .arg("-v")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Render every page into `out_dir`, returning images in page order
    pub fn rasterize(&self, pdf_path: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let prefix = out_dir.join("page");
        let output = Command::new(self.executable())
            .args(self.build_args(pdf_path, &prefix))
            .output()
            .map_err(|e| OcrError::EngineNotAvailable(format!("{}: {e}", self.executable())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::RasterizeFailed(stderr.trim().to_string()));
        }

        let mut pages: Vec<(u32, PathBuf)> = std::fs::read_dir(out_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("png"))
            .filter_map(|p| page_number(&p).map(|n| (n, p)))
            .collect();
        pages.sort_by_key(|(n, _)| *n);

        if pages.is_empty() {
            return Err(OcrError::RasterizeFailed(format!(
                "no pages rendered from {}",
                pdf_path.display()
            )));
        }

        Ok(pages.into_iter().map(|(_, p)| p).collect())
    }
}

/// Page number from a `pdftoppm` output name such as `page-07.png`
fn page_number(path: &Path) -> Option<u32> {
    path.file_stem()?
        .to_str()?
        .rsplit('-')
        .next()?
        .parse()
        .ok()
}

// ============================================================================
// Whole-document OCR
// ============================================================================

/// Rasterise a PDF and OCR each page
pub struct PdfOcr {
    rasterizer: PdfRasterizer,
    engine: Arc<dyn OcrEngine>,
}

impl PdfOcr {
    pub fn new(rasterizer: PdfRasterizer, engine: Arc<dyn OcrEngine>) -> Self {
        Self { rasterizer, engine }
    }
}

impl DocumentOcr for PdfOcr {
    fn recognize(&self, pdf_path: &Path) -> Result<Vec<OcrResult>> {
        // Page images live only as long as this call
        let scratch = tempfile::tempdir()?;
        let images = self.rasterizer.rasterize(pdf_path, scratch.path())?;
        debug!(pages = images.len(), engine = self.engine.name(), "Running OCR");

        self.engine.extract_text_batch(&images)
    }

    fn name(&self) -> &str {
        self.engine.name()
    }
}

// ============================================================================
// OCR Manager
// ============================================================================

/// Registry of usable OCR engines
pub struct OcrManager {
    engines: Vec<Arc<dyn OcrEngine>>,
}

impl OcrManager {
    /// Empty manager; engines are registered explicitly
    pub fn empty() -> Self {
        Self {
            engines: Vec::new(),
        }
    }

    /// Check for Tesseract with the given configuration and register it if present
    pub fn detect(config: TesseractConfig) -> Self {
        let mut manager = Self::empty();
        let tesseract = TesseractEngine::with_config(config);
        if tesseract.is_available() {
            manager.register(tesseract);
        } else {
            info!("Tesseract not found, OCR fallback disabled");
        }
        manager
    }

    pub fn register<E: OcrEngine + 'static>(&mut self, engine: E) {
        self.engines.push(Arc::new(engine));
    }

    pub fn is_available(&self) -> bool {
        !self.engines.is_empty()
    }

    pub fn available_engines(&self) -> Vec<&str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    /// Build the PDF fallback from the first engine, if the rasteriser exists too
    pub fn pdf_ocr(&self, rasterizer: PdfRasterizer) -> Option<PdfOcr> {
        let engine = self.engines.first()?.clone();
        if !rasterizer.is_available() {
            info!("pdftoppm not found, OCR fallback disabled");
            return None;
        }
        Some(PdfOcr::new(rasterizer, engine))
    }
}

impl Default for OcrManager {
    fn default() -> Self {
        Self::detect(TesseractConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
