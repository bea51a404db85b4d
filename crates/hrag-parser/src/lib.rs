//! hrag Parser - Text extraction and chunking for uploaded reports
//!
//! Parsing produces a `ParsedDocument` holding per-page text; the
//! `RecursiveSplitter` then cuts the assembled text into the chunks that
//! are embedded and indexed.

use std::path::Path;
use thiserror::Error;

pub mod pdf;
pub mod splitter;

pub use pdf::PdfParser;
pub use splitter::{RecursiveSplitter, SplitterConfig, TextChunk};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during document parsing
#[derive(Error, Debug)]
pub enum ParserError {
    /// File format is not supported
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// IO error while reading the file
    #[error("IO error reading file: {path}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// PDF parsing error
    #[error("PDF parsing error: {0}")]
    PdfError(String),

    /// File is encrypted and cannot be parsed
    #[error("File is encrypted and requires a password: {0}")]
    EncryptedFile(String),

    /// Splitter settings are unusable
    #[error("Invalid chunking configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ParserError>;

// ============================================================================
// Parsed Document Types
// ============================================================================

/// Separator placed between pages when assembling the document text
pub const PAGE_SEPARATOR: &str = "\n\n";

/// A parsed document with per-page text
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// Original file path
    pub file_path: String,

    /// Detected file type
    pub file_type: FileType,

    /// Text of each page, in order
    pub pages: Vec<String>,

    /// Metadata extracted from the document
    pub metadata: DocumentParseMetadata,
}

impl ParsedDocument {
    /// Create a new parsed document
    pub fn new(file_path: impl Into<String>, file_type: FileType) -> Self {
        Self {
            file_path: file_path.into(),
            file_type,
            pages: Vec::new(),
            metadata: DocumentParseMetadata::default(),
        }
    }

    /// Set page texts
    pub fn with_pages(mut self, pages: Vec<String>) -> Self {
        self.metadata.page_count = Some(pages.len() as u32);
        self.pages = pages;
        self
    }

    /// Page texts joined with blank lines, skipping empty pages
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(PAGE_SEPARATOR)
    }

    /// Number of meaningful characters (whitespace excluded at the edges)
    pub fn char_count(&self) -> usize {
        self.full_text().trim().chars().count()
    }

    /// Get total word count (approximate)
    pub fn word_count(&self) -> usize {
        self.pages.iter().map(|p| p.split_whitespace().count()).sum()
    }
}

/// Supported file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Pdf,
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from path
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    /// Get MIME type
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Unknown => "application/octet-stream",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Metadata extracted during parsing
#[derive(Debug, Clone, Default)]
pub struct DocumentParseMetadata {
    /// Document title
    pub title: Option<String>,

    /// Number of pages
    pub page_count: Option<u32>,

    /// Whether OCR was used
    pub ocr_applied: bool,
}

// ============================================================================
// Parser Trait
// ============================================================================

/// Trait for document parsers
pub trait DocumentParser: Send + Sync {
    /// Parse a document from a file path
    fn parse(&self, path: &Path) -> Result<ParsedDocument>;

    /// Get supported file types
    fn supported_types(&self) -> &[FileType];

    /// Check if this parser can handle a file type
    fn can_parse(&self, file_type: FileType) -> bool {
        self.supported_types().contains(&file_type)
    }
}

/// Reduce an uploaded filename to its final path component.
///
/// Returns `None` when nothing usable is left (empty, `.` or `..`).
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .replace('\0', "");

    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name)
}

// ============================================================================
// Tests
// ============================================================================
