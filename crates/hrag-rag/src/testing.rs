//! Extraction test doubles
//!
//! Fixtures are plain text files standing in for PDFs; a form feed marks a
//! page break the way pdf-extract output does.

use std::path::Path;

use hrag_ocr::{DocumentOcr, OcrError, OcrResult};
use hrag_parser::{DocumentParser, FileType, ParsedDocument, ParserError};

/// Parser that reads the file as UTF-8 text
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn parse(&self, path: &Path) -> hrag_parser::Result<ParsedDocument> {
        let raw = std::fs::read_to_string(path).map_err(|e| ParserError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        let pages = raw.split('\x0C').map(str::to_string).collect();
        Ok(ParsedDocument::new(path.display().to_string(), FileType::Pdf).with_pages(pages))
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Pdf]
    }
}

/// OCR stub returning the same text for every document
#[derive(Debug, Clone)]
pub struct StaticOcr {
    text: String,
}

impl StaticOcr {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl DocumentOcr for StaticOcr {
    fn recognize(&self, _pdf_path: &Path) -> hrag_ocr::Result<Vec<OcrResult>> {
        if self.text.is_empty() {
            return Err(OcrError::ExecutionFailed("no text".to_string()));
        }
        Ok(vec![OcrResult::new(self.text.clone()).with_page(1)])
    }

    fn name(&self) -> &str {
        "static"
    }
}
