//! PDF document parser using pdf-extract
//!
//! Extracts text from text-based PDFs page by page. Scanned PDFs yield
//! little or no text here; the ingestion pipeline falls back to OCR for
//! those.

use std::path::Path;

use crate::{DocumentParser, FileType, ParsedDocument, ParserError, Result};

/// PDF document parser
pub struct PdfParser {
    /// Drop pages whose text is only whitespace
    pub skip_blank_pages: bool,
}

impl PdfParser {
    /// Create a new PDF parser with default settings
    pub fn new() -> Self {
        Self {
            skip_blank_pages: true,
        }
    }

    /// Keep or drop blank pages
    pub fn with_blank_pages(mut self, keep: bool) -> Self {
        self.skip_blank_pages = !keep;
        self
    }

    /// Extract text from in-memory PDF bytes
    pub fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>> {
        let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
            let message = e.to_string();
            if message.to_lowercase().contains("encrypt") {
                ParserError::EncryptedFile(message)
            } else {
                ParserError::PdfError(message)
            }
        })?;

        Ok(self.split_pages(&text))
    }

    /// Split extracted text on form feeds (page breaks)
    fn split_pages(&self, text: &str) -> Vec<String> {
        text.split('\x0C')
            .map(|page| page.trim().to_string())
            .filter(|page| !(self.skip_blank_pages && page.is_empty()))
            .collect()
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for PdfParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let file_type = FileType::from_path(path);
        if !self.can_parse(file_type) {
            return Err(ParserError::UnsupportedFormat(file_type.to_string()));
        }

        let bytes = std::fs::read(path).map_err(|e| ParserError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        let pages = self.extract_pages(&bytes)?;
        let mut doc = ParsedDocument::new(path.display().to_string(), FileType::Pdf).with_pages(pages);

        // First short line of the first page doubles as the title
        if let Some(first_line) = doc.pages.first().and_then(|p| p.lines().next()) {
            let trimmed = first_line.trim();
            if !trimmed.is_empty() && trimmed.len() < 200 {
                doc.metadata.title = Some(trimmed.to_string());
            }
        }

        Ok(doc)
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Pdf]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_parser_creation() {
        let parser = PdfParser::new();
        assert!(parser.skip_blank_pages);

        let parser = parser.with_blank_pages(true);
        assert!(!parser.skip_blank_pages);
    }

    #[test]
    fn test_split_pages_on_form_feed() {
        let parser = PdfParser::new();
        let pages = parser.split_pages("Hemoglobin 13.5\n\x0C\n\x0CGlucose 90 mg/dL\n");
        assert_eq!(pages, vec!["Hemoglobin 13.5", "Glucose 90 mg/dL"]);

        let parser = PdfParser::new().with_blank_pages(true);
        let pages = parser.split_pages("a\x0C \x0Cb");
        assert_eq!(pages.len(), 3);
    }

    #[test]
    fn test_supported_types() {
        let parser = PdfParser::new();
        assert!(parser.can_parse(FileType::Pdf));
        assert!(!parser.can_parse(FileType::Unknown));
    }

    #[test]
    fn test_rejects_non_pdf_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "plain text").unwrap();

        let err = PdfParser::new().parse(&path).unwrap_err();
        assert!(matches!(err, ParserError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PdfParser::new()
            .parse(&dir.path().join("missing.pdf"))
            .unwrap_err();
        assert!(matches!(err, ParserError::IoError { .. }));
    }

    #[test]
    fn test_garbage_bytes_are_pdf_error() {
        let err = PdfParser::new()
            .extract_pages(b"definitely not a pdf")
            .unwrap_err();
        assert!(matches!(
            err,
            ParserError::PdfError(_) | ParserError::EncryptedFile(_)
        ));
    }
}
