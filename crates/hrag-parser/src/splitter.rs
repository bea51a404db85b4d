//! Recursive character text splitter
//!
//! Splits text on the first separator of a priority list that occurs in it,
//! recursing into pieces that are still too long with the remaining
//! separators, then greedily merges small pieces back up to `chunk_size`
//! while carrying up to `chunk_overlap` characters between consecutive
//! chunks. Separators stay attached to the start of the following piece.
//!
//! All lengths are counted in characters, never bytes.

use std::collections::VecDeque;

use crate::{ParserError, Result};

/// Default separator priority: paragraphs, lines, words, characters
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Chunking settings
#[derive(Debug, Clone)]
pub struct SplitterConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,

    /// Characters carried over between consecutive chunks
    pub chunk_overlap: usize,

    /// Separators in priority order; `""` means split into characters
    pub separators: Vec<String>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 150,
            chunk_overlap: 20,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SplitterConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            ..Default::default()
        }
    }

    /// Replace the separator list
    pub fn with_separators<S: Into<String>>(mut self, separators: impl IntoIterator<Item = S>) -> Self {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }
}

/// A chunk with its position in the source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Chunk text (trimmed)
    pub content: String,

    /// Ordinal of the chunk in the document
    pub index: u32,

    /// Character offset of `content` in the source text
    pub start_index: usize,
}

/// LangChain-compatible recursive character splitter
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    config: SplitterConfig,
}

impl RecursiveSplitter {
    /// Create a splitter, rejecting unusable settings
    pub fn new(config: SplitterConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(ParserError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(ParserError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        if config.separators.is_empty() {
            return Err(ParserError::InvalidConfig(
                "at least one separator is required".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Split text into chunks
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.config.separators)
    }

    /// Split text and locate each chunk in the source.
    ///
    /// Each search starts `chunk_overlap` characters before the end of the
    /// previous chunk, and the cursor only moves by the distance between
    /// neighbouring chunks, so locating is linear in the text length.
    pub fn split_with_offsets(&self, text: &str) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        let mut cursor = CharCursor::new(text);
        let mut index = 0usize;
        let mut previous_len = 0usize;

        for (ordinal, content) in self.split(text).into_iter().enumerate() {
            let offset = (index + previous_len).saturating_sub(self.config.chunk_overlap);
            cursor.seek(offset);
            index = match cursor.find(&content) {
                Some(found) => found,
                None => {
                    cursor.seek(0);
                    let found = cursor.find(&content);
                    if found.is_none() {
                        cursor.seek(offset);
                    }
                    found.unwrap_or(offset)
                }
            };
            previous_len = char_len(&content);

            chunks.push(TextChunk {
                content,
                index: ordinal as u32,
                start_index: index,
            });
        }

        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // Pick the first separator present in the text
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut good: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.config.chunk_size {
                good.push(piece);
                continue;
            }

            if !good.is_empty() {
                final_chunks.extend(self.merge(&good));
                good.clear();
            }

            if remaining.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    final_chunks.push(trimmed.to_string());
                }
            } else {
                final_chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !good.is_empty() {
            final_chunks.extend(self.merge(&good));
        }

        final_chunks
    }

    /// Greedily merge small pieces into chunks no longer than `chunk_size`
    fn merge(&self, splits: &[&str]) -> Vec<String> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in splits {
            let len = char_len(piece);

            if total + len > size && !current.is_empty() {
                if let Some(doc) = join(&current) {
                    docs.push(doc);
                }
                // Keep at most `overlap` characters and leave room for the new piece
                while total > overlap || (total + len > size && total > 0) {
                    match current.pop_front() {
                        Some(first) => total -= char_len(first),
                        None => break,
                    }
                }
            }

            current.push_back(piece);
            total += len;
        }

        if let Some(doc) = join(&current) {
            docs.push(doc);
        }

        docs
    }
}

impl Default for RecursiveSplitter {
    fn default() -> Self {
        Self {
            config: SplitterConfig::default(),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn join(pieces: &VecDeque<&str>) -> Option<String> {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Split on `separator`, attaching each separator to the piece that follows it
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (pos, _) in text.match_indices(separator) {
        if pos > start {
            pieces.push(&text[start..pos]);
        }
        start = pos;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces.into_iter().filter(|p| !p.is_empty()).collect()
}

/// Position in a text tracked both in bytes and in characters
struct CharCursor<'a> {
    text: &'a str,
    byte: usize,
    chars: usize,
}

impl<'a> CharCursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            byte: 0,
            chars: 0,
        }
    }

    /// Move to a character offset, clamped to the end of the text
    fn seek(&mut self, target: usize) {
        if target >= self.chars {
            for c in self.text[self.byte..].chars().take(target - self.chars) {
                self.byte += c.len_utf8();
                self.chars += 1;
            }
        } else {
            for c in self.text[..self.byte].chars().rev().take(self.chars - target) {
                self.byte -= c.len_utf8();
                self.chars -= 1;
            }
        }
    }

    /// Find `needle` at or after the cursor; on a match the cursor moves
    /// to it and its character offset is returned
    fn find(&mut self, needle: &str) -> Option<usize> {
        let rest = &self.text[self.byte..];
        let pos = rest.find(needle)?;
        self.chars += rest[..pos].chars().count();
        self.byte += pos;
        Some(self.chars)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn splitter(size: usize, overlap: usize) -> RecursiveSplitter {
        RecursiveSplitter::new(SplitterConfig::new(size, overlap)).unwrap()
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(RecursiveSplitter::new(SplitterConfig::new(0, 0)).is_err());
        assert!(RecursiveSplitter::new(SplitterConfig::new(10, 10)).is_err());
        assert!(
            RecursiveSplitter::new(SplitterConfig::new(10, 2).with_separators(Vec::<String>::new()))
                .is_err()
        );
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = RecursiveSplitter::default().split("  Total cholesterol: 180 mg/dL  ");
        assert_eq!(chunks, vec!["Total cholesterol: 180 mg/dL"]);
    }

    #[test]
    fn test_blank_text_yields_nothing() {
        assert!(RecursiveSplitter::default().split("").is_empty());
        assert!(RecursiveSplitter::default().split(" \n\n \n").is_empty());
    }

    #[test]
    fn test_word_split_with_overlap() {
        let text = "aaaa bbbb cccc dddd eeee";
        let chunks = splitter(10, 5).split_with_offsets(text);

        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["aaaa bbbb", "bbbb cccc", "cccc dddd", "dddd eeee"]);

        let starts: Vec<usize> = chunks.iter().map(|c| c.start_index).collect();
        assert_eq!(starts, vec![0, 5, 10, 15]);

        let ordinals: Vec<u32> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_falls_back_to_characters() {
        let chunks = splitter(10, 0).split("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(chunks, vec!["abcdefghij", "klmnopqrst", "uvwxyz"]);
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let para_a = "Hemoglobin is within the normal range for adults.";
        let para_b = "Fasting glucose is slightly elevated.";
        let text = format!("{para_a}\n\n{para_b}");

        let chunks = splitter(60, 0).split(&text);
        assert_eq!(chunks, vec![para_a, para_b]);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let chunks = splitter(5, 0).split("가나다라마바사아자차카타파하");
        assert_eq!(chunks, vec!["가나다라마", "바사아자차", "카타파하"]);

        let located = splitter(5, 0).split_with_offsets("가나다라마바사아자차카타파하");
        assert_eq!(located[1].start_index, 5);
        assert_eq!(located[2].start_index, 10);
    }

    #[test]
    fn test_default_report_chunks_fit() {
        let line = "LDL cholesterol 130 mg/dL (borderline high), HDL 45 mg/dL, triglycerides 160 mg/dL.";
        let text = vec![line; 12].join("\n");

        let chunks = RecursiveSplitter::default().split(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 150));
    }

    #[test]
    fn test_offsets_on_long_document() {
        let text: String = (0..6000)
            .map(|i| format!("marker{i} value {} mg/dL\n", i % 97))
            .collect();
        let chunks = splitter(40, 10).split_with_offsets(&text);
        assert!(chunks.len() > 3000);

        let chars: Vec<char> = text.chars().collect();
        let mut previous = 0;
        for chunk in &chunks {
            let len = chunk.content.chars().count();
            let located: String = chars[chunk.start_index..chunk.start_index + len].iter().collect();
            assert_eq!(located, chunk.content);
            assert!(chunk.start_index >= previous);
            previous = chunk.start_index;
        }
    }

    #[test]
    fn test_cursor_moves_both_ways() {
        let text = "가나다 abc 라마";
        let mut cursor = CharCursor::new(text);
        cursor.seek(5);
        assert_eq!(cursor.find("c"), Some(6));
        cursor.seek(1);
        assert_eq!(cursor.find("다"), Some(2));
        assert_eq!(cursor.find("가"), None);
        cursor.seek(100);
        assert_eq!(cursor.chars, text.chars().count());
        assert_eq!(cursor.byte, text.len());
    }

    proptest! {
        #[test]
        fn prop_chunks_are_bounded_and_located(
            text in "[a-z \n]{0,400}",
            size in 2usize..60,
            overlap_pct in 0usize..50,
        ) {
            let overlap = size * overlap_pct / 100;
            let chunks = splitter(size, overlap).split_with_offsets(&text);
            let chars: Vec<char> = text.chars().collect();

            for chunk in &chunks {
                let len = chunk.content.chars().count();
                prop_assert!(len > 0);
                prop_assert!(len <= size);

                let located: String = chars[chunk.start_index..chunk.start_index + len].iter().collect();
                prop_assert_eq!(&located, &chunk.content);
            }
        }
    }
}
