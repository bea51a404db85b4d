//! Prompt assembly for report questions

use hrag_core::RetrievedChunk;

/// System instruction for answering questions about a user's own reports
pub const REPORT_ASSISTANT: &str = "You are a careful assistant that explains a user's own \
medical reports. Answer only from the report excerpts in the context. If the excerpts do not \
contain the answer, say that the uploaded reports do not mention it. Do not diagnose; suggest \
discussing medical decisions with a doctor.";

/// Builder for structured LLM prompts
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    system_instruction: String,
    context_sections: Vec<String>,
    question: String,
    instructions: Vec<String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder preloaded with the report assistant instructions
    pub fn for_reports() -> Self {
        Self::new()
            .system(REPORT_ASSISTANT)
            .add_instruction("Quote values with their units and reference ranges when present")
            .add_instruction("Name the report file an answer comes from")
            .add_instruction("Keep the answer short and in plain language")
    }

    pub fn system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn add_context(mut self, context: impl Into<String>) -> Self {
        self.context_sections.push(context.into());
        self
    }

    /// Add retrieved chunks as numbered context sections, stopping before
    /// the total text would exceed `max_chars`
    pub fn add_chunks(mut self, chunks: &[RetrievedChunk], max_chars: usize) -> Self {
        let mut used = 0usize;
        for (i, chunk) in chunks.iter().enumerate() {
            let len = chunk.text.chars().count();
            if used + len > max_chars && !self.context_sections.is_empty() {
                break;
            }
            used += len;
            self.context_sections
                .push(format!("[{}] ({}) {}", i + 1, chunk.source, chunk.text.trim()));
        }
        self
    }

    pub fn question(mut self, q: impl Into<String>) -> Self {
        self.question = q.into();
        self
    }

    pub fn add_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    pub fn context_len(&self) -> usize {
        self.context_sections.len()
    }

    pub fn build(self) -> String {
        let mut prompt = String::new();

        if !self.system_instruction.is_empty() {
            prompt.push_str("<s>\n");
            prompt.push_str(&self.system_instruction);
            prompt.push_str("\n</s>\n\n");
        }

        if !self.context_sections.is_empty() {
            prompt.push_str("<context>\n");
            for section in &self.context_sections {
                prompt.push_str(section);
                prompt.push_str("\n\n");
            }
            prompt.push_str("</context>\n\n");
        }

        if !self.question.is_empty() {
            prompt.push_str("<question>\n");
            prompt.push_str(&self.question);
            prompt.push_str("\n</question>\n\n");
        }

        if !self.instructions.is_empty() {
            prompt.push_str("<instructions>\n");
            for (i, inst) in self.instructions.iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n", i + 1, inst));
            }
            prompt.push_str("</instructions>\n");
        }

        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            text: text.to_string(),
            score: 1.0,
            source: source.to_string(),
            chunk_index: 0,
            start_index: 0,
        }
    }

    #[test]
    fn test_report_prompt_layout() {
        let prompt = PromptBuilder::for_reports()
            .add_chunks(&[chunk("labs.pdf", "LDL 162 mg/dL")], 1000)
            .question("Is my LDL high?")
            .build();

        assert!(prompt.starts_with("<s>\n"));
        assert!(prompt.contains("[1] (labs.pdf) LDL 162 mg/dL"));
        assert!(prompt.contains("<question>\nIs my LDL high?\n</question>"));
        assert!(prompt.contains("1. Quote values"));
    }

    #[test]
    fn test_context_budget() {
        let chunks = vec![
            chunk("a.pdf", "0123456789"),
            chunk("a.pdf", "0123456789"),
            chunk("a.pdf", "0123456789"),
        ];

        let builder = PromptBuilder::new().add_chunks(&chunks, 25);
        assert_eq!(builder.context_len(), 2);

        // the first chunk is kept even when it alone exceeds the budget
        let builder = PromptBuilder::new().add_chunks(&chunks, 5);
        assert_eq!(builder.context_len(), 1);
    }

    #[test]
    fn test_empty_builder() {
        assert!(PromptBuilder::new().build().is_empty());
    }
}
