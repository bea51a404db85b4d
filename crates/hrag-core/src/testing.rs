//! Test doubles for the LLM seam

use crate::{HragError, LlmClient, Result};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Mutex;

/// LLM stub that returns a fixed answer and remembers every prompt
pub struct ScriptedLlm {
    answer: String,
    fail: bool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            fail: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A client whose every call fails
    pub fn failing() -> Self {
        Self {
            answer: String::new(),
            fail: true,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn record(&self, prompt: &str) -> Result<()> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if self.fail {
            return Err(HragError::LlmError("scripted failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.record(prompt)?;
        Ok(self.answer.clone())
    }

    async fn generate_stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        self.record(prompt)?;
        let words: Vec<Result<String>> = self
            .answer
            .split_inclusive(' ')
            .map(|w| Ok(w.to_string()))
            .collect();
        Ok(stream::iter(words).boxed())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
