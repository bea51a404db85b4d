//! LLM Client implementations
//!
//! OpenAI-compatible, Ollama and Google Gemini backends behind the
//! `LlmClient` trait, with streaming where the backend offers it.
//!
//! Author: hephaex@gmail.com

use std::time::Duration;

use async_trait::async_trait;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use hrag_core::{HragError, LlmClient, LlmConfig, LlmProvider, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| HragError::ConfigError(format!("Failed to build HTTP client: {e}")))
}

/// Drain complete lines from `buffer` after appending `bytes`.
///
/// Network chunks can end mid-line or mid-character, so bytes are held
/// back until their newline arrives.
fn complete_lines(buffer: &mut Vec<u8>, bytes: &[u8]) -> Vec<String> {
    buffer.extend_from_slice(bytes);
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        lines.push(String::from_utf8_lossy(&line).trim_end().to_string());
    }
    lines
}

/// Whatever is left in `buffer` once the body has ended
fn trailing_line(buffer: &mut Vec<u8>) -> Option<String> {
    let line = String::from_utf8_lossy(buffer).trim_end().to_string();
    buffer.clear();
    (!line.is_empty()).then_some(line)
}

/// Turn a line-oriented byte stream into text fragments
fn line_stream<S, B, F>(bytes: S, parse_line: F) -> BoxStream<'static, Result<String>>
where
    S: futures::Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    F: Fn(&str) -> Option<String> + Send + 'static,
{
    // `None` marks the end of the body so the last unterminated line is kept
    bytes
        .map(Some)
        .chain(stream::once(future::ready(None)))
        .scan(Vec::new(), move |buffer, chunk| {
            let lines = match chunk {
                Some(Ok(bytes)) => complete_lines(buffer, bytes.as_ref()),
                Some(Err(e)) => {
                    let err = HragError::LlmError(format!("Stream error: {e}"));
                    return future::ready(Some(Some(Err(err))));
                }
                None => trailing_line(buffer).into_iter().collect(),
            };
            let text: String = lines.iter().filter_map(|line| parse_line(line)).collect();
            future::ready(Some((!text.is_empty()).then_some(Ok(text))))
        })
        .filter_map(future::ready)
        .boxed()
}

// ============================================================================
// OpenAI Client
// ============================================================================

/// OpenAI (or compatible) chat completions client
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Content of one `data: {...}` SSE line
fn openai_delta(line: &str) -> Option<String> {
    let data = line.strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return None;
    }
    let parsed: StreamResponse = serde_json::from_str(data).ok()?;
    parsed.choices.into_iter().next()?.delta.content
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            model: model.into(),
            max_tokens,
            temperature,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| HragError::ConfigError("OpenAI API key required".to_string()))?;

        let mut client = Self::new(
            api_key.clone(),
            config.model.clone(),
            config.max_tokens,
            config.temperature,
        );
        client.client = http_client(config.timeout_secs)?;
        if let Some(url) = &config.openai_base_url {
            client = client.with_base_url(url.clone());
        }
        Ok(client)
    }

    /// Set custom base URL for OpenAI-compatible APIs
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, prompt: &str, stream: bool) -> OpenAiRequest<'_> {
        OpenAiRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: stream.then_some(true),
        }
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request(prompt, stream))
            .send()
            .await
            .map_err(|e| HragError::LlmError(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(HragError::LlmError(format!("OpenAI error: {error_text}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let result: OpenAiResponse = self
            .send(prompt, false)
            .await?
            .json()
            .await
            .map_err(|e| HragError::LlmError(format!("Failed to parse response: {e}")))?;

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| HragError::LlmError("No response generated".to_string()))
    }

    async fn generate_stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        let response = self.send(prompt, true).await?;
        Ok(line_stream(response.bytes_stream(), openai_delta))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// Ollama Client
// ============================================================================

/// Ollama generate API client
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Fragment of one NDJSON line
fn ollama_fragment(line: &str) -> Option<String> {
    let parsed: OllamaResponse = serde_json::from_str(line).ok()?;
    (!parsed.response.is_empty()).then_some(parsed.response)
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut client = Self::new(config.ollama_url.clone(), config.model.clone());
        client.client = http_client(config.timeout_secs)?;
        Ok(client)
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| HragError::LlmError(format!("Ollama request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(HragError::LlmError(format!("Ollama error: {error_text}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let result: OllamaResponse = self
            .send(prompt, false)
            .await?
            .json()
            .await
            .map_err(|e| HragError::LlmError(format!("Failed to parse Ollama response: {e}")))?;

        Ok(result.response)
    }

    async fn generate_stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        let response = self.send(prompt, true).await?;
        Ok(line_stream(response.bytes_stream(), ollama_fragment))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

// ============================================================================
// Gemini Client
// ============================================================================

/// Google Gemini generateContent client
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

impl GeminiResponse {
    /// Text parts of the first candidate that has content
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().find_map(|c| c.content)?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        (!text.is_empty()).then_some(text)
    }
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            model: model.into(),
            max_tokens: 1024,
            temperature: 0.2,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .google_api_key
            .as_ref()
            .ok_or_else(|| HragError::ConfigError("Google API key required".to_string()))?;

        let mut client = Self::new(api_key.clone(), config.model.clone());
        client.client = http_client(config.timeout_secs)?;
        client.max_tokens = config.max_tokens;
        client.temperature = config.temperature;
        Ok(client)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_tokens,
            }
        })
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&self.body(prompt))
            .send()
            .await
            .map_err(|e| HragError::LlmError(format!("Gemini request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(HragError::LlmError(format!("Gemini error: {error_text}")));
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| HragError::LlmError(format!("Failed to parse Gemini response: {e}")))?;

        parsed
            .text()
            .ok_or_else(|| HragError::LlmError("No response generated".to_string()))
    }

    /// Gemini answers arrive whole, as a single-item stream
    async fn generate_stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        let answer = self.generate(prompt).await?;
        Ok(stream::once(future::ready(Ok(answer))).boxed())
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an LLM client from config
pub fn create_llm_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider {
        LlmProvider::OpenAI => {
            Ok(Box::new(OpenAiClient::from_config(config)?))
        }
        LlmProvider::Ollama => Ok(Box::new(OllamaClient::from_config(config)?)),
        LlmProvider::Gemini => Ok(Box::new(GeminiClient::from_config(config)?)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_client_creation() {
        let client = OpenAiClient::new("test-key", "gpt-4o-mini", 2048, 0.1)
            .with_base_url("http://localhost:8080/v1/");
        assert_eq!(client.model, "gpt-4o-mini");
        assert_eq!(client.base_url, "http://localhost:8080/v1");

        let request = serde_json::to_value(client.request("hi", false)).unwrap();
        assert!(request.get("stream").is_none());
        assert_eq!(request["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_complete_lines_holds_partial_input() {
        let mut buffer = Vec::new();
        assert!(complete_lines(&mut buffer, b"data: {\"a\"").is_empty());

        let lines = complete_lines(&mut buffer, b":1}\r\ndata: [DONE]\n");
        assert_eq!(lines, vec!["data: {\"a\":1}", "data: [DONE]"]);
        assert!(buffer.is_empty());

        // multi-byte character split across chunks
        let bytes = "혈당\n".as_bytes();
        assert!(complete_lines(&mut buffer, &bytes[..2]).is_empty());
        assert_eq!(complete_lines(&mut buffer, &bytes[2..]), vec!["혈당"]);
    }

    #[tokio::test]
    async fn test_line_stream_keeps_unterminated_last_line() {
        let body: Vec<reqwest::Result<Vec<u8>>> = vec![
            Ok(b"{\"response\":\"LDL is \"}\n{\"resp".to_vec()),
            Ok(b"onse\":\"162\"}\n{\"response\":\" mg/dL\"}".to_vec()),
        ];

        let fragments: Vec<String> = line_stream(stream::iter(body), ollama_fragment)
            .map(|f| f.unwrap())
            .collect()
            .await;

        assert_eq!(fragments.concat(), "LDL is 162 mg/dL");
        assert_eq!(fragments.last().map(String::as_str), Some(" mg/dL"));
    }

    #[test]
    fn test_trailing_line() {
        let mut buffer = b"data: [DONE]\r".to_vec();
        assert_eq!(trailing_line(&mut buffer).as_deref(), Some("data: [DONE]"));
        assert!(buffer.is_empty());
        assert_eq!(trailing_line(&mut buffer), None);
    }

    #[test]
    fn test_openai_delta_parsing() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(openai_delta(line).as_deref(), Some("Hello"));
        assert_eq!(openai_delta("data: [DONE]"), None);
        assert_eq!(openai_delta(": keep-alive"), None);
        assert_eq!(openai_delta(r#"data: {"choices":[{"delta":{}}]}"#), None);
    }

    #[test]
    fn test_ollama_fragment_parsing() {
        assert_eq!(
            ollama_fragment(r#"{"response":"Your","done":false}"#).as_deref(),
            Some("Your")
        );
        assert_eq!(ollama_fragment(r#"{"response":"","done":true}"#), None);
        assert_eq!(ollama_fragment("garbage"), None);
    }

    #[test]
    fn test_gemini_response_text() {
        let parsed: GeminiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Your LDL " }, { "text": "is high." }] }
            }]
        }))
        .unwrap();
        assert_eq!(parsed.text().as_deref(), Some("Your LDL is high."));

        let empty: GeminiResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(empty.text(), None);
    }

    #[test]
    fn test_gemini_request_shape() {
        let client = GeminiClient::new("k", "gemini-2.0-flash").with_base_url("http://g/");
        assert_eq!(
            client.endpoint(),
            "http://g/v1beta/models/gemini-2.0-flash:generateContent"
        );

        let body = client.body("question");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "question");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
    }

    #[test]
    fn test_factory_requires_keys() {
        let config = LlmConfig {
            provider: LlmProvider::Gemini,
            google_api_key: None,
            ..Default::default()
        };
        assert!(create_llm_client(&config).is_err());

        let config = LlmConfig {
            provider: LlmProvider::Gemini,
            google_api_key: Some("key".to_string()),
            ..Default::default()
        };
        assert_eq!(create_llm_client(&config).unwrap().name(), "gemini");

        let config = LlmConfig {
            provider: LlmProvider::Ollama,
            ..Default::default()
        };
        assert_eq!(create_llm_client(&config).unwrap().name(), "ollama");
    }
}
