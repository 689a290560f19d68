use async_trait::async_trait;
use base64::Engine;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::app_config::LlmModelConfig;
use crate::errors::ProviderError;
use crate::providers::{Provider, ScriptProvider, error_from_response, join_endpoint, map_transport_error};
use crate::script::composer::ContentBlock;

/// Ollama client for interacting with Ollama API
#[derive(Debug)]
pub struct Ollama {
    /// Base URL of the Ollama API
    base_url: String,
    /// HTTP client for making requests
    client: Client,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
    timeout_secs: u64,
}

/// Generation options for the Ollama API
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Temperature for generation (default: 0.8)
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Chat message object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user, assistant, or tool)
    pub role: String,
    /// Content of the message
    #[serde(default)]
    pub content: String,
    /// Base64-encoded images for multimodal models
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

/// Chat request for the Ollama API
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    /// Model name to use for generation
    model: String,
    /// Messages of the conversation
    messages: Vec<ChatMessage>,
    /// Additional model parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    /// Whether to stream the response
    stream: bool,
}

/// Chat response from the Ollama API
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    /// Model name
    #[serde(default)]
    pub model: String,
    /// Response message
    pub message: ChatMessage,
    /// Whether the generation is complete
    #[serde(default)]
    pub done: bool,
    /// Number of prompt tokens
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    /// Number of generated tokens
    #[serde(default)]
    pub eval_count: Option<u64>,
}

impl ChatRequest {
    /// Build a chat request from an instruction and content blocks.
    ///
    /// Text blocks are joined into the user message in order; images travel in
    /// the message's `images` array in their original order.
    pub fn from_blocks(model: &str, instruction: &str, blocks: &[ContentBlock]) -> Self {
        let mut messages = Vec::with_capacity(2);
        if !instruction.trim().is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: instruction.to_string(),
                images: Vec::new(),
            });
        }

        let mut text = Vec::new();
        let mut images = Vec::new();
        for block in blocks {
            match block {
                ContentBlock::Text(t) => text.push(t.as_str()),
                ContentBlock::Image(image) => {
                    images.push(base64::engine::general_purpose::STANDARD.encode(&image.bytes))
                }
            }
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: text.join("\n"),
            images,
        });

        Self {
            model: model.to_string(),
            messages,
            options: None,
            stream: false,
        }
    }

    /// Set generation options
    pub fn options(mut self, temperature: Option<f32>, num_predict: u32) -> Self {
        self.options = Some(GenerationOptions {
            temperature,
            num_predict: Some(num_predict),
        });
        self
    }
}

/// Parse a chat response that may have been streamed as JSON lines
pub fn parse_chat_response(body: &str) -> Result<ChatResponse, ProviderError> {
    if let Ok(response) = serde_json::from_str::<ChatResponse>(body) {
        return Ok(response);
    }

    // Streaming response: concatenate message pieces
    let mut pieces = Vec::new();
    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<ChatResponse>(line) {
            Ok(piece) => pieces.push(piece),
            Err(e) => {
                error!(
                    "Failed to parse Ollama API response line: {}. Raw (first 200 chars): {}",
                    e,
                    line.chars().take(200).collect::<String>()
                );
                return Err(ProviderError::ParseError(format!(
                    "Failed to parse Ollama API response: {}",
                    e
                )));
            }
        }
    }

    let mut last = pieces
        .pop()
        .ok_or_else(|| ProviderError::ParseError("Empty Ollama API response".to_string()))?;
    let mut content: String = pieces.iter().map(|p| p.message.content.as_str()).collect();
    content.push_str(&last.message.content);
    last.message.content = content;
    Ok(last)
}

impl Ollama {
    /// Create a new Ollama client from the configured endpoint
    pub fn new(endpoint: &str, config: &LlmModelConfig) -> Result<Self, ProviderError> {
        let endpoint = endpoint.trim();
        // Construct a proper URL with scheme and port
        let base_url = if endpoint.is_empty() {
            "http://localhost:11434".to_string()
        } else if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", endpoint.trim_end_matches('/'))
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            // Ollama uses HTTP/1.1
            .http1_only()
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;

        Ok(Self {
            base_url,
            client,
            model: config.model_name.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Provider for Ollama {
    type Request = ChatRequest;
    type Response = ChatResponse;

    /// Chat with the Ollama API
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = join_endpoint(&self.base_url, "api/chat")?;
        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(error_from_response("Ollama", response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Failed to get response text from Ollama API: {}", e)))?;
        parse_chat_response(&body)
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let url = join_endpoint(&self.base_url, "api/version")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(error_from_response("Ollama", response).await);
        }
        Ok(())
    }

    fn extract_text(response: &ChatResponse) -> String {
        response.message.content.clone()
    }
}

#[async_trait]
impl ScriptProvider for Ollama {
    async fn generate(&self, instruction: &str, blocks: &[ContentBlock]) -> Result<String, ProviderError> {
        let request = ChatRequest::from_blocks(&self.model, instruction, blocks)
            .options(self.temperature, self.max_tokens);
        let response = self.complete(request).await?;

        debug!(
            "Ollama {} finished (done={}, prompt tokens {:?}, eval tokens {:?})",
            response.model, response.done, response.prompt_eval_count, response.eval_count
        );
        Ok(Self::extract_text(&response))
    }

    async fn check_connection(&self) -> Result<(), ProviderError> {
        self.test_connection().await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_without_scheme_should_add_http() {
        let config = LlmModelConfig::default();
        let client = Ollama::new("localhost:11434/", &config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");

        let client = Ollama::new("", &config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_request_from_blocks_should_join_text_and_collect_images() {
        let blocks = vec![
            ContentBlock::Text("prompt".into()),
            ContentBlock::Text("page".into()),
        ];
        let request = ChatRequest::from_blocks("llava", "persona", &blocks);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "prompt\npage");
        assert!(json["messages"][1].get("images").is_none());
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_parse_chat_response_with_stream_should_concatenate() {
        let body = concat!(
            r#"{"model":"llava","message":{"role":"assistant","content":"Good "},"done":false}"#,
            "\n",
            r#"{"model":"llava","message":{"role":"assistant","content":"morning"},"done":true}"#,
            "\n"
        );
        let response = parse_chat_response(body).unwrap();
        assert_eq!(response.message.content, "Good morning");
        assert!(response.done);
    }

    #[test]
    fn test_parse_chat_response_with_garbage_should_fail() {
        assert!(parse_chat_response("<html>").is_err());
        assert!(parse_chat_response("").is_err());
    }
}
