use async_trait::async_trait;
use base64::Engine;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::app_config::LlmModelConfig;
use crate::errors::ProviderError;
use crate::providers::{Provider, ScriptProvider, error_from_response, join_endpoint, map_transport_error};
use crate::script::composer::ContentBlock;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic client for interacting with Anthropic API
#[derive(Debug)]
pub struct Anthropic {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// Messages endpoint
    messages_url: url::Url,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
    timeout_secs: u64,
}

/// Anthropic message request
#[derive(Debug, Serialize)]
pub struct AnthropicRequest {
    /// The model to use
    model: String,

    /// The messages for the conversation
    messages: Vec<AnthropicMessage>,

    /// System prompt to guide the AI
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,

    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    /// Maximum number of tokens to generate
    max_tokens: u32,
}

/// Anthropic message format
#[derive(Debug, Serialize)]
pub struct AnthropicMessage {
    /// Role of the message sender (user, assistant)
    pub role: String,

    /// Content blocks of the message
    pub content: Vec<AnthropicContentBlock>,
}

/// Request content block
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnthropicContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

/// Inline base64 image source
#[derive(Debug, Serialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

/// Token usage information
#[derive(Debug, Deserialize)]
pub struct TokenUsage {
    /// Number of input tokens
    pub input_tokens: u32,
    /// Number of output tokens
    pub output_tokens: u32,
}

/// Anthropic response
#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    /// The content of the response
    pub content: Vec<AnthropicContent>,
    /// Token usage information
    pub usage: TokenUsage,
}

/// Individual content block in an Anthropic response
#[derive(Debug, Deserialize)]
pub struct AnthropicContent {
    /// The type of content
    #[serde(rename = "type")]
    pub content_type: String,

    /// The actual text content
    #[serde(default)]
    pub text: String,
}

impl AnthropicRequest {
    /// Create a new Anthropic request
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            system: None,
            temperature: None,
            max_tokens,
        }
    }

    /// Add a user message built from content blocks
    pub fn user_blocks(mut self, blocks: &[ContentBlock]) -> Self {
        self.messages.push(AnthropicMessage {
            role: "user".to_string(),
            content: blocks.iter().map(content_block).collect(),
        });
        self
    }

    /// Set the system prompt
    pub fn system(mut self, system: impl Into<String>) -> Self {
        let system = system.into();
        self.system = (!system.trim().is_empty()).then_some(system);
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

fn content_block(block: &ContentBlock) -> AnthropicContentBlock {
    match block {
        ContentBlock::Text(text) => AnthropicContentBlock::Text { text: text.clone() },
        ContentBlock::Image(image) => AnthropicContentBlock::Image {
            source: ImageSource {
                source_type: "base64".to_string(),
                media_type: image.mime_type.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(&image.bytes),
            },
        },
    }
}

impl Anthropic {
    /// Create a new Anthropic client
    pub fn new(api_key: impl Into<String>, endpoint: &str, config: &LlmModelConfig) -> Result<Self, ProviderError> {
        let endpoint = if endpoint.trim().is_empty() {
            "https://api.anthropic.com"
        } else {
            endpoint
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            messages_url: join_endpoint(endpoint, "v1/messages")?,
            model: config.model_name.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Provider for Anthropic {
    type Request = AnthropicRequest;
    type Response = AnthropicResponse;

    /// Complete a messages request
    async fn complete(&self, request: AnthropicRequest) -> Result<AnthropicResponse, ProviderError> {
        let response = self
            .client
            .post(self.messages_url.clone())
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(error_from_response("Anthropic", response).await);
        }

        response
            .json::<AnthropicResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse Anthropic API response: {}", e)))
    }

    /// Test the connection to the Anthropic API
    async fn test_connection(&self) -> Result<(), ProviderError> {
        let request = AnthropicRequest::new(&self.model, 10)
            .user_blocks(&[ContentBlock::Text("Hello".to_string())]);
        self.complete(request).await?;
        Ok(())
    }

    /// Extract text from Anthropic response
    fn extract_text(response: &AnthropicResponse) -> String {
        response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect()
    }
}

#[async_trait]
impl ScriptProvider for Anthropic {
    async fn generate(&self, instruction: &str, blocks: &[ContentBlock]) -> Result<String, ProviderError> {
        let request = AnthropicRequest::new(&self.model, self.max_tokens)
            .system(instruction)
            .temperature(self.temperature)
            .user_blocks(blocks);
        let response = self.complete(request).await?;

        debug!(
            "Anthropic usage: {} input tokens, {} output tokens",
            response.usage.input_tokens, response.usage.output_tokens
        );
        Ok(Self::extract_text(&response))
    }

    async fn check_connection(&self) -> Result<(), ProviderError> {
        self.test_connection().await
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::composer::ImageHandle;
    use std::path::PathBuf;

    #[test]
    fn test_request_should_carry_instruction_as_system() {
        let blocks = vec![
            ContentBlock::Text("prompt".into()),
            ContentBlock::Image(ImageHandle {
                path: PathBuf::from("a.jpg"),
                mime_type: "image/jpeg".into(),
                bytes: b"abc".to_vec(),
                width: 1,
                height: 1,
            }),
        ];
        let request = AnthropicRequest::new("claude", 512).system("persona").user_blocks(&blocks);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["system"], "persona");
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
        assert_eq!(json["messages"][0]["content"][1]["type"], "image");
        assert_eq!(json["messages"][0]["content"][1]["source"]["media_type"], "image/jpeg");
        assert_eq!(json["messages"][0]["content"][1]["source"]["data"], "YWJj");
    }

    #[test]
    fn test_blank_system_should_be_omitted() {
        let request = AnthropicRequest::new("claude", 512).system("  ");
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_extract_text_should_skip_non_text_blocks() {
        let response: AnthropicResponse = serde_json::from_str(
            r#"{"content": [{"type": "text", "text": "Hello "}, {"type": "tool_use"}, {"type": "text", "text": "class"}],
                "usage": {"input_tokens": 1, "output_tokens": 2}}"#,
        )
        .unwrap();
        assert_eq!(Anthropic::extract_text(&response), "Hello class");
    }
}
