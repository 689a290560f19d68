use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::app_config::LlmModelConfig;
use crate::errors::ProviderError;
use crate::providers::{Provider, ScriptProvider, data_url, error_from_response, join_endpoint, map_transport_error};
use crate::script::composer::ContentBlock;

/// OpenAI client for the chat completions API
#[derive(Debug)]
pub struct OpenAi {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// Fully joined chat completions URL
    completions_url: url::Url,
    /// Model list URL, used to test the connection
    models_url: url::Url,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
    timeout_secs: u64,
}

/// Chat completions request
#[derive(Debug, Serialize)]
pub struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Chat message with multi-part content
#[derive(Debug, Serialize)]
pub struct OpenAiMessage {
    pub role: String,
    pub content: Vec<OpenAiContentPart>,
}

/// One part of a user message
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAiContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}

/// Chat completions response
#[derive(Debug, Deserialize)]
pub struct OpenAiResponse {
    pub choices: Vec<OpenAiChoice>,
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiChoice {
    pub message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage information
#[derive(Debug, Deserialize)]
pub struct OpenAiUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl OpenAiRequest {
    /// Build a request with a system message and one multi-part user message
    pub fn from_blocks(model: &str, max_tokens: u32, instruction: &str, blocks: &[ContentBlock]) -> Self {
        let mut messages = Vec::with_capacity(2);
        if !instruction.trim().is_empty() {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: vec![OpenAiContentPart::Text {
                    text: instruction.to_string(),
                }],
            });
        }
        messages.push(OpenAiMessage {
            role: "user".to_string(),
            content: blocks.iter().map(content_part).collect(),
        });

        Self {
            model: model.to_string(),
            messages,
            max_tokens,
            temperature: None,
        }
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

fn content_part(block: &ContentBlock) -> OpenAiContentPart {
    match block {
        ContentBlock::Text(text) => OpenAiContentPart::Text { text: text.clone() },
        ContentBlock::Image(image) => OpenAiContentPart::ImageUrl {
            image_url: ImageUrl {
                url: data_url(&image.mime_type, &image.bytes),
            },
        },
    }
}

impl OpenAi {
    /// Create a new OpenAI client
    pub fn new(api_key: impl Into<String>, endpoint: &str, config: &LlmModelConfig) -> Result<Self, ProviderError> {
        let endpoint = if endpoint.trim().is_empty() {
            "https://api.openai.com/v1"
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
            completions_url: join_endpoint(endpoint, "chat/completions")?,
            models_url: join_endpoint(endpoint, "models")?,
            model: config.model_name.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Provider for OpenAi {
    type Request = OpenAiRequest;
    type Response = OpenAiResponse;

    async fn complete(&self, request: OpenAiRequest) -> Result<OpenAiResponse, ProviderError> {
        let response = self
            .client
            .post(self.completions_url.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(error_from_response("OpenAI", response).await);
        }

        response
            .json::<OpenAiResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse OpenAI API response: {}", e)))
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let response = self
            .client
            .get(self.models_url.clone())
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(error_from_response("OpenAI", response).await);
        }
        Ok(())
    }

    fn extract_text(response: &OpenAiResponse) -> String {
        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ScriptProvider for OpenAi {
    async fn generate(&self, instruction: &str, blocks: &[ContentBlock]) -> Result<String, ProviderError> {
        let request = OpenAiRequest::from_blocks(&self.model, self.max_tokens, instruction, blocks)
            .temperature(self.temperature);
        let response = self.complete(request).await?;

        if let Some(usage) = &response.usage {
            debug!(
                "OpenAI usage: {} prompt tokens, {} completion tokens",
                usage.prompt_tokens, usage.completion_tokens
            );
        }
        Ok(Self::extract_text(&response))
    }

    async fn check_connection(&self) -> Result<(), ProviderError> {
        self.test_connection().await
    }

    fn name(&self) -> &str {
        "openai"
    }
}
