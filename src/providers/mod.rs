/*!
 * Script provider implementations.
 *
 * This module contains client implementations for the language model
 * services that turn slide content into lecture narration:
 * - OpenAI: chat completions with images as data URLs
 * - Anthropic: messages API with base64 image blocks
 * - Ollama: local chat API with an images array
 * - Mock: scripted responses for tests
 */

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use crate::app_config::LlmModelConfig;
use crate::errors::ProviderError;
use crate::script::composer::{ContentBlock, ScriptRequest};

pub mod anthropic;
pub mod mock;
pub mod ollama;
pub mod openai;

/// Wire-level trait for LLM HTTP clients
///
/// Each client speaks its own request/response format; the
/// [`ScriptProvider`] implementation maps content blocks onto it.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// The request type for this provider
    type Request: Send + Sync;

    /// The response type for this provider
    type Response: Send + Sync;

    /// Complete a request using this provider
    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError>;

    /// Test the connection to the provider
    async fn test_connection(&self) -> Result<(), ProviderError>;

    /// Extract text from the provider response
    fn extract_text(response: &Self::Response) -> String;
}

/// Common trait for everything that can write lecture narration
///
/// Implementations are used as `Arc<dyn ScriptProvider>` and selected by the
/// configured model key.
#[async_trait]
pub trait ScriptProvider: Send + Sync + Debug {
    /// Generate text from a system instruction and ordered content blocks
    async fn generate(&self, instruction: &str, blocks: &[ContentBlock]) -> Result<String, ProviderError>;

    /// Short identifier for logs
    fn name(&self) -> &str;

    /// Check that the backend is reachable and accepts the credentials
    async fn check_connection(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Generate the narration for a composed per-unit request
    async fn generate_script(&self, request: &ScriptRequest) -> Result<String, ProviderError> {
        self.generate(&request.instruction, request.blocks()).await
    }
}

/// Build the provider named by an LLM configuration entry
pub fn script_provider_from_config(
    model_key: &str,
    config: &LlmModelConfig,
) -> Result<Arc<dyn ScriptProvider>, ProviderError> {
    let api_key = || {
        config.api_key.clone().ok_or_else(|| {
            ProviderError::AuthenticationError(format!("No API key available for model '{}'", model_key))
        })
    };

    match config.provider.to_lowercase().as_str() {
        "openai" => Ok(Arc::new(openai::OpenAi::new(api_key()?, &config.endpoint, config)?)),
        "anthropic" => Ok(Arc::new(anthropic::Anthropic::new(api_key()?, &config.endpoint, config)?)),
        "ollama" => Ok(Arc::new(ollama::Ollama::new(&config.endpoint, config)?)),
        other => Err(ProviderError::InvalidParameter(format!(
            "Unknown script provider '{}' for model '{}'",
            other, model_key
        ))),
    }
}

/// Map a transport error onto the provider error kinds
pub(crate) fn map_transport_error(error: reqwest::Error, timeout_secs: u64) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else if error.is_connect() {
        ProviderError::ConnectionError(error.to_string())
    } else {
        ProviderError::RequestFailed(error.to_string())
    }
}

/// Turn a non-success response into a provider error
pub(crate) async fn error_from_response(service: &str, response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to get error response text".to_string());
    log::error!("{} API error ({}): {}", service, status, error_text);
    ProviderError::from_status(status.as_u16(), error_text)
}

/// Join an endpoint base URL with an API path
pub(crate) fn join_endpoint(base: &str, path: &str) -> Result<url::Url, ProviderError> {
    let mut base = base.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    url::Url::parse(&base)
        .and_then(|url| url.join(path.trim_start_matches('/')))
        .map_err(|e| ProviderError::InvalidParameter(format!("Invalid endpoint '{}': {}", base, e)))
}

/// Encode an image block as a `data:` URL
pub(crate) fn data_url(mime_type: &str, bytes: &[u8]) -> String {
    use base64::Engine;
    format!(
        "data:{};base64,{}",
        mime_type,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}
