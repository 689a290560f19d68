use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::app_config::TtsModelConfig;
use crate::errors::ProviderError;
use crate::providers::{error_from_response, join_endpoint, map_transport_error};
use crate::voice::chunking::split_for_limit;
use crate::voice::{RawAudio, VoiceEngine, VoiceParams};

/// Sample rate of the raw PCM format returned by the speech endpoint
pub const PCM_SAMPLE_RATE: u32 = 24_000;

/// Hosted speech synthesis through OpenAI's audio API
#[derive(Debug)]
pub struct OpenAiSpeech {
    name: String,
    client: Client,
    api_key: String,
    speech_url: url::Url,
    model: String,
    instructions: String,
    max_input_chars: usize,
    timeout_secs: u64,
}

/// Speech request body
#[derive(Debug, Serialize)]
pub struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    instructions: &'a str,
}

impl OpenAiSpeech {
    pub fn new(name: impl Into<String>, config: TtsModelConfig) -> Result<Self, ProviderError> {
        let name = name.into();
        let api_key = config.api_key.clone().ok_or_else(|| {
            ProviderError::AuthenticationError(format!("No API key available for speech model '{}'", name))
        })?;
        let endpoint = if config.endpoint.trim().is_empty() {
            "https://api.openai.com/v1"
        } else {
            config.endpoint.as_str()
        };

        Ok(Self {
            speech_url: join_endpoint(endpoint, "audio/speech")?,
            client: Client::builder()
                .build()
                .map_err(|e| ProviderError::ConnectionError(e.to_string()))?,
            api_key,
            model: config.model.clone(),
            instructions: config.instructions.clone(),
            max_input_chars: config.max_input_chars.max(1),
            timeout_secs: config.timeout_secs,
            name,
        })
    }

    async fn synthesize_chunk(&self, chunk: &str, params: &VoiceParams) -> Result<Vec<f32>, ProviderError> {
        let request = SpeechRequest {
            model: &self.model,
            input: chunk,
            voice: &params.voice,
            speed: params.speed,
            response_format: "pcm",
            instructions: &self.instructions,
        };

        let call = async {
            let response = self
                .client
                .post(self.speech_url.clone())
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| map_transport_error(e, self.timeout_secs))?;

            if !response.status().is_success() {
                return Err(error_from_response("OpenAI speech", response).await);
            }

            response
                .bytes()
                .await
                .map_err(|e| ProviderError::ParseError(format!("Failed to read audio body: {}", e)))
        };

        let body = tokio::time::timeout(Duration::from_secs(self.timeout_secs), call)
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout_secs))??;

        Ok(decode_pcm16(&body))
    }
}

/// Decode little-endian 16-bit PCM into normalized floats
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

#[async_trait]
impl VoiceEngine for OpenAiSpeech {
    async fn synthesize(&self, text: &str, params: &VoiceParams) -> Result<RawAudio, ProviderError> {
        params.validate()?;
        let chunks = split_for_limit(text, self.max_input_chars);
        if chunks.is_empty() {
            return Ok(RawAudio::empty(PCM_SAMPLE_RATE));
        }
        if chunks.len() > 1 {
            debug!("Splitting {} chars into {} speech requests", text.len(), chunks.len());
        }

        let mut samples = Vec::new();
        for chunk in &chunks {
            samples.extend(self.synthesize_chunk(chunk, params).await?);
        }
        Ok(RawAudio::new(samples, PCM_SAMPLE_RATE))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
