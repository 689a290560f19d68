/*!
 * Speech synthesis engines.
 *
 * This module defines the engine abstraction used by the synthesis
 * dispatcher and its implementations:
 * - `openai`: hosted speech API
 * - `local`: on-machine model behind a lazily initialized runtime
 * - `mock`: scripted engine for tests
 */

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use crate::app_config::TtsModelConfig;
use crate::errors::ProviderError;

pub mod chunking;
pub mod local;
pub mod mock;
pub mod openai;

/// Mono samples as produced by an engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl RawAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Zero-length buffer at the given rate
    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Voice, speed and language for a synthesis call
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceParams {
    pub voice: String,
    pub speed: f32,
    pub language: String,
}

impl VoiceParams {
    pub fn new(voice: impl Into<String>, speed: f32, language: impl Into<String>) -> Self {
        Self {
            voice: voice.into(),
            speed,
            language: language.into(),
        }
    }

    /// Parameters from an engine's configured defaults.
    ///
    /// Speed defaults to 1.0 and language to `en`; the voice has no default
    /// and must be configured.
    pub fn from_defaults(config: &TtsModelConfig) -> Result<Self, ProviderError> {
        let voice = config
            .default_voice
            .clone()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ProviderError::InvalidParameter("No default voice configured".to_string()))?;

        let params = Self {
            voice,
            speed: config.default_speed.unwrap_or(1.0),
            language: config.default_language.clone().unwrap_or_else(|| "en".to_string()),
        };
        params.validate()?;
        Ok(params)
    }

    /// Reject parameters no engine can honor
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.voice.trim().is_empty() {
            return Err(ProviderError::InvalidParameter("voice must not be empty".to_string()));
        }
        if self.language.trim().is_empty() {
            return Err(ProviderError::InvalidParameter("language must not be empty".to_string()));
        }
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(ProviderError::InvalidParameter(format!(
                "speed must be a positive number, got {}",
                self.speed
            )));
        }
        Ok(())
    }
}

/// Common trait for speech synthesis backends
///
/// Engines are shared across synthesis tasks as `Arc<dyn VoiceEngine>`.
#[async_trait]
pub trait VoiceEngine: Send + Sync + Debug {
    /// Synthesize `text` into mono samples.
    ///
    /// Blank text yields a zero-length buffer without calling the backend.
    async fn synthesize(&self, text: &str, params: &VoiceParams) -> Result<RawAudio, ProviderError>;

    /// Short identifier for logs
    fn name(&self) -> &str;

    /// Maximum number of concurrent calls this engine supports, if limited
    fn concurrency_limit(&self) -> Option<usize> {
        None
    }
}

/// Build the engine named by a TTS configuration entry
pub fn engine_from_config(model_key: &str, config: TtsModelConfig) -> Result<Arc<dyn VoiceEngine>, ProviderError> {
    match config.provider.to_lowercase().as_str() {
        "openai" => Ok(Arc::new(openai::OpenAiSpeech::new(model_key, config)?)),
        "local" => {
            let runtime = local::KokoroLoader::new(config.clone());
            Ok(Arc::new(local::LocalModelBackend::new(model_key, Box::new(runtime))))
        }
        other => Err(ProviderError::InvalidParameter(format!(
            "Unknown speech provider '{}' for model '{}'",
            other, model_key
        ))),
    }
}
