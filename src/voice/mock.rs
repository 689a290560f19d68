/*!
 * Mock speech engine for testing.
 *
 * Produces a deterministic amount of audio per character, optionally after a
 * random delay, and can be told to fail for lines containing a marker.
 */

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::voice::{RawAudio, VoiceEngine, VoiceParams};

/// Mock engine with configurable timing and failures
#[derive(Debug, Clone)]
pub struct MockVoiceEngine {
    sample_rate: u32,
    samples_per_char: usize,
    max_delay_ms: u64,
    fail_marker: Option<String>,
    limit: Option<usize>,
    calls: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockVoiceEngine {
    /// Engine producing `samples_per_char` samples per character at `sample_rate`
    pub fn new(sample_rate: u32, samples_per_char: usize) -> Self {
        Self {
            sample_rate,
            samples_per_char,
            max_delay_ms: 0,
            fail_marker: None,
            limit: None,
            calls: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep a random 0..=`max_delay_ms` before answering
    pub fn with_random_delay(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Fail every line containing `marker`
    pub fn failing_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }

    /// Report a concurrency limit to the dispatcher
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Number of synthesize calls that reached the engine
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed in flight at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Number of samples produced for `text`
    pub fn expected_samples(&self, text: &str) -> usize {
        text.trim().chars().count() * self.samples_per_char
    }

    fn random_delay(&self) -> Duration {
        if self.max_delay_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=self.max_delay_ms))
    }
}

#[async_trait]
impl VoiceEngine for MockVoiceEngine {
    async fn synthesize(&self, text: &str, params: &VoiceParams) -> Result<RawAudio, ProviderError> {
        params.validate()?;
        if text.trim().is_empty() {
            return Ok(RawAudio::empty(self.sample_rate));
        }

        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = self.random_delay();
        tokio::time::sleep(delay).await;
        // yield so overlapping calls are observable even without delays
        tokio::task::yield_now().await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(marker) = &self.fail_marker {
            if text.contains(marker.as_str()) {
                return Err(ProviderError::ApiError {
                    status_code: 500,
                    message: format!("Simulated synthesis failure for '{}'", marker),
                });
            }
        }

        Ok(RawAudio::new(vec![0.25; self.expected_samples(text)], self.sample_rate))
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn concurrency_limit(&self) -> Option<usize> {
        self.limit
    }
}
