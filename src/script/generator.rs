/*!
 * Transcript generation.
 *
 * Units are scripted sequentially in document order. Each request is chained
 * to the unit that precedes it so the narration can transition naturally.
 * A failure on one unit does not stop the loop: every failure is collected
 * and reported together once all units have been attempted.
 */

use log::{debug, info, warn};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::ScriptMode;
use crate::content::ContentUnit;
use crate::errors::{ProviderError, ScriptError, UnitFailure};
use crate::progress::{ProgressReporter, Stage};
use crate::providers::ScriptProvider;
use crate::script::composer::ScriptComposer;
use crate::script::transcript::{Transcript, normalize_line};

/// Retry settings for provider calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Base delay, doubled on every attempt
    pub backoff_base_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base_ms: u64) -> Self {
        Self {
            max_retries,
            backoff_base_ms,
        }
    }

    /// Delay before retry `attempt` (1-based), with up to 25% jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self
            .backoff_base_ms
            .saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16));
        let jitter = if base >= 4 {
            rand::rng().random_range(0..=base / 4)
        } else {
            0
        };
        Duration::from_millis(base + jitter)
    }
}

/// Whether a provider error is worth another attempt
pub fn is_retryable(error: &ProviderError) -> bool {
    match error {
        ProviderError::RateLimitExceeded(_)
        | ProviderError::ConnectionError(_)
        | ProviderError::RequestFailed(_)
        | ProviderError::Timeout(_) => true,
        ProviderError::ApiError { status_code, .. } => *status_code >= 500,
        _ => false,
    }
}

/// Drives the script provider over a sequence of content units
#[derive(Debug)]
pub struct ScriptGenerator {
    provider: Arc<dyn ScriptProvider>,
    composer: ScriptComposer,
    retry: RetryPolicy,
    progress: ProgressReporter,
}

impl ScriptGenerator {
    pub fn new(provider: Arc<dyn ScriptProvider>, composer: ScriptComposer) -> Self {
        Self {
            provider,
            composer,
            retry: RetryPolicy::default(),
            progress: ProgressReporter::silent(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Generate the transcript in the requested mode
    pub async fn generate(&self, units: &[ContentUnit], mode: ScriptMode) -> Result<Transcript, ScriptError> {
        match mode {
            ScriptMode::PerUnit => self.generate_per_unit(units).await,
            ScriptMode::Document => self.generate_document(units).await,
        }
    }

    /// Script every unit with text, one request per unit.
    ///
    /// Units without text produce no line. The resulting transcript holds
    /// exactly one line per scripted unit.
    pub async fn generate_per_unit(&self, units: &[ContentUnit]) -> Result<Transcript, ScriptError> {
        let total = units.iter().filter(|u| u.has_text()).count();
        info!(
            "Generating scripts for {} of {} units using {}",
            total,
            units.len(),
            self.provider.name()
        );
        self.progress.stage_started(Stage::Scripting, total);

        let mut lines = Vec::with_capacity(total);
        let mut failures = Vec::new();
        let mut completed = 0;

        for (position, unit) in units.iter().enumerate() {
            if !unit.has_text() {
                debug!("Unit {} has no text, skipping", unit.index);
                continue;
            }
            let previous = position.checked_sub(1).map(|p| &units[p]);

            match self.script_unit(unit, previous).await {
                Ok(line) => lines.push(line),
                Err(cause) => {
                    warn!("Unit {} failed to script: {}", unit.index, cause);
                    failures.push(UnitFailure {
                        unit: unit.index,
                        cause,
                    });
                }
            }

            completed += 1;
            self.progress.unit_completed(Stage::Scripting, completed, total);
        }
        self.progress.stage_finished(Stage::Scripting);

        if !failures.is_empty() {
            return Err(ScriptError::UnitsFailed(failures));
        }

        let transcript = Transcript::from_lines(&lines);
        transcript.check_alignment(total)?;
        Ok(transcript)
    }

    async fn script_unit(&self, unit: &ContentUnit, previous: Option<&ContentUnit>) -> Result<String, String> {
        let request = self.composer.compose(unit, previous).map_err(|e| e.to_string())?;
        let text = self
            .call_with_retry(|| self.provider.generate_script(&request))
            .await
            .map_err(|e| e.to_string())?;

        let line = normalize_line(&text);
        if line.is_empty() {
            return Err("provider returned an empty script".to_string());
        }
        debug!("Unit {} scripted ({} chars)", unit.index, line.len());
        Ok(line)
    }

    /// Script the whole deck with a single request.
    ///
    /// The provider is asked for one line per slide; the answer is checked
    /// against the number of units that have text.
    pub async fn generate_document(&self, units: &[ContentUnit]) -> Result<Transcript, ScriptError> {
        let expected = units.iter().filter(|u| u.has_text()).count();
        info!("Generating whole-document script for {} units", units.len());
        self.progress.stage_started(Stage::Scripting, 1);

        let request = self.composer.compose_document(units)?;
        let text = self
            .call_with_retry(|| self.provider.generate(&request.instruction, request.blocks()))
            .await?;

        self.progress.unit_completed(Stage::Scripting, 1, 1);
        self.progress.stage_finished(Stage::Scripting);

        let transcript = Transcript::from_lines(text.lines().filter(|l| !l.trim().is_empty()));
        transcript.check_alignment(expected)?;
        Ok(transcript)
    }

    async fn call_with_retry<F, Fut>(&self, mut call: F) -> Result<String, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.retry.max_retries && is_retryable(&e) => {
                    attempt += 1;
                    let delay = self.retry.delay(attempt);
                    warn!(
                        "Script provider error: {} - retrying in {:?} (attempt {}/{})",
                        e,
                        delay,
                        attempt,
                        self.retry.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
