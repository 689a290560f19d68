/*!
 * Mock script provider for testing.
 *
 * This module provides a mock provider that simulates different behaviors:
 * - `MockScriptProvider::working()` - Narrates the current page text
 * - `MockScriptProvider::intermittent(n)` - Fails every Nth request
 * - `MockScriptProvider::failing()` - Always fails with an error
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::ProviderError;
use crate::providers::ScriptProvider;
use crate::script::composer::{CURRENT_MARKER, ContentBlock};

/// Behavior mode for the mock provider
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds with a narration of the page text
    Working,
    /// Fails intermittently (every Nth request)
    Intermittent { fail_every: usize },
    /// Fails the first N requests with a retryable error, then works
    FailFirst { failures: usize },
    /// Fails whenever the page text contains the given marker
    FailOn { marker: String },
    /// Always fails with an error
    Failing,
    /// Returns an empty response
    Empty,
    /// Returns the narration spread over several lines
    Multiline,
    /// Simulates slow response (for timeout testing)
    Slow { delay_ms: u64 },
}

/// One recorded call, for assertions on what the provider received
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub instruction: String,
    pub blocks: Vec<ContentBlock>,
}

/// Mock provider for testing script generation
#[derive(Debug, Clone)]
pub struct MockScriptProvider {
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter for intermittent failures
    request_count: Arc<AtomicUsize>,
    /// Calls received so far
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockScriptProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a working mock provider that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create an intermittently failing mock provider
    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every })
    }

    /// Create a mock that fails for pages containing `marker`
    pub fn fail_on(marker: impl Into<String>) -> Self {
        Self::new(MockBehavior::FailOn { marker: marker.into() })
    }

    /// Create a failing mock provider that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Create a mock that returns empty responses
    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Snapshot of the calls received so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Narration the working mock produces for a page text
    pub fn narration_for(text: &str) -> String {
        format!("[SCRIPT] {}", text.trim())
    }

    fn narrate(blocks: &[ContentBlock]) -> String {
        let texts: Vec<&str> = blocks.iter().filter_map(ContentBlock::as_text).collect();

        if let Some(pos) = texts.iter().position(|t| *t == CURRENT_MARKER) {
            return texts
                .get(pos + 1)
                .map(|t| Self::narration_for(t))
                .unwrap_or_default();
        }

        // Whole-document request: one line per "Slide n:" marker with text
        texts
            .windows(2)
            .filter(|w| w[0].starts_with("Slide ") && w[0].ends_with(':') && !w[1].trim().is_empty())
            .map(|w| Self::narration_for(w[1]))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl ScriptProvider for MockScriptProvider {
    async fn generate(&self, instruction: &str, blocks: &[ContentBlock]) -> Result<String, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(RecordedCall {
            instruction: instruction.to_string(),
            blocks: blocks.to_vec(),
        });

        match &self.behavior {
            MockBehavior::Working => Ok(Self::narrate(blocks)),

            MockBehavior::Intermittent { fail_every } => {
                if count % fail_every == fail_every - 1 {
                    Err(ProviderError::ApiError {
                        message: format!("Simulated intermittent failure (request #{})", count + 1),
                        status_code: 503,
                    })
                } else {
                    Ok(Self::narrate(blocks))
                }
            }

            MockBehavior::FailFirst { failures } => {
                if count < *failures {
                    Err(ProviderError::RateLimitExceeded(format!(
                        "Simulated rate limit (request #{})",
                        count + 1
                    )))
                } else {
                    Ok(Self::narrate(blocks))
                }
            }

            MockBehavior::FailOn { marker } => {
                let narration = Self::narrate(blocks);
                if narration.contains(marker.as_str()) {
                    Err(ProviderError::ApiError {
                        message: format!("Simulated failure for '{}'", marker),
                        status_code: 500,
                    })
                } else {
                    Ok(narration)
                }
            }

            MockBehavior::Failing => Err(ProviderError::ApiError {
                message: "Simulated provider failure".to_string(),
                status_code: 500,
            }),

            MockBehavior::Empty => Ok(String::new()),

            MockBehavior::Multiline => Ok(Self::narrate(blocks).replace(' ', "\n")),

            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(tokio::time::Duration::from_millis(*delay_ms)).await;
                Ok(Self::narrate(blocks))
            }
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
