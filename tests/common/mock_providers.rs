/*!
 * Mock backends shared by the integration tests
 */

use std::sync::Arc;

pub use slidecast::providers::mock::{MockBehavior, MockScriptProvider, RecordedCall};
pub use slidecast::voice::mock::MockVoiceEngine;

use slidecast::providers::ScriptProvider;
use slidecast::script::ContentBlock;
use slidecast::voice::VoiceEngine;

/// Sample rate used by the mock voice engine in tests
pub const MOCK_SAMPLE_RATE: u32 = 8_000;

/// Samples produced per character of narration
pub const MOCK_SAMPLES_PER_CHAR: usize = 4;

pub fn mock_voice() -> MockVoiceEngine {
    MockVoiceEngine::new(MOCK_SAMPLE_RATE, MOCK_SAMPLES_PER_CHAR)
}

pub fn as_script_provider(mock: &MockScriptProvider) -> Arc<dyn ScriptProvider> {
    Arc::new(mock.clone())
}

pub fn as_voice_engine(mock: &MockVoiceEngine) -> Arc<dyn VoiceEngine> {
    Arc::new(mock.clone())
}

/// Text blocks of a recorded call, images dropped
pub fn texts(call: &RecordedCall) -> Vec<String> {
    call.blocks
        .iter()
        .filter_map(ContentBlock::as_text)
        .map(str::to_string)
        .collect()
}
