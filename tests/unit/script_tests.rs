/*!
 * Tests for request composition, transcript splitting and script generation
 */

use anyhow::Result;
use std::sync::Arc;

use slidecast::app_config::ScriptMode;
use slidecast::content::{ContentUnit, VisualRef};
use slidecast::errors::{CompositionError, ScriptError};
use slidecast::script::composer::{CURRENT_MARKER, PREVIOUS_MARKER};
use slidecast::script::{ContentBlock, ScriptComposer, ScriptGenerator, Transcript, compose, split_into_units};

use crate::common;
use crate::common::mock_providers::{MockBehavior, MockScriptProvider, texts};

#[test]
fn test_split_into_units_withTrailingNewline_shouldDropEmptyLine() {
    let units = split_into_units("Intro line\nBody line\n");

    assert_eq!(units.len(), 2);
    assert_eq!(units[0].sequence_number, 1);
    assert_eq!(units[0].text, "Intro line");
    assert_eq!(units[1].sequence_number, 2);
    assert_eq!(units[1].text, "Body line");
}

#[test]
fn test_compose_withoutPrevious_shouldOrderPromptMarkerTextVisuals() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let png = common::create_test_png(dir.path(), "diagram.png")?;
    let unit = ContentUnit::new(1, "Entropy").with_visual(VisualRef::image(&png));

    let request = compose("You are a professor", "Explain in English", &unit, None)?;
    let blocks = request.blocks();

    assert_eq!(request.instruction, "You are a professor");
    assert_eq!(blocks.len(), 4);
    assert_eq!(blocks[0], ContentBlock::Text("Explain in English".into()));
    assert_eq!(blocks[1], ContentBlock::Text(CURRENT_MARKER.into()));
    assert_eq!(blocks[2], ContentBlock::Text("Entropy".into()));
    assert!(matches!(&blocks[3], ContentBlock::Image(handle) if handle.path == png));
    assert!(blocks.iter().all(|b| b.as_text() != Some(PREVIOUS_MARKER)));
    // instruction travels separately, never as a content block
    assert!(blocks.iter().all(|b| b.as_text() != Some("You are a professor")));
    Ok(())
}

#[test]
fn test_compose_withPrevious_shouldPlacePreviousBeforeCurrent() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let png = common::create_test_png(dir.path(), "prev.png")?;
    let previous = ContentUnit::new(1, "Heat").with_visual(VisualRef::image(&png));
    let current = ContentUnit::new(2, "Work");

    let request = ScriptComposer::new("persona", "prompt").compose(&current, Some(&previous))?;
    let blocks = request.blocks();

    assert_eq!(blocks.len(), 6);
    assert_eq!(blocks[1].as_text(), Some(PREVIOUS_MARKER));
    assert_eq!(blocks[2].as_text(), Some("Heat"));
    assert!(matches!(blocks[3], ContentBlock::Image(_)));
    assert_eq!(blocks[4].as_text(), Some(CURRENT_MARKER));
    assert_eq!(blocks[5].as_text(), Some("Work"));
    assert_eq!(request.previous_unit.as_ref().map(|u| u.index), Some(1));
    Ok(())
}

#[test]
fn test_compose_withMissingVisual_shouldReportCurrentUnit() {
    let previous = ContentUnit::new(4, "Old").with_visual(VisualRef::image("/nonexistent/old.png"));
    let current = ContentUnit::new(5, "New");

    let err = compose("i", "p", &current, Some(&previous)).unwrap_err();

    let CompositionError::Visual { unit, .. } = err;
    assert_eq!(unit, 5);
}

#[test]
fn test_transcript_alignment_withExtraLine_shouldFail() {
    let transcript = Transcript::from_text("one\ntwo\nthree\n");
    assert!(transcript.check_alignment(3).is_ok());
    assert!(transcript.check_alignment(2).is_err());
}

#[tokio::test]
async fn test_generate_withDocumentMode_shouldSendSingleRequest() -> Result<()> {
    let provider = MockScriptProvider::working();
    let generator = ScriptGenerator::new(Arc::new(provider.clone()), ScriptComposer::new("persona", "prompt"));
    let units = vec![
        ContentUnit::new(1, "Alpha"),
        ContentUnit::new(2, ""),
        ContentUnit::new(3, "Gamma"),
    ];

    let transcript = generator.generate(&units, ScriptMode::Document).await?;

    assert_eq!(provider.request_count(), 1);
    assert_eq!(transcript.as_str(), "[SCRIPT] Alpha\n[SCRIPT] Gamma");
    let sent = texts(&provider.calls()[0]);
    assert_eq!(sent[0], "prompt");
    assert!(sent.contains(&"Slide 3:".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_generate_withMultilineDocumentAnswer_shouldReportAlignmentError() {
    let provider = MockScriptProvider::new(MockBehavior::Multiline);
    let generator = ScriptGenerator::new(Arc::new(provider), ScriptComposer::new("persona", "prompt"));
    let units = vec![ContentUnit::new(1, "two words")];

    let result = generator.generate(&units, ScriptMode::Document).await;

    assert!(matches!(result, Err(ScriptError::Alignment(_))));
}

#[tokio::test]
async fn test_generate_perUnit_withPreviousBlankUnit_shouldStillChainIt() -> Result<()> {
    let provider = MockScriptProvider::working();
    let generator = ScriptGenerator::new(Arc::new(provider.clone()), ScriptComposer::new("persona", "prompt"));
    let units = vec![ContentUnit::new(1, "Alpha"), ContentUnit::new(2, " "), ContentUnit::new(3, "Gamma")];

    let transcript = generator.generate(&units, ScriptMode::PerUnit).await?;

    assert_eq!(transcript.line_count(), 2);
    let calls = provider.calls();
    assert_eq!(calls.len(), 2);
    assert!(!texts(&calls[0]).contains(&PREVIOUS_MARKER.to_string()));
    assert!(texts(&calls[1]).contains(&PREVIOUS_MARKER.to_string()));
    assert_eq!(calls[1].instruction, "persona");
    Ok(())
}
