/*!
 * End-to-end pipeline tests with mock backends
 */

use anyhow::Result;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;

use slidecast::app_config::{FailurePolicy, SettingsManager};
use slidecast::app_controller::{Controller, RunOptions};
use slidecast::audio::TimelineEntry;
use slidecast::audio::wav::read_mono;
use slidecast::progress::{ProgressEvent, Stage};
use slidecast::script::composer::PREVIOUS_MARKER;

use crate::common;
use crate::common::mock_providers::{
    MOCK_SAMPLE_RATE, MockScriptProvider, MockVoiceEngine, as_script_provider, as_voice_engine, mock_voice, texts,
};

fn settings_in(dir: &Path) -> Result<SettingsManager> {
    common::create_settings(
        dir,
        &json!({
            "general": {"preferred_language": "de", "max_workers": 2},
            "lecture": {"instruction": "Persona", "prompt": "Lecture in {language}. {slide_data}"}
        }),
    )
}

fn controller(settings: SettingsManager, provider: &MockScriptProvider, engine: &MockVoiceEngine) -> Controller {
    Controller::new(settings)
        .with_script_provider(as_script_provider(provider))
        .with_voice_engine(as_voice_engine(engine))
}

#[tokio::test]
async fn test_run_withPageRecords_shouldProduceAllArtifacts() -> Result<()> {
    common::init_test_logging();
    let dir = common::create_temp_dir()?;
    let png = common::create_test_png(dir.path(), "page_1_img_1.png")?;
    let records = common::create_page_records(dir.path(), "week1.json", &common::sample_page_records(Some(&png)))?;
    let provider = MockScriptProvider::working();
    let engine = mock_voice();

    let summary = controller(settings_in(dir.path())?, &provider, &engine)
        .run(&RunOptions::new(&records))
        .await?;

    assert_eq!(summary.content_units, 3);
    assert_eq!(summary.transcript_lines, 2);
    assert!(!summary.transcript_reused);
    assert!(summary.failures.is_empty());

    let transcript = fs::read_to_string(&summary.paths.transcript)?;
    assert_eq!(
        transcript,
        format!(
            "{}\n{}",
            MockScriptProvider::narration_for("Welcome to thermodynamics"),
            MockScriptProvider::narration_for("The first law")
        )
    );

    let (samples, rate) = read_mono(&summary.paths.audio)?;
    assert_eq!(rate, MOCK_SAMPLE_RATE);
    let expected: usize = transcript.lines().map(|l| engine.expected_samples(l)).sum();
    assert_eq!(samples.len(), expected);

    let timeline: Vec<TimelineEntry> = serde_json::from_str(&fs::read_to_string(&summary.paths.timeline)?)?;
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[0].start_seconds, 0.0);
    assert_eq!(timeline[0].end_seconds, timeline[1].start_seconds);
    assert!((timeline[1].end_seconds - summary.duration_seconds).abs() < 1e-9);
    assert!(summary.paths.segments_dir.join("slide_2.wav").exists());
    Ok(())
}

#[tokio::test]
async fn test_run_shouldRenderPromptAndChainPreviousSlide() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let records = common::create_page_records(dir.path(), "deck.json", &common::sample_page_records(None))?;
    let provider = MockScriptProvider::working();

    controller(settings_in(dir.path())?, &provider, &mock_voice())
        .run(&RunOptions::new(&records))
        .await?;

    let calls = provider.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].instruction, "Persona");
    assert_eq!(texts(&calls[0])[0], "Lecture in German.");
    // slide 3 is chained on slide 2 even though slide 2 is blank
    let third = texts(&calls[1]);
    assert!(third.contains(&PREVIOUS_MARKER.to_string()));
    assert_eq!(third.last().map(String::as_str), Some("The first law"));
    Ok(())
}

#[tokio::test]
async fn test_run_withDirectivesRecord_shouldOverrideLectureSettings() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let mut records = common::sample_page_records(None);
    if let Value::Array(items) = &mut records {
        items.insert(0, json!({"instructions": "Pirate professor", "prompt": "Arr, in {language}"}));
    }
    let path = common::create_page_records(dir.path(), "deck.json", &records)?;
    let provider = MockScriptProvider::working();

    let options = RunOptions {
        language: Some("fr".into()),
        ..RunOptions::new(&path)
    };
    controller(settings_in(dir.path())?, &provider, &mock_voice()).run(&options).await?;

    let first = &provider.calls()[0];
    assert_eq!(first.instruction, "Pirate professor");
    assert_eq!(texts(first)[0], "Arr, in French");
    Ok(())
}

#[tokio::test]
async fn test_run_twice_shouldReuseTranscriptAndSegments() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let records = common::create_page_records(dir.path(), "deck.json", &common::sample_page_records(None))?;
    let provider = MockScriptProvider::working();
    let first_engine = mock_voice();

    controller(settings_in(dir.path())?, &provider, &first_engine)
        .run(&RunOptions::new(&records))
        .await?;
    assert_eq!(provider.request_count(), 2);

    let second_engine = mock_voice();
    let summary = controller(settings_in(dir.path())?, &provider, &second_engine)
        .run(&RunOptions::new(&records))
        .await?;

    assert!(summary.transcript_reused);
    assert_eq!(summary.resumed_segments, 2);
    assert_eq!(provider.request_count(), 2);
    assert_eq!(second_engine.calls(), 0);

    // --force redoes everything
    let forced_engine = mock_voice();
    let options = RunOptions {
        force: true,
        ..RunOptions::new(&records)
    };
    let summary = controller(settings_in(dir.path())?, &provider, &forced_engine).run(&options).await?;
    assert!(!summary.transcript_reused);
    assert_eq!(summary.resumed_segments, 0);
    assert_eq!(provider.request_count(), 4);
    assert_eq!(forced_engine.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn test_run_withContinuePolicy_shouldKeepGoingPastFailedLine() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let records = common::create_page_records(dir.path(), "deck.json", &common::sample_page_records(None))?;
    let engine = mock_voice().failing_on("first law");

    let options = RunOptions {
        failure_policy: Some(FailurePolicy::Continue),
        ..RunOptions::new(&records)
    };
    let summary = controller(settings_in(dir.path())?, &MockScriptProvider::working(), &engine)
        .run(&options)
        .await?;

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].unit, 2);
    let timeline: Vec<TimelineEntry> = serde_json::from_str(&fs::read_to_string(&summary.paths.timeline)?)?;
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[1].duration_seconds(), 0.0);
    Ok(())
}

#[tokio::test]
async fn test_run_withStrictPolicy_shouldFailAndKeepFinishedSegments() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let records = common::create_page_records(dir.path(), "deck.json", &common::sample_page_records(None))?;
    let engine = mock_voice().failing_on("first law");

    let result = controller(settings_in(dir.path())?, &MockScriptProvider::working(), &engine)
        .run(&RunOptions::new(&records))
        .await;

    assert!(result.is_err());
    assert!(dir.path().join("deck_segments/slide_1.wav").exists());
    assert!(!dir.path().join("deck.wav").exists());
    Ok(())
}

#[tokio::test]
async fn test_run_withScriptFailures_shouldNameEveryFailedSlide() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let records = common::create_page_records(
        dir.path(),
        "deck.json",
        &json!([
            {"page": 1, "text_content": "bad start"},
            {"page": 2, "text_content": "fine"},
            {"page": 3, "text_content": "bad end"}
        ]),
    )?;
    let provider = MockScriptProvider::fail_on("bad");

    let err = controller(settings_in(dir.path())?, &provider, &mock_voice())
        .run(&RunOptions::new(&records))
        .await
        .unwrap_err();

    let message = format!("{:#}", err);
    assert!(message.contains("unit 1"), "{}", message);
    assert!(message.contains("unit 3"), "{}", message);
    assert_eq!(provider.request_count(), 3);
    assert!(!dir.path().join("deck.txt").exists());
    Ok(())
}

#[tokio::test]
async fn test_run_withOutputDir_shouldWriteRecordsThere() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let records = common::create_page_records(dir.path(), "deck.json", &common::sample_page_records(None))?;
    let out = dir.path().join("out");
    let (reporter, events) = common::collecting_reporter();

    let options = RunOptions {
        output_dir: Some(out.clone()),
        ..RunOptions::new(&records)
    };
    Controller::new(settings_in(dir.path())?)
        .with_script_provider(as_script_provider(&MockScriptProvider::working()))
        .with_voice_engine(as_voice_engine(&mock_voice()))
        .with_progress(reporter)
        .run(&options)
        .await?;

    assert!(out.join("deck.json").exists());
    assert!(out.join("deck.txt").exists());
    assert!(out.join("deck.wav").exists());
    assert!(out.join("deck.timestamps.json").exists());

    let started: Vec<Stage> = events
        .lock()
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::StageStarted { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        started,
        vec![Stage::Extraction, Stage::Scripting, Stage::Synthesis, Stage::Assembly]
    );
    Ok(())
}

#[test]
fn test_run_withMissingInput_shouldFail() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let controller = controller(settings_in(dir.path())?, &MockScriptProvider::working(), &mock_voice());

    let result = tokio_test::block_on(async { controller.run(&RunOptions::new(dir.path().join("missing.pdf"))).await });

    assert!(result.is_err());
    Ok(())
}
