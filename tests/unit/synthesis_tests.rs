/*!
 * Tests for the parallel synthesis dispatcher and audio assembly
 */

use anyhow::Result;
use std::sync::Arc;

use slidecast::app_config::FailurePolicy;
use slidecast::audio::{AudioSegment, SegmentStatus, assemble};
use slidecast::errors::{AlignmentError, SynthesisError};
use slidecast::progress::{ProgressEvent, Stage};
use slidecast::synthesis::{DispatchOptions, SynthesisDispatcher};
use slidecast::voice::VoiceParams;

use crate::common;
use crate::common::mock_providers::{MOCK_SAMPLE_RATE, as_voice_engine, mock_voice};

fn params() -> VoiceParams {
    VoiceParams::new("af_sarah", 1.0, "en-us")
}

fn options(workers: usize, policy: FailurePolicy) -> DispatchOptions {
    DispatchOptions {
        max_workers: Some(workers),
        failure_policy: policy,
        segment_dir: None,
    }
}

fn numbered_transcript(lines: usize) -> String {
    (1..=lines)
        .map(|i| format!("Line number {} {}", i, "x".repeat(i % 7)))
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn test_synthesize_all_withRandomDelays_shouldReturnSegmentsInTranscriptOrder() -> Result<()> {
    let engine = mock_voice().with_random_delay(15);
    let dispatcher = SynthesisDispatcher::new(as_voice_engine(&engine), options(4, FailurePolicy::Strict));
    let transcript = numbered_transcript(20);

    let report = dispatcher.synthesize_all(&transcript, &params()).await?;

    assert_eq!(report.segments.len(), 20);
    for (position, (segment, line)) in report.segments.iter().zip(transcript.lines()).enumerate() {
        assert_eq!(segment.sequence_number, position + 1);
        assert_eq!(segment.samples.len(), engine.expected_samples(line));
        assert_eq!(segment.status, SegmentStatus::Synthesized);
    }
    assert_eq!(engine.calls(), 20);
    Ok(())
}

#[tokio::test]
async fn test_synthesize_all_shouldNeverExceedWorkerCount() -> Result<()> {
    let engine = mock_voice().with_random_delay(5);
    let dispatcher = SynthesisDispatcher::new(as_voice_engine(&engine), options(3, FailurePolicy::Strict));

    dispatcher.synthesize_all(&numbered_transcript(12), &params()).await?;

    assert!(engine.peak_concurrency() <= 3);
    assert_eq!(dispatcher.workers(), 3);
    Ok(())
}

#[tokio::test]
async fn test_synthesize_all_withSerialEngine_shouldRunOneAtATime() -> Result<()> {
    let engine = mock_voice().with_random_delay(3).with_concurrency_limit(1);
    let dispatcher = SynthesisDispatcher::new(as_voice_engine(&engine), options(8, FailurePolicy::Strict));

    let report = dispatcher.synthesize_all(&numbered_transcript(6), &params()).await?;

    assert_eq!(report.workers, 1);
    assert_eq!(engine.peak_concurrency(), 1);
    Ok(())
}

#[tokio::test]
async fn test_continue_policy_withOneFailure_shouldAssembleSilenceForIt() -> Result<()> {
    let engine = mock_voice().failing_on("BROKEN");
    let dispatcher = SynthesisDispatcher::new(as_voice_engine(&engine), options(3, FailurePolicy::Continue));

    let report = dispatcher
        .synthesize_all("First line\nBROKEN line\nThird line", &params())
        .await?;

    assert_eq!(report.segments.len(), 3);
    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].unit, 2);

    let assembled = assemble(&report.segments, None)?;
    assert_eq!(assembled.timeline.len(), 3);
    assert_eq!(assembled.timeline[1].duration_seconds(), 0.0);

    let others = report.segments[0].duration_seconds() + report.segments[2].duration_seconds();
    assert!((assembled.duration_seconds() - others).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn test_strict_policy_withOneFailure_shouldFailBatchNamingUnit() {
    let engine = mock_voice().failing_on("BROKEN");
    let dispatcher = SynthesisDispatcher::new(as_voice_engine(&engine), options(2, FailurePolicy::Strict));

    let result = dispatcher
        .synthesize_all("First line\nBROKEN line\nThird line", &params())
        .await;

    match result {
        Err(SynthesisError::UnitsFailed(failures)) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].unit, 2);
        }
        other => panic!("expected UnitsFailed, got {:?}", other.map(|r| r.segments.len())),
    }
    // the other units still ran to completion
    assert_eq!(engine.calls(), 3);
}

#[tokio::test]
async fn test_strict_policy_withSeveralFailures_shouldListEveryFailedUnit() {
    let engine = mock_voice().failing_on("BROKEN");
    let dispatcher = SynthesisDispatcher::new(as_voice_engine(&engine), options(1, FailurePolicy::Strict));

    let result = dispatcher
        .synthesize_all("BROKEN first\nSecond line\nBROKEN third\nFourth line", &params())
        .await;

    match result {
        Err(SynthesisError::UnitsFailed(failures)) => {
            let units: Vec<_> = failures.iter().map(|f| f.unit).collect();
            assert_eq!(units, vec![1, 3]);
        }
        other => panic!("expected UnitsFailed, got {:?}", other.map(|r| r.segments.len())),
    }
    assert_eq!(engine.calls(), 4);
}

#[tokio::test]
async fn test_synthesize_all_withSegmentDir_shouldResumeMatchingSegments() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let segment_dir = dir.path().join("segments");
    let transcript = "One\nTwo\nThree";

    let first_engine = mock_voice();
    let dispatch = |engine| {
        SynthesisDispatcher::new(
            engine,
            DispatchOptions {
                max_workers: Some(2),
                failure_policy: FailurePolicy::Strict,
                segment_dir: Some(segment_dir.clone()),
            },
        )
    };

    let first = dispatch(as_voice_engine(&first_engine)).synthesize_all(transcript, &params()).await?;
    assert_eq!(first.resumed_count(), 0);
    assert!(segment_dir.join("slide_1.wav").exists());

    // same text, one line changed
    let second_engine = mock_voice();
    let second = dispatch(as_voice_engine(&second_engine))
        .synthesize_all("One\nTwo changed\nThree", &params())
        .await?;

    assert_eq!(second.resumed_count(), 2);
    assert_eq!(second_engine.calls(), 1);
    assert_eq!(second.segments[1].status, SegmentStatus::Synthesized);
    assert_eq!(second.segments[0].samples, first.segments[0].samples);
    assert_eq!(second.segments[0].sample_rate, MOCK_SAMPLE_RATE);
    Ok(())
}

#[tokio::test]
async fn test_synthesize_all_shouldReportProgressForEveryUnit() -> Result<()> {
    let (reporter, events) = common::collecting_reporter();
    let engine = mock_voice().with_random_delay(2);
    let dispatcher =
        SynthesisDispatcher::new(as_voice_engine(&engine), options(4, FailurePolicy::Strict)).with_progress(reporter);

    dispatcher.synthesize_all(&numbered_transcript(5), &params()).await?;

    let events = events.lock().clone();
    assert_eq!(
        events.first(),
        Some(&ProgressEvent::StageStarted { stage: Stage::Synthesis, total: 5 })
    );
    assert_eq!(events.last(), Some(&ProgressEvent::StageFinished { stage: Stage::Synthesis }));
    let completed: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::UnitCompleted { completed, .. } => Some(*completed),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![1, 2, 3, 4, 5]);
    Ok(())
}

#[test]
fn test_assemble_shouldBuildContiguousTimeline() -> Result<()> {
    let segments = vec![
        AudioSegment::new(1, vec![0.1; 8_000], 8_000),
        AudioSegment::new(2, vec![0.2; 4_000], 8_000),
        AudioSegment::new(3, vec![0.3; 12_000], 8_000),
    ];

    let assembled = assemble(&segments, None)?;

    assert_eq!(assembled.timeline[0].start_seconds, 0.0);
    for pair in assembled.timeline.windows(2) {
        assert_eq!(pair[0].end_seconds, pair[1].start_seconds);
    }
    let last = assembled.timeline.last().map(|e| e.end_seconds).unwrap_or_default();
    assert_eq!(last, assembled.duration_seconds());
    assert_eq!(assembled.duration_seconds(), 3.0);
    Ok(())
}

#[test]
fn test_assemble_withMixedRates_shouldResampleToTarget() -> Result<()> {
    let segments = vec![
        AudioSegment::new(1, vec![0.0; 24_000], 24_000),
        AudioSegment::new(2, vec![0.0; 16_000], 16_000),
    ];

    let assembled = assemble(&segments, Some(24_000))?;

    assert_eq!(assembled.sample_rate, 24_000);
    assert_eq!(assembled.samples.len(), 48_000);
    assert!((assembled.timeline[1].duration_seconds() - 1.0).abs() < 1e-3);
    Ok(())
}

#[test]
fn test_assemble_withGap_shouldReportAlignmentError() {
    let segments = vec![
        AudioSegment::new(1, vec![0.0; 10], 8_000),
        AudioSegment::new(3, vec![0.0; 10], 8_000),
    ];

    assert_eq!(
        assemble(&segments, None),
        Err(AlignmentError::SequenceGap { expected: 2, found: 3 })
    );
}

#[tokio::test]
async fn test_dispatcher_shouldBeShareableAcrossTasks() -> Result<()> {
    let engine = mock_voice();
    let dispatcher = Arc::new(SynthesisDispatcher::new(
        as_voice_engine(&engine),
        options(2, FailurePolicy::Strict),
    ));

    let handle = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.synthesize_all("a\nb", &params()).await })
    };
    let report = handle.await??;

    assert_eq!(report.segments.len(), 2);
    Ok(())
}
