/*!
 * Audio assembly and timestamp building.
 *
 * Concatenates ordered segments into one buffer at a single sample rate and
 * derives a contiguous timeline: each unit starts where the previous one
 * ended, the first starts at 0.0 and the last ends at the total duration.
 */

use anyhow::{Context, Result};
use log::{debug, info};
use std::path::Path;

use crate::app_config::OutputEncoding;
use crate::audio::resample::resample_mono;
use crate::audio::segment::{AudioSegment, TimelineEntry};
use crate::audio::wav::write_mono;
use crate::errors::AlignmentError;

/// Combined lecture audio with its timeline
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub timeline: Vec<TimelineEntry>,
}

impl AssembledAudio {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Write the combined audio as WAV
    pub fn write(&self, path: &Path, encoding: OutputEncoding) -> Result<()> {
        write_mono(path, &self.samples, self.sample_rate, encoding)
            .with_context(|| format!("Failed to write audio to {}", path.display()))?;
        info!(
            "Wrote {:.1}s of audio to {}",
            self.duration_seconds(),
            path.display()
        );
        Ok(())
    }

    /// Persist the timeline as pretty JSON
    pub fn write_timeline(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.timeline).context("Failed to serialize timeline")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write timeline to {}", path.display()))
    }
}

/// Concatenate segments numbered 1..N into one buffer and build the timeline.
///
/// `target_rate` defaults to the rate of the first non-empty segment.
/// Segments at other rates are resampled; a segment that cannot be converted
/// is an alignment error rather than being dropped.
pub fn assemble(segments: &[AudioSegment], target_rate: Option<u32>) -> Result<AssembledAudio, AlignmentError> {
    for (position, segment) in segments.iter().enumerate() {
        if segment.sequence_number != position + 1 {
            return Err(AlignmentError::SequenceGap {
                expected: position + 1,
                found: segment.sequence_number,
            });
        }
    }

    let sample_rate = target_rate
        .or_else(|| {
            segments
                .iter()
                .find(|s| !s.samples.is_empty())
                .map(|s| s.sample_rate)
        })
        .or_else(|| segments.first().map(|s| s.sample_rate))
        .unwrap_or(0);

    let capacity = segments.iter().map(|s| s.samples.len()).sum();
    let mut samples: Vec<f32> = Vec::with_capacity(capacity);
    let mut timeline = Vec::with_capacity(segments.len());

    for segment in segments {
        let start_len = samples.len();

        if segment.sample_rate == sample_rate {
            samples.extend_from_slice(&segment.samples);
        } else if !segment.samples.is_empty() {
            debug!(
                "Resampling segment {} from {} Hz to {} Hz",
                segment.sequence_number, segment.sample_rate, sample_rate
            );
            let converted = resample_mono(&segment.samples, segment.sample_rate, sample_rate).map_err(|reason| {
                AlignmentError::SampleRateMismatch {
                    unit: segment.sequence_number,
                    expected: sample_rate,
                    found: segment.sample_rate,
                    reason,
                }
            })?;
            samples.extend(converted);
        }

        // positions come from the cumulative sample count so the timeline
        // never drifts from the buffer
        timeline.push(TimelineEntry {
            unit: segment.sequence_number,
            start_seconds: seconds(start_len, sample_rate),
            end_seconds: seconds(samples.len(), sample_rate),
        });
    }

    Ok(AssembledAudio {
        samples,
        sample_rate,
        timeline,
    })
}

fn seconds(samples: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    samples as f64 / sample_rate as f64
}
