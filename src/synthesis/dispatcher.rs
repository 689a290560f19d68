/*!
 * Parallel synthesis dispatcher.
 *
 * Splits a transcript into synthesis units and runs the voice engine over
 * them with bounded concurrency. Results are collected after every task has
 * finished and sorted back into transcript order, so completion order never
 * leaks into the output. Failures are isolated per unit and handled according
 * to the configured failure policy.
 */

use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::Semaphore;

use crate::app_config::{FailurePolicy, OutputEncoding};
use crate::audio::segment::{AudioSegment, SegmentStatus};
use crate::audio::wav::{read_mono, write_mono};
use crate::errors::{SynthesisError, UnitFailure};
use crate::progress::{ProgressReporter, Stage};
use crate::script::transcript::{SynthesisUnit, split_into_units};
use crate::voice::{VoiceEngine, VoiceParams};

/// Options that shape a dispatch run
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Upper bound on concurrent engine calls; defaults to available parallelism
    pub max_workers: Option<usize>,
    pub failure_policy: FailurePolicy,
    /// Where per-unit files are written and resumed from
    pub segment_dir: Option<PathBuf>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            max_workers: None,
            failure_policy: FailurePolicy::Strict,
            segment_dir: None,
        }
    }
}

/// Outcome of a dispatch run, ordered by sequence number
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub segments: Vec<AudioSegment>,
    /// Number of workers used
    pub workers: usize,
}

impl DispatchReport {
    /// Units that failed (only populated under the continue policy)
    pub fn failures(&self) -> Vec<UnitFailure> {
        self.segments
            .iter()
            .filter_map(|s| match &s.status {
                SegmentStatus::Failed { cause } => Some(UnitFailure {
                    unit: s.sequence_number,
                    cause: cause.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn resumed_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| s.status == SegmentStatus::Resumed)
            .count()
    }
}

/// Number of workers for an engine.
///
/// The configured maximum (or the machine's parallelism) capped by the
/// engine's own limit, never below one.
pub fn worker_count(configured: Option<usize>, engine_limit: Option<usize>) -> usize {
    let base = configured.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    engine_limit.map_or(base, |limit| base.min(limit)).max(1)
}

/// File name of a unit's audio inside the segment directory
pub fn segment_file_name(sequence_number: usize) -> String {
    format!("slide_{}.wav", sequence_number)
}

/// Content hash of one unit's synthesis inputs
pub fn unit_hash(engine: &str, text: &str, params: &VoiceParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(engine.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    hasher.update([0u8]);
    hasher.update(params.voice.as_bytes());
    hasher.update([0u8]);
    hasher.update(params.speed.to_le_bytes());
    hasher.update(params.language.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn hash_path(wav: &Path) -> PathBuf {
    let mut name = wav.as_os_str().to_owned();
    name.push(".sha256");
    PathBuf::from(name)
}

/// Reuse a per-unit file from an earlier run when its hash matches
fn try_resume(wav: &Path, hash: &str) -> Option<(Vec<f32>, u32)> {
    let stored = std::fs::read_to_string(hash_path(wav)).ok()?;
    if stored.trim() != hash {
        return None;
    }
    match read_mono(wav) {
        Ok(audio) => Some(audio),
        Err(e) => {
            warn!("Ignoring unreadable segment {}: {}", wav.display(), e);
            None
        }
    }
}

fn store_segment(wav: &Path, hash: &str, samples: &[f32], sample_rate: u32) -> anyhow::Result<()> {
    // the hash is written last so a partial wav is never considered complete
    let _ = std::fs::remove_file(hash_path(wav));
    write_mono(wav, samples, sample_rate, OutputEncoding::Float32)?;
    std::fs::write(hash_path(wav), hash)?;
    Ok(())
}

/// Runs a voice engine over transcript lines concurrently
#[derive(Debug)]
pub struct SynthesisDispatcher {
    engine: Arc<dyn VoiceEngine>,
    options: DispatchOptions,
    progress: ProgressReporter,
}

impl SynthesisDispatcher {
    pub fn new(engine: Arc<dyn VoiceEngine>, options: DispatchOptions) -> Self {
        Self {
            engine,
            options,
            progress: ProgressReporter::silent(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Number of workers this dispatcher will use
    pub fn workers(&self) -> usize {
        worker_count(self.options.max_workers, self.engine.concurrency_limit())
    }

    /// Synthesize every non-empty line of `transcript`
    pub async fn synthesize_all(&self, transcript: &str, params: &VoiceParams) -> Result<DispatchReport, SynthesisError> {
        self.synthesize_units(split_into_units(transcript), params).await
    }

    /// Synthesize pre-split units
    pub async fn synthesize_units(
        &self,
        units: Vec<SynthesisUnit>,
        params: &VoiceParams,
    ) -> Result<DispatchReport, SynthesisError> {
        params.validate()?;

        if let Some(dir) = &self.options.segment_dir {
            std::fs::create_dir_all(dir)
                .map_err(|e| SynthesisError::Storage(format!("{}: {}", dir.display(), e)))?;
        }

        let total = units.len();
        let workers = self.workers();
        info!(
            "Synthesizing {} units with {} using {} workers",
            total,
            self.engine.name(),
            workers
        );
        self.progress.stage_started(Stage::Synthesis, total);

        let semaphore = Arc::new(Semaphore::new(workers));
        let completed = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let mut results = stream::iter(units)
            .map(|unit| {
                let engine = Arc::clone(&self.engine);
                let semaphore = Arc::clone(&semaphore);
                let completed = Arc::clone(&completed);
                let progress = self.progress.clone();
                let segment_dir = self.options.segment_dir.clone();
                let params = params.clone();

                async move {
                    let result = match semaphore.acquire().await {
                        Ok(_permit) => synthesize_unit(engine.as_ref(), &unit, &params, segment_dir.as_deref()).await,
                        Err(e) => Err(format!("worker pool closed: {}", e)),
                    };

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    progress.unit_completed(Stage::Synthesis, done, total);
                    (unit.sequence_number, result)
                }
            })
            .buffer_unordered(workers)
            .collect::<Vec<_>>()
            .await;

        // Sort results by sequence number to restore transcript order
        results.sort_by_key(|(sequence_number, _)| *sequence_number);
        self.progress.stage_finished(Stage::Synthesis);

        let mut segments = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (sequence_number, result) in results {
            match result {
                Ok(segment) => segments.push(segment),
                Err(cause) => {
                    error!("Unit {} failed to synthesize: {}", sequence_number, cause);
                    failures.push(UnitFailure {
                        unit: sequence_number,
                        cause: cause.clone(),
                    });
                    segments.push(AudioSegment::failed(sequence_number, 0, cause));
                }
            }
        }

        info!(
            "Synthesis finished in {:.1}s: {} ok, {} failed",
            start.elapsed().as_secs_f64(),
            total - failures.len(),
            failures.len()
        );

        if !failures.is_empty() && self.options.failure_policy == FailurePolicy::Strict {
            return Err(SynthesisError::UnitsFailed(failures));
        }

        Ok(DispatchReport { segments, workers })
    }
}

async fn synthesize_unit(
    engine: &dyn VoiceEngine,
    unit: &SynthesisUnit,
    params: &VoiceParams,
    segment_dir: Option<&Path>,
) -> Result<AudioSegment, String> {
    let target = segment_dir.map(|dir| dir.join(segment_file_name(unit.sequence_number)));
    let hash = unit_hash(engine.name(), &unit.text, params);

    if let Some(wav) = &target {
        if let Some((samples, sample_rate)) = try_resume(wav, &hash) {
            debug!("Unit {} resumed from {}", unit.sequence_number, wav.display());
            return Ok(AudioSegment::new(unit.sequence_number, samples, sample_rate).with_status(SegmentStatus::Resumed));
        }
    }

    let audio = engine
        .synthesize(&unit.text, params)
        .await
        .map_err(|e| e.to_string())?;
    debug!(
        "Unit {} synthesized: {:.2}s",
        unit.sequence_number,
        audio.duration_seconds()
    );

    if let Some(wav) = &target {
        if let Err(e) = store_segment(wav, &hash, &audio.samples, audio.sample_rate) {
            warn!("Failed to store segment {}: {}", wav.display(), e);
        }
    }

    Ok(AudioSegment::new(unit.sequence_number, audio.samples, audio.sample_rate))
}
