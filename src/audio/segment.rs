use serde::{Deserialize, Serialize};

/// How a segment came to be
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SegmentStatus {
    /// Produced by the engine during this run
    Synthesized,
    /// Reused from a previous run's per-unit file
    Resumed,
    /// Synthesis failed; the segment is a zero-length placeholder
    Failed { cause: String },
}

/// Audio for one synthesis unit
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    pub sequence_number: usize,
    /// Mono samples
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub status: SegmentStatus,
}

impl AudioSegment {
    pub fn new(sequence_number: usize, samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            sequence_number,
            samples,
            sample_rate,
            status: SegmentStatus::Synthesized,
        }
    }

    /// Zero-duration stand-in for a unit that failed
    pub fn failed(sequence_number: usize, sample_rate: u32, cause: impl Into<String>) -> Self {
        Self {
            sequence_number,
            samples: Vec::new(),
            sample_rate,
            status: SegmentStatus::Failed { cause: cause.into() },
        }
    }

    pub fn with_status(mut self, status: SegmentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, SegmentStatus::Failed { .. })
    }
}

/// Position of one unit in the combined audio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub unit: usize,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl TimelineEntry {
    pub fn duration_seconds(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }
}
