/*!
 * Error types for the slidecast pipeline.
 *
 * This module contains custom error types for each stage of the lecture
 * pipeline, using the thiserror crate for ergonomic error definitions.
 * Unit-scoped errors carry the unit they belong to so that a failure can be
 * reported without aborting sibling units.
 */

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when talking to a script or voice provider
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The call did not finish within the configured timeout
    #[error("Provider call timed out after {0} seconds")]
    Timeout(u64),

    /// Invalid parameters passed to the provider
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The local model runtime could not be initialized or failed during inference
    #[error("Model runtime error: {0}")]
    Runtime(String),
}

impl ProviderError {
    /// Map a non-success HTTP status to the matching error variant
    pub fn from_status(status_code: u16, message: String) -> Self {
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            429 => Self::RateLimitExceeded(message),
            _ => Self::ApiError { status_code, message },
        }
    }
}

/// Errors raised while composing the provider request for one content unit
#[derive(Error, Debug)]
pub enum CompositionError {
    /// A visual referenced by the unit could not be loaded
    #[error("Unit {unit}: failed to load visual {path:?}: {reason}")]
    Visual {
        /// Index of the content unit
        unit: usize,
        /// Path of the visual
        path: PathBuf,
        /// Underlying cause
        reason: String,
    },
}

impl CompositionError {
    /// Index of the unit this error belongs to
    pub fn unit(&self) -> usize {
        match self {
            Self::Visual { unit, .. } => *unit,
        }
    }
}

/// Data-consistency errors between pipeline stages
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignmentError {
    /// The transcript does not have one line per scripted unit
    #[error("Transcript has {actual} lines but {expected} content units had text")]
    LineCountMismatch {
        /// Expected number of lines
        expected: usize,
        /// Actual number of non-empty lines
        actual: usize,
    },

    /// Segments handed to the assembler are not numbered 1..N in order
    #[error("Expected segment {expected} but found segment {found}")]
    SequenceGap {
        /// Expected sequence number
        expected: usize,
        /// Sequence number actually found
        found: usize,
    },

    /// Sample rates differ and cannot be reconciled
    #[error("Segment {unit} has sample rate {found} Hz, cannot convert to {expected} Hz: {reason}")]
    SampleRateMismatch {
        /// Sequence number of the segment
        unit: usize,
        /// Target sample rate
        expected: u32,
        /// Segment sample rate
        found: u32,
        /// Why conversion failed
        reason: String,
    },
}

/// A single unit's failure recorded by the script generator or the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct UnitFailure {
    /// Unit index or synthesis sequence number
    pub unit: usize,
    /// Rendered error cause
    pub cause: String,
}

impl std::fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unit {}: {}", self.unit, self.cause)
    }
}

fn join_failures(failures: &[UnitFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from the script generation stage
#[derive(Error, Debug)]
pub enum ScriptError {
    /// One or more units could not be scripted
    #[error("{} unit(s) failed to script: {}", .0.len(), join_failures(.0))]
    UnitsFailed(Vec<UnitFailure>),

    /// Generated transcript does not line up with the content units
    #[error("Alignment error: {0}")]
    Alignment(#[from] AlignmentError),

    /// Whole-document request failed
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Whole-document request could not be composed
    #[error("Composition error: {0}")]
    Composition(#[from] CompositionError),
}

/// Errors from the parallel synthesis stage
#[derive(Error, Debug)]
pub enum SynthesisError {
    /// Strict policy: at least one unit failed
    #[error("{} unit(s) failed to synthesize: {}", .0.len(), join_failures(.0))]
    UnitsFailed(Vec<UnitFailure>),

    /// Voice parameters were rejected before any work was scheduled
    #[error("Invalid voice parameters: {0}")]
    InvalidParameters(#[from] ProviderError),

    /// Segment directory could not be prepared
    #[error("Segment storage error: {0}")]
    Storage(String),
}

/// Errors from the settings store
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The settings file could not be read or written
    #[error("Settings I/O error at {path:?}: {reason}")]
    Io {
        /// Path of the settings file
        path: PathBuf,
        /// Underlying cause
        reason: String,
    },

    /// The settings file exists but is not valid JSON
    #[error("Settings file {0:?} is malformed; fix or remove it before updating")]
    Malformed(PathBuf),

    /// The key path is empty or traverses a non-object value
    #[error("Invalid settings key '{0}'")]
    InvalidKey(String),

    /// A value could not be (de)serialized
    #[error("Settings value error: {0}")]
    Value(String),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from script generation
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    /// Error from synthesis
    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    /// Error from assembly
    #[error("Alignment error: {0}")]
    Alignment(#[from] AlignmentError),

    /// Error from settings
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
