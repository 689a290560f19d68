/*!
 * # slidecast - narrated lectures from slide decks
 *
 * A Rust library that turns a slide deck into a spoken lecture.
 *
 * ## Features
 *
 * - Extract page text and images from PDF decks (poppler tools) or page-records JSON
 * - Script every slide with a language model, chained on the previous slide:
 *   - OpenAI API
 *   - Anthropic API
 *   - Ollama (local LLM)
 * - Synthesize the transcript concurrently with a hosted or local speech backend
 * - Assemble one audio file with a per-line timestamp index
 * - Resume interrupted runs from per-line audio files
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `content`: the content unit model
 * - `extract`: document extractors
 * - `script`: request composition, transcript model and the generation loop
 * - `providers`: script provider clients
 * - `voice`: speech synthesis engines
 * - `synthesis`: the parallel synthesis dispatcher
 * - `audio`: resampling, WAV I/O, assembly and timestamps
 * - `app_config`: the settings store
 * - `app_controller`: the end-to-end pipeline
 * - `progress`: stage progress callbacks
 * - `file_utils`: output naming and file system helpers
 * - `language_utils`: ISO language code utilities
 * - `errors`: custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod audio;
pub mod content;
pub mod errors;
pub mod extract;
pub mod file_utils;
pub mod language_utils;
pub mod progress;
pub mod providers;
pub mod script;
pub mod synthesis;
pub mod voice;

// Re-export main types for easier usage
pub use app_config::SettingsManager;
pub use app_controller::{Controller, RunOptions, RunSummary};
pub use content::{ContentUnit, VisualRef};
pub use errors::{AlignmentError, AppError, CompositionError, ProviderError, ScriptError, SettingsError, SynthesisError};
pub use language_utils::{get_language_name, prompt_language_name};
