/*!
 * Common test utilities for the slidecast test suite
 */

use anyhow::Result;
use image::{ImageBuffer, Rgb};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use slidecast::app_config::SettingsManager;
use slidecast::progress::{ProgressEvent, ProgressReporter};

// Re-export the mock providers module
pub mod mock_providers;

/// Route log output through the test harness; RUST_LOG controls the level
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Writes a small solid-color PNG
pub fn create_test_png(dir: &Path, filename: &str) -> Result<PathBuf> {
    let path = dir.join(filename);
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(8, 6, Rgb([20, 120, 220]));
    img.save(&path)?;
    Ok(path)
}

/// Settings manager over a settings file written with `content`, rooted at `dir`
pub fn create_settings(dir: &Path, content: &Value) -> Result<SettingsManager> {
    let path = create_test_file(dir, "settings.json", &serde_json::to_string_pretty(content)?)?;
    Ok(SettingsManager::new(path, Some(dir.to_path_buf())))
}

/// Page records for a three-slide deck whose second slide is blank
pub fn sample_page_records(visual: Option<&Path>) -> Value {
    let visuals = match visual {
        Some(path) => json!([{"type": "image", "file_path": path}]),
        None => json!([]),
    };
    json!([
        {"page": 1, "text_content": "Welcome to thermodynamics", "visuals": visuals},
        {"page": 2, "text_content": "   ", "visuals": []},
        {"page": 3, "text_content": "The first law", "visuals": []}
    ])
}

/// Writes page records as `<name>` in `dir`
pub fn create_page_records(dir: &Path, name: &str, records: &Value) -> Result<PathBuf> {
    create_test_file(dir, name, &serde_json::to_string_pretty(records)?)
}

/// Progress reporter that records every event
pub fn collecting_reporter() -> (ProgressReporter, Arc<Mutex<Vec<ProgressEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let reporter = ProgressReporter::new(move |event| sink.lock().push(event));
    (reporter, events)
}
