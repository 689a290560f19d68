/*!
 * Content unit model.
 *
 * A content unit is the normalized record of one slide/page: its position in
 * the deck, its extracted text and the visuals that were materialized on disk
 * by the document extractor. Units are read-only once extracted.
 */

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of visual attached to a content unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VisualKind {
    /// Raster image stored on disk
    #[default]
    Image,
}

/// Reference to a visual that has already been written to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualRef {
    /// Path of the materialized file
    #[serde(rename = "file_path", alias = "uri", alias = "path")]
    pub path: PathBuf,

    /// Kind of visual
    #[serde(rename = "type", default)]
    pub kind: VisualKind,
}

impl VisualRef {
    /// Create an image reference
    pub fn image(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: VisualKind::Image,
        }
    }
}

/// One slide/page worth of material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentUnit {
    /// 1-based position in the deck
    #[serde(rename = "page")]
    pub index: usize,

    /// Extracted text, possibly empty
    #[serde(rename = "text_content", default)]
    pub text: String,

    /// Visuals in page order
    #[serde(default)]
    pub visuals: Vec<VisualRef>,
}

impl ContentUnit {
    /// Create a unit without visuals
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            visuals: Vec::new(),
        }
    }

    /// Builder-style helper to attach a visual
    pub fn with_visual(mut self, visual: VisualRef) -> Self {
        self.visuals.push(visual);
        self
    }

    /// Whether the unit carries any text worth scripting
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Check that units are numbered 1..N in order
pub fn validate_ordering(units: &[ContentUnit]) -> Result<(), String> {
    for (position, unit) in units.iter().enumerate() {
        if unit.index != position + 1 {
            return Err(format!(
                "content unit at position {} has index {} (expected {})",
                position + 1,
                unit.index,
                position + 1
            ));
        }
    }
    Ok(())
}
