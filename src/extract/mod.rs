/*!
 * Document extraction.
 *
 * Extractors turn an input document into ordered content units with their
 * visuals materialized on disk:
 * - `manifest`: page-records JSON written by a previous run or by hand
 * - `pdf_tools`: PDF decks through the poppler command line tools
 */

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::Path;

use crate::content::{ContentUnit, validate_ordering};

pub mod manifest;
pub mod pdf_tools;

pub use manifest::ManifestExtractor;
pub use pdf_tools::PdfToolsExtractor;

/// Optional per-document overrides for the lecture instruction and prompt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDirectives {
    #[serde(default, rename = "instructions", skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl DocumentDirectives {
    pub fn is_empty(&self) -> bool {
        self.instruction.is_none() && self.prompt.is_none()
    }
}

/// Result of extracting one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedDocument {
    pub units: Vec<ContentUnit>,
    pub directives: DocumentDirectives,
}

impl ExtractedDocument {
    /// Check that units are numbered 1..N
    pub fn validate(&self) -> Result<()> {
        validate_ordering(&self.units).map_err(|e| anyhow!("Invalid content units: {}", e))
    }

    /// Write the page records JSON (directives first when present)
    pub fn write_page_records(&self, path: &Path) -> Result<()> {
        let mut records = Vec::with_capacity(self.units.len() + 1);
        if !self.directives.is_empty() {
            records.push(serde_json::to_value(&self.directives)?);
        }
        for unit in &self.units {
            records.push(serde_json::to_value(unit)?);
        }

        let json = serde_json::to_string_pretty(&records).context("Failed to serialize page records")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write page records to {}", path.display()))
    }
}

/// Common trait for document extractors
#[async_trait]
pub trait DocumentExtractor: Send + Sync + Debug {
    /// Extract ordered content units from `path`
    async fn extract(&self, path: &Path) -> Result<ExtractedDocument>;
}

/// Pick an extractor for the input by its extension
pub fn extractor_for(path: &Path, visuals_dir: &Path) -> Result<Box<dyn DocumentExtractor>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => Ok(Box::new(PdfToolsExtractor::new(visuals_dir))),
        "json" => Ok(Box::new(ManifestExtractor::new())),
        other => Err(anyhow!(
            "Unsupported input type '{}' for {} (expected .pdf or .json)",
            other,
            path.display()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::VisualRef;
    use tempfile::TempDir;

    #[test]
    fn test_extractor_for_unknown_extension_should_fail() {
        let visuals = Path::new("/tmp");
        assert!(extractor_for(Path::new("deck.pdf"), visuals).is_ok());
        assert!(extractor_for(Path::new("deck.JSON"), visuals).is_ok());
        assert!(extractor_for(Path::new("deck.pptx"), visuals).is_err());
    }

    #[tokio::test]
    async fn test_page_records_should_be_readable_by_manifest_extractor() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deck.json");
        let document = ExtractedDocument {
            units: vec![
                ContentUnit::new(1, "Intro").with_visual(VisualRef::image(dir.path().join("a.png"))),
                ContentUnit::new(2, ""),
            ],
            directives: DocumentDirectives {
                instruction: Some("persona".into()),
                prompt: None,
            },
        };

        document.write_page_records(&path).unwrap();
        let read = ManifestExtractor::new().extract(&path).await.unwrap();

        assert_eq!(read, document);
    }
}
