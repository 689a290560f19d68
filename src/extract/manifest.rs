use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::path::Path;

use crate::content::ContentUnit;
use crate::extract::{DocumentDirectives, DocumentExtractor, ExtractedDocument};

/// Reads page-records JSON.
///
/// The file is an array of `{page, text_content, visuals}` records. A leading
/// record without `page` may carry `instructions` and `prompt` overrides.
/// Relative visual paths are resolved against the file's directory.
#[derive(Debug, Clone, Default)]
pub struct ManifestExtractor;

impl ManifestExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Parse page records from a JSON string
    pub fn parse(json: &str, base_dir: &Path) -> Result<ExtractedDocument> {
        let records: Vec<Value> = serde_json::from_str(json).context("Page records must be a JSON array")?;

        let mut directives = DocumentDirectives::default();
        let mut units = Vec::with_capacity(records.len());

        for (position, record) in records.into_iter().enumerate() {
            if record.get("page").is_none() {
                if position == 0 {
                    directives = serde_json::from_value(record).context("Invalid directives record")?;
                    continue;
                }
                return Err(anyhow!("Record {} has no page number", position + 1));
            }

            let mut unit: ContentUnit =
                serde_json::from_value(record).with_context(|| format!("Invalid page record {}", position + 1))?;
            for visual in &mut unit.visuals {
                if visual.path.is_relative() {
                    visual.path = base_dir.join(&visual.path);
                }
            }
            units.push(unit);
        }

        units.sort_by_key(|u| u.index);
        let document = ExtractedDocument { units, directives };
        document.validate()?;
        Ok(document)
    }
}

#[async_trait]
impl DocumentExtractor for ManifestExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedDocument> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read page records {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let document = Self::parse(&json, base_dir)?;
        debug!("Loaded {} page records from {}", document.units.len(), path.display());
        Ok(document)
    }
}
