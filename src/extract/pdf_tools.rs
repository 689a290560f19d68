/*!
 * PDF extraction through the poppler command line tools.
 *
 * `pdfinfo` gives the page count, `pdftotext` the text of each page and
 * `pdfimages` the embedded images. Images are renamed to
 * `page_<n>_img_<i>.png` inside the visuals directory.
 */

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use walkdir::WalkDir;

use crate::content::{ContentUnit, VisualRef};
use crate::extract::{DocumentDirectives, DocumentExtractor, ExtractedDocument};

/// `Pages:` line of pdfinfo output
static PAGES_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^Pages:\s+(\d+)\s*$").unwrap()
});

/// Files written by `pdfimages -p`: `<prefix>-<page>-<number>.png`
static PDFIMAGES_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^raw-(\d+)-(\d+)\.png$").unwrap()
});

/// Extractor for PDF decks
#[derive(Debug, Clone)]
pub struct PdfToolsExtractor {
    visuals_dir: PathBuf,
    timeout: Duration,
}

impl PdfToolsExtractor {
    pub fn new(visuals_dir: impl Into<PathBuf>) -> Self {
        Self {
            visuals_dir: visuals_dir.into(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run a tool and return its stdout
    async fn run_tool(&self, program: &str, args: &[&str]) -> Result<String> {
        // a timed-out tool is killed when the future is dropped
        let future = Command::new(program).args(args).kill_on_drop(true).output();

        let output = tokio::select! {
            result = future => {
                result.map_err(|e| anyhow!("Failed to execute {} (is poppler-utils installed?): {}", program, e))?
            },
            _ = tokio::time::sleep(self.timeout) => {
                return Err(anyhow!("{} timed out after {} seconds", program, self.timeout.as_secs()));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("{} failed: {}", program, stderr.trim());
            return Err(anyhow!("{} failed: {}", program, stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn page_count(&self, pdf: &str) -> Result<usize> {
        let info = self.run_tool("pdfinfo", &[pdf]).await?;
        parse_page_count(&info).ok_or_else(|| anyhow!("pdfinfo output has no page count"))
    }

    async fn page_text(&self, pdf: &str, page: usize) -> Result<String> {
        let page = page.to_string();
        let text = self
            .run_tool("pdftotext", &["-enc", "UTF-8", "-f", &page, "-l", &page, pdf, "-"])
            .await?;
        // form feed separates pages
        Ok(text.replace('\u{c}', "").trim().to_string())
    }

    async fn page_images(&self, pdf: &str) -> Result<BTreeMap<usize, Vec<PathBuf>>> {
        let staging = tempfile::Builder::new()
            .prefix("pdfimages-")
            .tempdir_in(&self.visuals_dir)
            .context("Failed to create image staging directory")?;
        let prefix = staging.path().join("raw");
        let prefix = prefix.to_str().ok_or_else(|| anyhow!("Visuals path is not valid UTF-8"))?;

        self.run_tool("pdfimages", &["-png", "-p", pdf, prefix]).await?;

        let mut by_page: BTreeMap<usize, Vec<(usize, PathBuf)>> = BTreeMap::new();
        for entry in WalkDir::new(staging.path()).max_depth(1).into_iter().filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy();
            if let Some((page, number)) = parse_image_name(&name) {
                by_page.entry(page).or_default().push((number, entry.path().to_path_buf()));
            }
        }

        let mut images = BTreeMap::new();
        for (page, mut files) in by_page {
            files.sort_by_key(|(number, _)| *number);
            let mut moved = Vec::with_capacity(files.len());
            for (i, (_, source)) in files.into_iter().enumerate() {
                let target = self.visuals_dir.join(format!("page_{}_img_{}.png", page, i + 1));
                std::fs::rename(&source, &target)
                    .with_context(|| format!("Failed to move {} to {}", source.display(), target.display()))?;
                moved.push(target);
            }
            images.insert(page, moved);
        }
        Ok(images)
    }
}

/// Page count from pdfinfo output
pub fn parse_page_count(info: &str) -> Option<usize> {
    PAGES_REGEX
        .captures(info)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Page and image number from a pdfimages output file name
pub fn parse_image_name(name: &str) -> Option<(usize, usize)> {
    let captures = PDFIMAGES_REGEX.captures(name)?;
    let page = captures.get(1)?.as_str().parse().ok()?;
    let number = captures.get(2)?.as_str().parse().ok()?;
    Some((page, number))
}

#[async_trait]
impl DocumentExtractor for PdfToolsExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedDocument> {
        if !path.exists() {
            return Err(anyhow!("Input document not found: {}", path.display()));
        }
        std::fs::create_dir_all(&self.visuals_dir)
            .with_context(|| format!("Failed to create visuals directory {}", self.visuals_dir.display()))?;
        let pdf = path.to_str().ok_or_else(|| anyhow!("Input path is not valid UTF-8"))?;

        let pages = self.page_count(pdf).await?;
        info!("Extracting {} pages from {}", pages, path.display());

        let mut images = match self.page_images(pdf).await {
            Ok(images) => images,
            Err(e) => {
                warn!("Image extraction failed, continuing with text only: {}", e);
                BTreeMap::new()
            }
        };

        let mut units = Vec::with_capacity(pages);
        for page in 1..=pages {
            let text = self.page_text(pdf, page).await?;
            let visuals = images
                .remove(&page)
                .unwrap_or_default()
                .into_iter()
                .map(VisualRef::image)
                .collect::<Vec<_>>();
            debug!("Page {}: {} chars, {} images", page, text.len(), visuals.len());
            units.push(ContentUnit {
                index: page,
                text,
                visuals,
            });
        }

        Ok(ExtractedDocument {
            units,
            directives: DocumentDirectives::default(),
        })
    }
}
