use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};

// @module: File and directory utilities

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_file()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path).with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(())
    }

    /// Read a file to a string
    pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
        fs::read_to_string(&path).with_context(|| format!("Failed to read file: {:?}", path.as_ref()))
    }

    /// Write a string to a file
    pub fn write_to_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        // Ensure the parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                Self::ensure_dir(parent)?;
            }
        }

        fs::write(&path, content).with_context(|| format!("Failed to write to file: {:?}", path.as_ref()))
    }
}

/// Locations of every artifact produced for one input document.
///
/// All names derive from the input's base name inside the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub output_dir: PathBuf,
    pub base_name: String,
    /// Page records JSON
    pub records: PathBuf,
    pub transcript: PathBuf,
    pub audio: PathBuf,
    pub timeline: PathBuf,
    /// Per-unit audio files, kept for resume
    pub segments_dir: PathBuf,
    /// Extracted images
    pub visuals_dir: PathBuf,
}

impl OutputPaths {
    // @params: input document, output directory (defaults to the input's directory)
    pub fn for_input(input: &Path, output_dir: Option<&Path>) -> Result<Self> {
        let base_name = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("Cannot derive output names from {:?}", input))?;

        let output_dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => input
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };

        Ok(Self {
            records: output_dir.join(format!("{}.json", base_name)),
            transcript: output_dir.join(format!("{}.txt", base_name)),
            audio: output_dir.join(format!("{}.wav", base_name)),
            timeline: output_dir.join(format!("{}.timestamps.json", base_name)),
            segments_dir: output_dir.join(format!("{}_segments", base_name)),
            visuals_dir: output_dir.join(format!("{}_visuals", base_name)),
            output_dir,
            base_name,
        })
    }

    /// Override where extracted images go
    pub fn with_visuals_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.visuals_dir = dir.into();
        self
    }

    /// Whether `input` is this document's own page-records file
    pub fn is_records_file(&self, input: &Path) -> bool {
        match (fs::canonicalize(input), fs::canonicalize(&self.records)) {
            (Ok(a), Ok(b)) => a == b,
            _ => input == self.records,
        }
    }
}
