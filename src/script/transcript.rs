use serde::{Deserialize, Serialize};

use crate::errors::AlignmentError;

/// One line of the transcript, numbered densely from 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisUnit {
    pub sequence_number: usize,
    pub text: String,
}

/// Newline-delimited narration, one line per scripted unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    text: String,
}

impl Transcript {
    /// Wrap existing transcript text (read from disk or a provider)
    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Build a transcript from per-unit script lines
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let text = lines
            .into_iter()
            .map(|line| normalize_line(line.as_ref()))
            .collect::<Vec<_>>()
            .join("\n");
        Self { text }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of non-empty lines
    pub fn line_count(&self) -> usize {
        self.text.lines().filter(|l| !l.trim().is_empty()).count()
    }

    /// Split into synthesis units, skipping blank lines
    pub fn synthesis_units(&self) -> Vec<SynthesisUnit> {
        split_into_units(&self.text)
    }

    /// Verify the transcript has exactly one line per scripted unit
    pub fn check_alignment(&self, expected: usize) -> Result<(), AlignmentError> {
        let actual = self.line_count();
        if actual != expected {
            return Err(AlignmentError::LineCountMismatch { expected, actual });
        }
        Ok(())
    }
}

/// Split transcript text into densely numbered units.
///
/// Blank lines are dropped before numbering, so sequence numbers never have
/// gaps. CRLF endings are handled by `str::lines`.
pub fn split_into_units(text: &str) -> Vec<SynthesisUnit> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, line)| SynthesisUnit {
            sequence_number: i + 1,
            text: line.to_string(),
        })
        .collect()
}

/// Collapse provider output onto a single line
pub fn normalize_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
