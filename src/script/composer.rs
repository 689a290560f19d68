/*!
 * Script request composition.
 *
 * Builds the exact content sent to the script provider for one content unit:
 * the shared prompt first, then an optional block for the previous unit, then
 * the current unit. Visuals are loaded into memory here so that an unreadable
 * image fails the unit that references it and nothing else.
 */

use image::{ImageFormat, ImageReader};
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::content::{ContentUnit, VisualKind, VisualRef};
use crate::errors::CompositionError;

/// Label that introduces the previous unit's material
pub const PREVIOUS_MARKER: &str = "**PREVIOUS TEXT DATA:**\n";

/// Label that introduces the current unit's material
pub const CURRENT_MARKER: &str = "**PAGE DATA:**\n";

/// An image loaded and validated at composition time
#[derive(Clone, PartialEq)]
pub struct ImageHandle {
    /// Where the image was read from
    pub path: PathBuf,
    /// MIME type derived from the decoded format
    pub mime_type: String,
    /// Raw encoded bytes
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("path", &self.path)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.bytes.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl ImageHandle {
    /// Read and validate an image file
    pub fn load(path: &Path) -> Result<Self, String> {
        let bytes = std::fs::read(path).map_err(|e| e.to_string())?;

        let reader = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| e.to_string())?;
        let format = reader
            .format()
            .ok_or_else(|| "unrecognized image format".to_string())?;
        let (width, height) = reader.into_dimensions().map_err(|e| e.to_string())?;

        Ok(Self {
            path: path.to_path_buf(),
            mime_type: mime_for(format),
            bytes,
            width,
            height,
        })
    }
}

fn mime_for(format: ImageFormat) -> String {
    format.to_mime_type().to_string()
}

/// One element of the provider content
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text(String),
    Image(ImageHandle),
}

impl ContentBlock {
    /// Text payload, if this is a text block
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Image(_) => None,
        }
    }
}

/// Composed input to the script provider for one unit
#[derive(Debug, Clone)]
pub struct ScriptRequest {
    /// Persona/system directive, kept apart from the content body
    pub instruction: String,
    /// Task framing, always the first content block
    pub prompt: String,
    pub current_unit: ContentUnit,
    pub previous_unit: Option<ContentUnit>,
    blocks: Vec<ContentBlock>,
}

impl ScriptRequest {
    /// Ordered content blocks: prompt, [previous], current
    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }
}

/// Composed input to the script provider for a whole document
#[derive(Debug, Clone)]
pub struct DocumentRequest {
    pub instruction: String,
    blocks: Vec<ContentBlock>,
}

impl DocumentRequest {
    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }
}

/// Holds the shared instruction and prompt of a run
#[derive(Debug, Clone)]
pub struct ScriptComposer {
    instruction: String,
    prompt: String,
}

impl ScriptComposer {
    pub fn new(instruction: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            prompt: prompt.into(),
        }
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Compose the request for `current`, chaining `previous` when given
    pub fn compose(
        &self,
        current: &ContentUnit,
        previous: Option<&ContentUnit>,
    ) -> Result<ScriptRequest, CompositionError> {
        compose(&self.instruction, &self.prompt, current, previous)
    }

    /// Compose one request covering every unit
    pub fn compose_document(&self, units: &[ContentUnit]) -> Result<DocumentRequest, CompositionError> {
        let mut blocks = vec![ContentBlock::Text(self.prompt.clone())];
        for unit in units {
            blocks.push(ContentBlock::Text(format!("Slide {}:", unit.index)));
            push_unit(&mut blocks, unit)?;
        }

        Ok(DocumentRequest {
            instruction: self.instruction.clone(),
            blocks,
        })
    }
}

/// Compose the provider request for one unit
pub fn compose(
    instruction: &str,
    prompt: &str,
    current: &ContentUnit,
    previous: Option<&ContentUnit>,
) -> Result<ScriptRequest, CompositionError> {
    let mut blocks = vec![ContentBlock::Text(prompt.to_string())];

    if let Some(previous) = previous {
        blocks.push(ContentBlock::Text(PREVIOUS_MARKER.to_string()));
        push_unit(&mut blocks, previous).map_err(|e| match e {
            // a broken visual on the previous page still belongs to the current request
            CompositionError::Visual { path, reason, .. } => CompositionError::Visual {
                unit: current.index,
                path,
                reason,
            },
        })?;
    }

    blocks.push(ContentBlock::Text(CURRENT_MARKER.to_string()));
    push_unit(&mut blocks, current)?;

    Ok(ScriptRequest {
        instruction: instruction.to_string(),
        prompt: prompt.to_string(),
        current_unit: current.clone(),
        previous_unit: previous.cloned(),
        blocks,
    })
}

fn push_unit(blocks: &mut Vec<ContentBlock>, unit: &ContentUnit) -> Result<(), CompositionError> {
    blocks.push(ContentBlock::Text(unit.text.clone()));
    for visual in &unit.visuals {
        blocks.push(load_visual(unit.index, visual)?);
    }
    Ok(())
}

fn load_visual(unit: usize, visual: &VisualRef) -> Result<ContentBlock, CompositionError> {
    match visual.kind {
        VisualKind::Image => ImageHandle::load(&visual.path)
            .map(ContentBlock::Image)
            .map_err(|reason| CompositionError::Visual {
                unit,
                path: visual.path.clone(),
                reason,
            }),
    }
}
