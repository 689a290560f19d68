/*!
 * Lecture audio handling.
 *
 * - `segment`: per-unit audio and timeline entries
 * - `assembler`: concatenation and timestamp building
 * - `resample`: sample rate conversion
 * - `wav`: WAV reading and writing
 */

pub mod assembler;
pub mod resample;
pub mod segment;
pub mod wav;

pub use assembler::{AssembledAudio, assemble};
pub use segment::{AudioSegment, SegmentStatus, TimelineEntry};
