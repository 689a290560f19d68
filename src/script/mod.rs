/*!
 * Lecture script generation.
 *
 * - `composer`: builds the provider request for one unit or a whole deck
 * - `transcript`: the transcript model, line splitting and alignment checks
 * - `generator`: runs the provider over the content units in order
 */

pub mod composer;
pub mod generator;
pub mod transcript;

pub use composer::{ContentBlock, ImageHandle, ScriptComposer, ScriptRequest, compose};
pub use generator::{RetryPolicy, ScriptGenerator};
pub use transcript::{SynthesisUnit, Transcript, split_into_units};
