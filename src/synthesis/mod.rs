/*!
 * Speech synthesis over a whole transcript.
 */

pub mod dispatcher;

pub use dispatcher::{DispatchOptions, DispatchReport, SynthesisDispatcher, worker_count};
