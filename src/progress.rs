/*!
 * Stage progress reporting.
 *
 * Pipeline stages report through a callback instead of drawing to the
 * terminal themselves; the CLI renders events with indicatif and tests
 * collect them into a vector.
 */

use std::fmt;
use std::sync::Arc;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Extraction,
    Scripting,
    Synthesis,
    Assembly,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extraction => "Extracting",
            Self::Scripting => "Scripting",
            Self::Synthesis => "Synthesizing",
            Self::Assembly => "Assembling",
        };
        f.write_str(name)
    }
}

/// A progress notification
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A stage begins with `total` units of work
    StageStarted { stage: Stage, total: usize },
    /// One more unit of the stage finished
    UnitCompleted { stage: Stage, completed: usize, total: usize },
    /// A stage ended
    StageFinished { stage: Stage },
}

/// Cloneable, optional progress callback
#[derive(Clone, Default)]
pub struct ProgressReporter {
    callback: Option<Arc<dyn Fn(ProgressEvent) + Send + Sync>>,
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("enabled", &self.callback.is_some())
            .finish()
    }
}

impl ProgressReporter {
    /// Reporter that forwards events to `callback`
    pub fn new(callback: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    /// Reporter that drops every event
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.callback {
            callback(event);
        }
    }

    pub fn stage_started(&self, stage: Stage, total: usize) {
        self.emit(ProgressEvent::StageStarted { stage, total });
    }

    pub fn unit_completed(&self, stage: Stage, completed: usize, total: usize) {
        self.emit(ProgressEvent::UnitCompleted { stage, completed, total });
    }

    pub fn stage_finished(&self, stage: Stage) {
        self.emit(ProgressEvent::StageFinished { stage });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_reporter_should_forward_events_in_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let reporter = ProgressReporter::new(move |e| sink.lock().push(e));

        reporter.stage_started(Stage::Synthesis, 2);
        reporter.unit_completed(Stage::Synthesis, 1, 2);
        reporter.stage_finished(Stage::Synthesis);

        let events = events.lock();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], ProgressEvent::StageStarted { stage: Stage::Synthesis, total: 2 });
        assert_eq!(events[2], ProgressEvent::StageFinished { stage: Stage::Synthesis });
    }

    #[test]
    fn test_silent_reporter_should_not_panic() {
        ProgressReporter::silent().stage_started(Stage::Assembly, 0);
    }
}
