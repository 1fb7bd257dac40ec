use std::fmt;

/// Stages reported while running an experiment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExperimentStage {
    Realizations,
    Persistence,
}

impl ExperimentStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Realizations => "Monte Carlo realizations",
            Self::Persistence => "writing success tables",
        }
    }
}

impl fmt::Display for ExperimentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Observer for reporting progress of an experiment.
///
/// Realizations finish on worker threads, so every method takes `&self` and
/// implementations must be shareable across threads.
pub trait ProgressObserver: Sync {
    fn on_stage_start(&self, stage: ExperimentStage, total: usize) {
        let _ = (stage, total);
    }
    fn on_stage_advance(&self, stage: ExperimentStage, completed: usize) {
        let _ = (stage, completed);
    }
    fn on_stage_finish(&self, stage: ExperimentStage) {
        let _ = stage;
    }
}

#[derive(Default)]
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {}
