use crate::types::Procedure;

/// Observer for reporting incremental progress while resampling.
///
/// Draws complete on worker threads, so every callback takes `&self`.
pub trait ResampleProgress: Send + Sync {
    fn on_stage_start(&self, stage: Procedure, total_draws: usize) {
        let _ = (stage, total_draws);
    }
    fn on_stage_advance(&self, stage: Procedure, completed_draws: usize) {
        let _ = (stage, completed_draws);
    }
    fn on_stage_finish(&self, stage: Procedure) {
        let _ = stage;
    }
    /// Called instead of `on_stage_finish` when a stage stops early.
    fn on_stage_abandon(&self, stage: Procedure) {
        let _ = stage;
    }
}

#[derive(Default)]
pub struct NoopProgress;

impl ResampleProgress for NoopProgress {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        advanced: AtomicUsize,
    }

    impl ResampleProgress for Counting {
        fn on_stage_advance(&self, stage: Procedure, completed_draws: usize) {
            assert_eq!(stage, Procedure::Bootstrap);
            self.advanced.fetch_add(completed_draws, Ordering::Relaxed);
        }
    }

    #[test]
    fn default_callbacks_are_optional() {
        let progress = Counting::default();
        progress.on_stage_start(Procedure::Bootstrap, 3);
        progress.on_stage_advance(Procedure::Bootstrap, 2);
        progress.on_stage_finish(Procedure::Bootstrap);
        progress.on_stage_abandon(Procedure::Bootstrap);
        assert_eq!(progress.advanced.load(Ordering::Relaxed), 2);
        NoopProgress.on_stage_advance(Procedure::Permutation, 1);
    }
}
