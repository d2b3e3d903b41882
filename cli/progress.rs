use covary::{Procedure, ResampleProgress};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;

const TEMPLATE: &str = "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}";

/// Terminal progress bars, one per resampling procedure.
///
/// Both procedures run at once, so the bars share a `MultiProgress`. Nothing is
/// drawn when stderr is not a terminal.
pub struct TerminalProgress {
    multi: MultiProgress,
    permutation: ProgressBar,
    bootstrap: ProgressBar,
}

fn create_progress_bar(multi: &MultiProgress, message: &str) -> ProgressBar {
    let pb = multi.add(ProgressBar::new(0));
    if let Ok(style) = ProgressStyle::with_template(TEMPLATE) {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb.set_message(message.to_string());
    pb
}

impl TerminalProgress {
    pub fn new() -> Self {
        let draw_target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(20)
        } else {
            ProgressDrawTarget::hidden()
        };
        let multi = MultiProgress::with_draw_target(draw_target);
        let permutation = create_progress_bar(&multi, Procedure::Permutation.describe());
        let bootstrap = create_progress_bar(&multi, Procedure::Bootstrap.describe());
        Self {
            multi,
            permutation,
            bootstrap,
        }
    }

    fn bar(&self, stage: Procedure) -> &ProgressBar {
        match stage {
            Procedure::Permutation => &self.permutation,
            Procedure::Bootstrap => &self.bootstrap,
        }
    }

    /// Removes both bars so the summary prints on a clean terminal.
    pub fn clear(&self) {
        let _ = self.multi.clear();
    }
}

impl ResampleProgress for TerminalProgress {
    fn on_stage_start(&self, stage: Procedure, total_draws: usize) {
        let bar = self.bar(stage);
        bar.set_length(total_draws as u64);
        bar.set_position(0);
    }

    fn on_stage_advance(&self, stage: Procedure, completed_draws: usize) {
        self.bar(stage).inc(completed_draws as u64);
    }

    fn on_stage_finish(&self, stage: Procedure) {
        self.bar(stage).finish_with_message(format!("{stage} done"));
    }

    fn on_stage_abandon(&self, stage: Procedure) {
        self.bar(stage).abandon_with_message(format!("{stage} interrupted"));
    }
}
