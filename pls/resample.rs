//! Seeded resampling infrastructure shared by the permutation and bootstrap loops.
//!
//! Every draw owns a generator derived from the master seed, a per-procedure
//! stream tag and the draw index. Draws therefore do not depend on scheduling,
//! and results are bit-identical for any worker count.

use crate::linalg::LinalgError;
use crate::progress::ResampleProgress;
use crate::types::{PlsError, Procedure};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub const PERMUTATION_STREAM: u64 = 0x5045_524D_5554_4154;
pub const BOOTSTRAP_STREAM: u64 = 0x424F_4F54_5354_5250;
pub const SPLIT_STREAM: u64 = 0x5350_4C49_5448_414C;

/// Attempts per draw before it is excluded from the distribution.
pub const MAX_DRAW_ATTEMPTS: usize = 8;
const MAX_UNIQUE_ATTEMPTS: usize = 500;

#[inline]
fn splitmix64(state: u64) -> u64 {
    let mut z = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed for draw `index` of the procedure identified by `stream`.
pub fn derive_seed(master: u64, stream: u64, index: usize) -> u64 {
    splitmix64(splitmix64(master ^ stream.rotate_left(17)) ^ index as u64)
}

pub fn draw_rng(master: u64, stream: u64, index: usize) -> StdRng {
    StdRng::seed_from_u64(derive_seed(master, stream, index))
}

/// A uniformly random reordering of `0..n` other than the identity.
///
/// The identity reproduces the observed pairing, so it is redrawn a bounded
/// number of times. With a single sample there is nothing else to return.
/// Repeats across draws are allowed: each draw owns its generator, and
/// rejecting repeats would tie one draw's outcome to every other draw.
pub fn permutation_indices<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    for _ in 0..MAX_UNIQUE_ATTEMPTS {
        order.shuffle(rng);
        if n < 2 || order.iter().enumerate().any(|(idx, &value)| idx != value) {
            break;
        }
    }
    order
}

/// `n` sample indices drawn with replacement, sorted.
///
/// A draw must contain at least half of the distinct samples; draws with fewer
/// are redrawn a bounded number of times.
pub fn bootstrap_indices<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<usize> {
    let min_unique = n.div_ceil(2);
    let mut indices = vec![0usize; n];
    for attempt in 1..=MAX_UNIQUE_ATTEMPTS {
        for slot in indices.iter_mut() {
            *slot = rng.gen_range(0..n);
        }
        indices.sort_unstable();
        let unique = 1 + indices.windows(2).filter(|w| w[0] != w[1]).count();
        if unique >= min_unique {
            break;
        }
        if attempt == MAX_UNIQUE_ATTEMPTS {
            log::warn!(
                "Bootstrap draw kept only {unique} distinct samples of {n} after {MAX_UNIQUE_ATTEMPTS} attempts"
            );
        }
    }
    indices
}

/// Cooperative cancellation flag checked between draws.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Settings shared by both resampling loops.
#[derive(Clone, Copy, Debug)]
pub struct DrawPlan {
    pub procedure: Procedure,
    pub draws: usize,
    pub seed: u64,
    pub stream: u64,
    pub max_failure_fraction: f64,
}

/// Values of the completed draws, in draw order, plus failure bookkeeping.
#[derive(Debug)]
pub struct DrawSummary<T> {
    pub values: Vec<T>,
    pub excluded: usize,
    pub retried: usize,
}

enum DrawOutcome<T> {
    Completed { value: T, retries: usize },
    Excluded { retries: usize },
}

fn run_single<T, F>(plan: &DrawPlan, index: usize, draw: &F) -> DrawOutcome<T>
where
    F: Fn(&mut StdRng) -> Result<T, LinalgError>,
{
    let mut rng = draw_rng(plan.seed, plan.stream, index);
    for attempt in 0..MAX_DRAW_ATTEMPTS {
        match draw(&mut rng) {
            Ok(value) => {
                return DrawOutcome::Completed {
                    value,
                    retries: attempt,
                };
            }
            Err(err) => {
                log::warn!(
                    "{} draw {index} attempt {} failed: {err}; redrawing",
                    plan.procedure,
                    attempt + 1
                );
            }
        }
    }
    log::warn!(
        "{} draw {index} excluded after {MAX_DRAW_ATTEMPTS} failed attempts",
        plan.procedure
    );
    DrawOutcome::Excluded {
        retries: MAX_DRAW_ATTEMPTS - 1,
    }
}

/// Runs `plan.draws` independent draws on the current rayon pool.
///
/// A draw whose decomposition fails is redrawn from its own generator; draws that
/// keep failing are excluded and counted. Excluding more than the allowed fraction
/// of draws fails the whole procedure.
pub fn run_draws<T, F, P>(
    plan: &DrawPlan,
    cancel: &CancellationToken,
    progress: &P,
    draw: F,
) -> Result<DrawSummary<T>, PlsError>
where
    T: Send,
    F: Fn(&mut StdRng) -> Result<T, LinalgError> + Sync,
    P: ResampleProgress + ?Sized,
{
    progress.on_stage_start(plan.procedure, plan.draws);

    let outcomes = (0..plan.draws)
        .into_par_iter()
        .map(|index| {
            if cancel.is_cancelled() {
                return Err(PlsError::Interrupted);
            }
            let outcome = run_single(plan, index, &draw);
            progress.on_stage_advance(plan.procedure, 1);
            Ok(outcome)
        })
        .collect::<Result<Vec<_>, PlsError>>();

    let outcomes = match outcomes {
        Ok(outcomes) => outcomes,
        Err(err) => {
            progress.on_stage_abandon(plan.procedure);
            return Err(err);
        }
    };
    progress.on_stage_finish(plan.procedure);

    let mut values = Vec::with_capacity(outcomes.len());
    let mut excluded = 0usize;
    let mut retried = 0usize;
    for outcome in outcomes {
        match outcome {
            DrawOutcome::Completed { value, retries } => {
                retried += retries;
                values.push(value);
            }
            DrawOutcome::Excluded { retries } => {
                retried += retries;
                excluded += 1;
            }
        }
    }

    let allowed = plan.max_failure_fraction * plan.draws as f64;
    if values.is_empty() || excluded as f64 > allowed {
        return Err(PlsError::TooManyFailures {
            procedure: plan.procedure,
            failed: excluded,
            requested: plan.draws,
        });
    }
    if excluded > 0 {
        log::warn!(
            "{} excluded {excluded} of {} draws; statistics use the remaining {}",
            plan.procedure,
            plan.draws,
            values.len()
        );
    }

    Ok(DrawSummary {
        values,
        excluded,
        retried,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgress;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    fn plan(draws: usize) -> DrawPlan {
        DrawPlan {
            procedure: Procedure::Permutation,
            draws,
            seed: 42,
            stream: PERMUTATION_STREAM,
            max_failure_fraction: 0.1,
        }
    }

    #[test]
    fn derived_seeds_differ_across_streams_and_indices() {
        let seeds: HashSet<u64> = (0..100)
            .flat_map(|i| {
                [
                    derive_seed(7, PERMUTATION_STREAM, i),
                    derive_seed(7, BOOTSTRAP_STREAM, i),
                    derive_seed(7, SPLIT_STREAM, i),
                ]
            })
            .collect();
        assert_eq!(seeds.len(), 300);
        assert_eq!(
            derive_seed(7, BOOTSTRAP_STREAM, 3),
            derive_seed(7, BOOTSTRAP_STREAM, 3)
        );
    }

    #[test]
    fn permutations_cover_every_index_once() {
        let mut rng = draw_rng(1, PERMUTATION_STREAM, 0);
        let mut order = permutation_indices(50, &mut rng);
        order.sort_unstable();
        assert_eq!(order, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn permutations_never_return_the_observed_order() {
        for index in 0..200 {
            let mut rng = draw_rng(9, PERMUTATION_STREAM, index);
            assert_eq!(permutation_indices(2, &mut rng), vec![1, 0]);
            let order = permutation_indices(3, &mut rng);
            assert_ne!(order, vec![0, 1, 2]);
        }
        let mut rng = draw_rng(9, PERMUTATION_STREAM, 0);
        assert_eq!(permutation_indices(1, &mut rng), vec![0]);
    }

    #[test]
    fn bootstrap_draws_keep_half_the_samples() {
        for index in 0..200 {
            let mut rng = draw_rng(3, BOOTSTRAP_STREAM, index);
            let draw = bootstrap_indices(6, &mut rng);
            assert_eq!(draw.len(), 6);
            assert!(draw.iter().all(|&i| i < 6));
            let unique: HashSet<usize> = draw.iter().copied().collect();
            assert!(unique.len() >= 3);
        }
    }

    #[test]
    fn draws_are_returned_in_index_order_regardless_of_pool_size() {
        let collect = |threads: usize| {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .unwrap();
            pool.install(|| {
                run_draws(&plan(64), &CancellationToken::new(), &NoopProgress, |rng| {
                    Ok(rng.r#gen::<u64>())
                })
                .unwrap()
                .values
            })
        };
        assert_eq!(collect(1), collect(4));
    }

    #[test]
    fn failing_draws_are_retried_then_excluded() {
        let summary = run_draws(&plan(20), &CancellationToken::new(), &NoopProgress, |rng| {
            if rng.gen_bool(0.5) {
                Err(LinalgError::SvdNoConvergence)
            } else {
                Ok(())
            }
        })
        .unwrap();
        assert!(summary.retried > 0);
        assert_eq!(summary.values.len() + summary.excluded, 20);
    }

    #[test]
    fn persistent_failures_abort_the_procedure() {
        let result: Result<DrawSummary<()>, _> =
            run_draws(&plan(10), &CancellationToken::new(), &NoopProgress, |rng| {
                let _ = rng.r#gen::<u8>();
                Err(LinalgError::SvdNoConvergence)
            });
        assert!(matches!(
            result,
            Err(PlsError::TooManyFailures {
                failed: 10,
                requested: 10,
                ..
            })
        ));
    }

    #[derive(Default)]
    struct StageLog {
        finished: AtomicUsize,
        abandoned: AtomicUsize,
    }

    impl ResampleProgress for StageLog {
        fn on_stage_finish(&self, _: Procedure) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_abandon(&self, _: Procedure) {
            self.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn cancelled_runs_report_interruption() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stages = StageLog::default();
        let result = run_draws(&plan(10), &cancel, &stages, |rng| Ok(rng.r#gen::<u8>()));
        assert!(matches!(result, Err(PlsError::Interrupted)));
        assert_eq!(stages.abandoned.load(Ordering::SeqCst), 1);
        assert_eq!(stages.finished.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn completed_runs_finish_their_stage() {
        let stages = StageLog::default();
        run_draws(&plan(5), &CancellationToken::new(), &stages, |rng| {
            Ok(rng.r#gen::<u8>())
        })
        .unwrap();
        assert_eq!(stages.finished.load(Ordering::SeqCst), 1);
        assert_eq!(stages.abandoned.load(Ordering::SeqCst), 0);
    }
}
