//! Bootstrap reliability of the loadings and of the behavioral correlations.
//!
//! Each draw resamples whole samples (the same rows of X and Y), decomposes the
//! resampled cross-block matrix and rotates the result onto the observed
//! loadings before it is accumulated. The rotated X loadings also give the
//! draw's correlations between X scores and Y features. Statistics are computed
//! per entry over the completed draws, in draw order.
//!
//! A resample whose cross-block matrix is identically zero has no defined
//! singular vectors. It is redrawn like a failed decomposition and, if it keeps
//! recurring, excluded and counted against the failure budget.

use crate::crosscov::{CrossBlockMode, cross_block_unchecked};
use crate::decompose::{Decomposition, behavioral_correlations, svd};
use crate::linalg::LinalgError;
use crate::procrustes::align_loadings;
use crate::progress::ResampleProgress;
use crate::resample::{
    BOOTSTRAP_STREAM, CancellationToken, DrawPlan, bootstrap_indices, run_draws,
};
use crate::result::{BootstrapResult, EntryStats};
use crate::types::{PlsError, Procedure};
use ndarray::{Array2, ArrayView2, Axis};

/// Standard errors below this are treated as zero when forming ratios.
pub const SE_FLOOR: f64 = 1.0e-12;

#[derive(Clone, Copy, Debug)]
pub struct BootstrapOptions {
    pub n_boot: usize,
    pub seed: u64,
    pub mode: CrossBlockMode,
    /// Percentile interval width, in percent.
    pub ci: f64,
    pub max_failure_fraction: f64,
}

/// One resampled decomposition after alignment to the observed loadings.
#[derive(Clone, Debug)]
pub struct AlignedDraw {
    pub u: Array2<f64>,
    pub v: Array2<f64>,
    /// Correlation of each Y feature with the draw's X scores, `q x l`.
    pub y_correlations: Array2<f64>,
    /// Columns that were constant in this draw and got zero-filled.
    pub constant_columns: usize,
}

/// Decomposes the rows `indices` of both blocks and aligns the loadings to `observed`.
pub fn aligned_resample(
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    indices: &[usize],
    observed: &Decomposition,
    mode: CrossBlockMode,
) -> Result<AlignedDraw, LinalgError> {
    let xb = x.select(Axis(0), indices);
    let yb = y.select(Axis(0), indices);
    let block = cross_block_unchecked(xb.view(), yb.view(), mode);
    if block.is_zero() {
        return Err(LinalgError::ZeroMatrix);
    }
    let resampled = svd(block.matrix.view())?;
    let (u, v) = align_loadings(
        observed.u.view(),
        observed.v.view(),
        resampled.u.view(),
        resampled.v.view(),
    )?;
    let y_correlations = behavioral_correlations(xb.view(), yb.view(), u.view(), mode);
    Ok(AlignedDraw {
        u,
        v,
        y_correlations,
        constant_columns: block.constant_column_count(),
    })
}

/// Percentile with linear interpolation between order statistics.
///
/// `sorted` must be non-empty and ascending; `percent` lies in `[0, 100]`.
pub fn percentile(sorted: &[f64], percent: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let position = (sorted.len() - 1) as f64 * percent / 100.0;
    let lower = position.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Observed loading over its standard error, with a zero standard error mapped
/// to 0 for a zero loading and to a signed infinity otherwise.
pub fn bootstrap_ratio(loading: f64, standard_error: f64) -> f64 {
    if standard_error >= SE_FLOOR {
        loading / standard_error
    } else if loading.abs() < SE_FLOOR {
        0.0
    } else {
        loading.signum() * f64::INFINITY
    }
}

/// Summarizes aligned draws of one block against its observed loadings.
fn summarize<'a, I>(observed: ArrayView2<'_, f64>, draws: I, ci: f64) -> EntryStats
where
    I: Iterator<Item = ArrayView2<'a, f64>> + Clone,
{
    let dim = observed.dim();
    let count = draws.clone().count();
    let lower_pct = (100.0 - ci) / 2.0;
    let upper_pct = 100.0 - lower_pct;

    let mut standard_errors = Array2::zeros(dim);
    let mut ratios = Array2::zeros(dim);
    let mut lower = Array2::zeros(dim);
    let mut upper = Array2::zeros(dim);
    let mut values = Vec::with_capacity(count);

    for row in 0..dim.0 {
        for col in 0..dim.1 {
            values.clear();
            values.extend(draws.clone().map(|draw| draw[(row, col)]));

            let mean = values.iter().sum::<f64>() / count as f64;
            let sum_sq: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
            let se = (sum_sq / (count.saturating_sub(1).max(1)) as f64).sqrt();

            values.sort_by(|a, b| a.total_cmp(b));
            standard_errors[(row, col)] = se;
            ratios[(row, col)] = bootstrap_ratio(observed[(row, col)], se);
            lower[(row, col)] = percentile(&values, lower_pct);
            upper[(row, col)] = percentile(&values, upper_pct);
        }
    }

    EntryStats {
        standard_errors,
        ratios,
        lower,
        upper,
    }
}

pub fn bootstrap_test<P>(
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    observed: &Decomposition,
    options: &BootstrapOptions,
    cancel: &CancellationToken,
    progress: &P,
) -> Result<BootstrapResult, PlsError>
where
    P: ResampleProgress + ?Sized,
{
    if options.n_boot < 2 {
        return Err(PlsError::InvalidConfig(format!(
            "n_boot must be at least 2 to estimate a standard error, got {}",
            options.n_boot
        )));
    }

    let n = x.nrows();
    let plan = DrawPlan {
        procedure: Procedure::Bootstrap,
        draws: options.n_boot,
        seed: options.seed,
        stream: BOOTSTRAP_STREAM,
        max_failure_fraction: options.max_failure_fraction,
    };

    let summary = run_draws(&plan, cancel, progress, |rng| {
        let indices = bootstrap_indices(n, rng);
        aligned_resample(x, y, &indices, observed, options.mode)
    })?;

    let draws = &summary.values;
    let degenerate_draws = draws.iter().filter(|d| d.constant_columns > 0).count();
    if degenerate_draws > 0 {
        log::debug!(
            "{degenerate_draws} bootstrap draws contained constant columns and were zero-filled"
        );
    }

    let x_stats = summarize(observed.u.view(), draws.iter().map(|d| d.u.view()), options.ci);
    let y_stats = summarize(observed.v.view(), draws.iter().map(|d| d.v.view()), options.ci);
    let observed_correlations = behavioral_correlations(x, y, observed.u.view(), options.mode);
    let correlation_stats = summarize(
        observed_correlations.view(),
        draws.iter().map(|d| d.y_correlations.view()),
        options.ci,
    );

    log::info!(
        "Bootstrap finished: {} of {} draws completed",
        draws.len(),
        options.n_boot
    );

    Ok(BootstrapResult {
        x: x_stats,
        y: y_stats,
        y_correlations: correlation_stats,
        ci: options.ci,
        requested: options.n_boot,
        completed: draws.len(),
        excluded: summary.excluded,
        retried: summary.retried,
        degenerate_draws,
    })
}
