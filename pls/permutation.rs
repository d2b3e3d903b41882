//! Permutation test for the significance of each latent variable.
//!
//! Shuffling the rows of Y breaks the pairing between samples while leaving the
//! within-block structure intact. Row order does not change column moments, so
//! both blocks are normalized once and only the product is recomputed per draw.
//!
//! With split-half resampling enabled, every permuted decomposition also gets
//! its split-half correlations, which form the null distribution for the
//! observed ones.

use crate::bootstrap::percentile;
use crate::crosscov::{CrossBlockMode, normalize};
use crate::decompose::{Decomposition, svd};
use crate::procrustes::rotated_singular_values;
use crate::progress::ResampleProgress;
use crate::resample::{
    CancellationToken, DrawPlan, PERMUTATION_STREAM, SPLIT_STREAM, draw_rng, permutation_indices,
    run_draws,
};
use crate::result::{PermutationResult, SplitHalfResult};
use crate::split_half::{MIN_SPLIT_SAMPLES, SplitHalfCorrelations, split_half};
use crate::types::{PlsError, Procedure};
use ndarray::{Array1, ArrayView2, Axis};

#[derive(Clone, Copy, Debug)]
pub struct PermutationOptions {
    pub n_perm: usize,
    pub seed: u64,
    pub mode: CrossBlockMode,
    /// Compare Procrustes-rescaled singular values instead of raw ones.
    pub rotate: bool,
    /// Split-half resamples per decomposition; zero disables split-half reliability.
    pub n_split: usize,
    /// Percentile interval width for the permuted split-half correlations.
    pub ci: f64,
    pub max_failure_fraction: f64,
}

/// Outcome of one permuted decomposition.
struct PermutedDraw {
    singular_values: Array1<f64>,
    split: Option<SplitHalfCorrelations>,
}

/// Counts, per latent variable, the draws whose statistic reached the observed one.
fn count_exceedances<'a, I>(observed: &Array1<f64>, draws: I) -> Vec<usize>
where
    I: Iterator<Item = &'a Array1<f64>>,
{
    let mut counts = vec![0usize; observed.len()];
    for values in draws {
        for (idx, count) in counts.iter_mut().enumerate() {
            if values[idx] >= observed[idx] {
                *count += 1;
            }
        }
    }
    counts
}

/// Percentile bounds per latent variable over the permuted correlations.
fn interval<'a, I>(draws: I, components: usize, ci: f64) -> (Array1<f64>, Array1<f64>)
where
    I: Iterator<Item = &'a Array1<f64>> + Clone,
{
    let lower_pct = (100.0 - ci) / 2.0;
    let mut lower = Array1::zeros(components);
    let mut upper = Array1::zeros(components);
    for lv in 0..components {
        let mut values: Vec<f64> = draws.clone().map(|draw| draw[lv]).collect();
        values.sort_by(|a, b| a.total_cmp(b));
        lower[lv] = percentile(&values, lower_pct);
        upper[lv] = percentile(&values, 100.0 - lower_pct);
    }
    (lower, upper)
}

fn summarize_split_half(
    observed: SplitHalfCorrelations,
    permuted: &[SplitHalfCorrelations],
    options: &PermutationOptions,
) -> SplitHalfResult {
    let completed = permuted.len();
    let components = observed.u.len();
    let u_counts = count_exceedances(&observed.u, permuted.iter().map(|draw| &draw.u));
    let v_counts = count_exceedances(&observed.v, permuted.iter().map(|draw| &draw.v));
    let (u_lower, u_upper) = interval(permuted.iter().map(|draw| &draw.u), components, options.ci);
    let (v_lower, v_upper) = interval(permuted.iter().map(|draw| &draw.v), components, options.ci);
    SplitHalfResult {
        n_split: options.n_split,
        ci: options.ci,
        u_p_values: p_values(&u_counts, completed),
        v_p_values: p_values(&v_counts, completed),
        u_correlations: observed.u,
        v_correlations: observed.v,
        u_lower,
        u_upper,
        v_lower,
        v_upper,
    }
}

/// `(1 + exceedances) / (1 + completed)` for every component.
pub fn p_values(exceedances: &[usize], completed: usize) -> Array1<f64> {
    let denom = (completed + 1) as f64;
    exceedances
        .iter()
        .map(|&count| (count + 1) as f64 / denom)
        .collect()
}

pub fn permutation_test<P>(
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    observed: &Decomposition,
    options: &PermutationOptions,
    cancel: &CancellationToken,
    progress: &P,
) -> Result<PermutationResult, PlsError>
where
    P: ResampleProgress + ?Sized,
{
    if options.n_perm == 0 {
        return Err(PlsError::InvalidConfig(
            "n_perm must be at least 1".to_string(),
        ));
    }

    let n = x.nrows();
    if options.n_split > 0 && n < MIN_SPLIT_SAMPLES {
        return Err(PlsError::InvalidConfig(format!(
            "split-half reliability needs at least {MIN_SPLIT_SAMPLES} samples, got {n}"
        )));
    }
    let xn = normalize(x, options.mode).data;
    let yn = normalize(y, options.mode).data;
    let denom = n.saturating_sub(1).max(1) as f64;

    let plan = DrawPlan {
        procedure: Procedure::Permutation,
        draws: options.n_perm,
        seed: options.seed,
        stream: PERMUTATION_STREAM,
        max_failure_fraction: options.max_failure_fraction,
    };

    let summary = run_draws(&plan, cancel, progress, |rng| {
        let order = permutation_indices(n, rng);
        let shuffled = yn.select(Axis(0), &order);
        let r = shuffled.t().dot(&xn) / denom;
        let permuted = svd(r.view())?;
        let split = (options.n_split > 0).then(|| {
            let y_permuted = y.select(Axis(0), &order);
            split_half(x, y_permuted.view(), &permuted, options.mode, options.n_split, rng)
        });
        let singular_values = if options.rotate {
            rotated_singular_values(observed.v.view(), permuted.v.view(), permuted.s.view())?
        } else {
            permuted.s
        };
        Ok(PermutedDraw {
            singular_values,
            split,
        })
    })?;

    let exceedances =
        count_exceedances(&observed.s, summary.values.iter().map(|draw| &draw.singular_values));
    let completed = summary.values.len();

    let split_half_result = if options.n_split > 0 {
        let mut rng = draw_rng(options.seed, SPLIT_STREAM, 0);
        let observed_split = split_half(x, y, observed, options.mode, options.n_split, &mut rng);
        let permuted: Vec<SplitHalfCorrelations> =
            summary.values.into_iter().filter_map(|draw| draw.split).collect();
        log::info!(
            "Split-half reliability of LV1: u {:.3}, v {:.3} over {} splits",
            observed_split.u[0],
            observed_split.v[0],
            options.n_split
        );
        Some(summarize_split_half(observed_split, &permuted, options))
    } else {
        None
    };
    log::info!(
        "Permutation test finished: {completed} of {} draws completed",
        options.n_perm
    );

    Ok(PermutationResult {
        p_values: p_values(&exceedances, completed),
        exceedances,
        requested: options.n_perm,
        completed,
        excluded: summary.excluded,
        retried: summary.retried,
        rotated: options.rotate,
        split_half: split_half_result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompose::decompose;
    use crate::progress::NoopProgress;
    use ndarray::{Array2, array};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn options(n_perm: usize, rotate: bool) -> PermutationOptions {
        PermutationOptions {
            n_perm,
            seed: 11,
            mode: CrossBlockMode::Correlation,
            rotate,
            n_split: 0,
            ci: 95.0,
            max_failure_fraction: 0.05,
        }
    }

    fn noise(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-1.0..1.0))
    }

    #[test]
    fn p_values_use_the_add_one_estimator() {
        let p = p_values(&[0, 9, 4], 9);
        assert_eq!(p.to_vec(), vec![0.1, 1.0, 0.5]);
    }

    #[test]
    fn p_values_lie_in_the_unit_interval() {
        let x = noise(30, 4, 1);
        let y = noise(30, 3, 2);
        for rotate in [false, true] {
            let (observed, _) = decompose(x.view(), y.view(), CrossBlockMode::Correlation).unwrap();
            let result = permutation_test(
                x.view(),
                y.view(),
                &observed,
                &options(200, rotate),
                &CancellationToken::new(),
                &NoopProgress,
            )
            .unwrap();
            assert_eq!(result.p_values().len(), 3);
            assert_eq!(result.completed(), 200);
            assert!(result.p_values().iter().all(|&p| p > 0.0 && p <= 1.0));
        }
    }

    #[test]
    fn strong_coupling_is_significant() {
        let x = noise(40, 2, 3);
        let mut y = noise(40, 2, 4) * 0.1;
        y.column_mut(0).scaled_add(1.0, &x.column(0));
        let (observed, _) = decompose(x.view(), y.view(), CrossBlockMode::Correlation).unwrap();
        let result = permutation_test(
            x.view(),
            y.view(),
            &observed,
            &options(199, false),
            &CancellationToken::new(),
            &NoopProgress,
        )
        .unwrap();
        assert_eq!(result.exceedances()[0], 0);
        assert!((result.p_values()[0] - 0.005).abs() < 1e-12);
    }

    #[test]
    fn zero_permutations_fail_fast() {
        let x = noise(10, 2, 5);
        let y = noise(10, 2, 6);
        let (observed, _) = decompose(x.view(), y.view(), CrossBlockMode::Correlation).unwrap();
        let result = permutation_test(
            x.view(),
            y.view(),
            &observed,
            &options(0, false),
            &CancellationToken::new(),
            &NoopProgress,
        );
        assert!(matches!(result, Err(PlsError::InvalidConfig(_))));
    }

    #[test]
    fn split_half_is_absent_unless_requested() {
        let x = noise(12, 3, 7);
        let y = noise(12, 2, 8);
        let (observed, _) = decompose(x.view(), y.view(), CrossBlockMode::Correlation).unwrap();
        let result = permutation_test(
            x.view(),
            y.view(),
            &observed,
            &options(20, false),
            &CancellationToken::new(),
            &NoopProgress,
        )
        .unwrap();
        assert!(result.split_half().is_none());
    }

    #[test]
    fn reliable_structure_has_significant_split_half_correlations() {
        let latent = noise(60, 1, 9);
        let x = noise(60, 6, 10) * 0.3 + &latent.dot(&array![[1.0, -0.8, 0.6, 0.9, -0.7, 0.8]]);
        let y = noise(60, 5, 11) * 0.3 + &latent.dot(&array![[0.9, 0.7, -1.0, 0.6, -0.8]]);
        let (observed, _) = decompose(x.view(), y.view(), CrossBlockMode::Correlation).unwrap();
        let result = permutation_test(
            x.view(),
            y.view(),
            &observed,
            &PermutationOptions {
                n_split: 10,
                ..options(99, false)
            },
            &CancellationToken::new(),
            &NoopProgress,
        )
        .unwrap();
        let split = result.split_half().expect("split-half requested");
        assert_eq!(split.n_split(), 10);
        assert_eq!(split.u_correlations().len(), 5);
        assert!(split.u_correlations()[0] > 0.9);
        assert!(split.v_correlations()[0] > 0.9);
        assert!(split.u_p_values()[0] < 0.05);
        assert!(split.v_p_values()[0] < 0.05);
        assert!(split.u_p_values().iter().all(|&p| p > 0.0 && p <= 1.0));
        let (lower, upper) = split.u_interval();
        assert!(lower.iter().zip(upper.iter()).all(|(lo, hi)| lo <= hi));
        assert!(upper[0] < split.u_correlations()[0]);
    }

    #[test]
    fn split_half_needs_four_samples() {
        let x = noise(3, 2, 12);
        let y = noise(3, 2, 13);
        let (observed, _) = decompose(x.view(), y.view(), CrossBlockMode::Correlation).unwrap();
        let result = permutation_test(
            x.view(),
            y.view(),
            &observed,
            &PermutationOptions {
                n_split: 5,
                ..options(10, false)
            },
            &CancellationToken::new(),
            &NoopProgress,
        );
        assert!(matches!(result, Err(PlsError::InvalidConfig(_))));
    }
}
