//! Singular value decomposition of the cross-block matrix into latent variables.
//!
//! `R` is `q x p` (Y features by X features). The decomposition is taken of `Rᵀ`
//! so that the left singular vectors `U` (`p x l`) weight X features and the
//! right singular vectors `V` (`q x l`) weight Y features, `l = min(p, q)`.
//!
//! Singular values are returned in descending order and this order identifies
//! components everywhere downstream. The sign of each `(U[:, i], V[:, i])` pair
//! is whatever the solver produced; callers that compare decompositions must
//! align them explicitly. When singular values tie, the vectors spanning the
//! tied subspace are not unique; that is inherent to the decomposition.

use crate::crosscov::{CrossBlockMode, cross_block_unchecked, normalize};
use crate::linalg::{FaerSvd, LinalgError};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

#[derive(Clone, Debug)]
pub struct Decomposition {
    /// X-side loadings, `p x l`.
    pub u: Array2<f64>,
    /// Singular values, descending, length `l`.
    pub s: Array1<f64>,
    /// Y-side loadings, `q x l`.
    pub v: Array2<f64>,
}

impl Decomposition {
    pub fn n_components(&self) -> usize {
        self.s.len()
    }
}

/// Decomposes the `q x p` cross-block matrix `r`.
pub fn svd(r: ArrayView2<'_, f64>) -> Result<Decomposition, LinalgError> {
    let thin = r.t().thin_svd()?;

    let mut order: Vec<usize> = (0..thin.s.len()).collect();
    order.sort_by(|&a, &b| thin.s[b].total_cmp(&thin.s[a]));

    let s = order.iter().map(|&idx| thin.s[idx].max(0.0)).collect();
    let u = thin.u.select(Axis(1), &order);
    let v = thin.v.select(Axis(1), &order);
    Ok(Decomposition { u, s, v })
}

/// Fraction of the total squared singular values carried by each component.
///
/// An all-zero spectrum has nothing to apportion and yields all zeros.
pub fn varexp(s: ArrayView1<'_, f64>) -> Array1<f64> {
    let squared = s.mapv(|value| value * value);
    let total = squared.sum();
    if total > 0.0 {
        squared / total
    } else {
        Array1::zeros(s.len())
    }
}

/// Builds the cross-block matrix of the pair and decomposes it.
///
/// Returns the decomposition together with the number of constant columns
/// that were zero-filled on the way.
pub fn decompose(
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    mode: CrossBlockMode,
) -> Result<(Decomposition, usize), LinalgError> {
    let block = cross_block_unchecked(x, y, mode);
    let decomposition = svd(block.matrix.view())?;
    Ok((decomposition, block.constant_column_count()))
}

/// Sample-level projections of a decomposition.
#[derive(Clone, Debug)]
pub struct LatentScores {
    /// `X̃ U`, `n x l`.
    pub x_scores: Array2<f64>,
    /// `Ỹ V`, `n x l`.
    pub y_scores: Array2<f64>,
    /// Correlation of every Y feature with every X-side score, `q x l`.
    pub y_correlations: Array2<f64>,
}

/// Pearson correlation of every Y feature with the X scores `X̃ U`, `q x l`.
///
/// Correlation ignores the scale of each score column, so `u` need not be
/// normalized. A score column with no spread correlates as zero.
pub fn behavioral_correlations(
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    u: ArrayView2<'_, f64>,
    mode: CrossBlockMode,
) -> Array2<f64> {
    let x_scores = normalize(x, mode).data.dot(&u);
    cross_block_unchecked(x_scores.view(), y, CrossBlockMode::Correlation).matrix
}

pub fn latent_scores(
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    decomposition: &Decomposition,
    mode: CrossBlockMode,
) -> LatentScores {
    let x_scores = normalize(x, mode).data.dot(&decomposition.u);
    let y_scores = normalize(y, mode).data.dot(&decomposition.v);
    let y_correlations = behavioral_correlations(x, y, decomposition.u.view(), mode);
    LatentScores {
        x_scores,
        y_scores,
        y_correlations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_matrix(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-1.0..1.0))
    }

    #[test]
    fn singular_values_are_non_negative_and_descending() {
        for (seed, (q, p)) in [(3, 7), (7, 3), (5, 5), (1, 6), (6, 1)].into_iter().enumerate() {
            let r = random_matrix(q, p, seed as u64);
            let dec = svd(r.view()).unwrap();
            assert_eq!(dec.n_components(), q.min(p));
            assert_eq!(dec.u.dim(), (p, q.min(p)));
            assert_eq!(dec.v.dim(), (q, q.min(p)));
            assert!(dec.s.iter().all(|&v| v >= 0.0));
            assert!(dec.s.windows(2).into_iter().all(|w| w[0] >= w[1]));
        }
    }

    #[test]
    fn decomposition_reconstructs_the_transposed_cross_block() {
        let r = random_matrix(4, 6, 99);
        let dec = svd(r.view()).unwrap();
        let rebuilt = (&dec.u * &dec.s).dot(&dec.v.t());
        for (a, b) in rebuilt.iter().zip(r.t().iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-10);
        }
    }

    #[test]
    fn effect_sizes_sum_to_one() {
        let r = random_matrix(5, 8, 7);
        let dec = svd(r.view()).unwrap();
        let eta = varexp(dec.s.view());
        assert_abs_diff_eq!(eta.sum(), 1.0, epsilon = 1e-12);
        assert!(eta.windows(2).into_iter().all(|w| w[0] >= w[1]));
    }

    #[test]
    fn zero_spectrum_has_zero_effect_sizes() {
        let eta = varexp(array![0.0, 0.0].view());
        assert_eq!(eta.to_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn scores_project_standardized_samples() {
        let x = random_matrix(12, 3, 5);
        let y = random_matrix(12, 2, 6);
        let (dec, constant) = decompose(x.view(), y.view(), CrossBlockMode::Correlation).unwrap();
        assert_eq!(constant, 0);
        let scores = latent_scores(x.view(), y.view(), &dec, CrossBlockMode::Correlation);
        assert_eq!(scores.x_scores.dim(), (12, 2));
        assert_eq!(scores.y_scores.dim(), (12, 2));
        assert_eq!(scores.y_correlations.dim(), (2, 2));
        assert!(
            scores
                .y_correlations
                .iter()
                .all(|v| v.is_finite() && v.abs() <= 1.0 + 1e-12)
        );
    }

    #[test]
    fn behavioral_correlations_ignore_loading_scale() {
        let x = random_matrix(15, 4, 8);
        let y = random_matrix(15, 3, 9);
        let (dec, _) = decompose(x.view(), y.view(), CrossBlockMode::Correlation).unwrap();
        let scaled = &dec.u * 3.5;
        let unit =
            behavioral_correlations(x.view(), y.view(), dec.u.view(), CrossBlockMode::Correlation);
        let stretched =
            behavioral_correlations(x.view(), y.view(), scaled.view(), CrossBlockMode::Correlation);
        assert_eq!(unit.dim(), (3, 3));
        for (a, b) in unit.iter().zip(stretched.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }
}
