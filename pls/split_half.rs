//! Split-half reliability of the latent variables.
//!
//! The samples are split into two random halves and each half gets its own
//! cross-block matrix. Projecting both matrices onto one decomposition gives two
//! estimates of every singular vector, and the correlation between those
//! estimates, averaged over splits, measures how stable a latent variable is
//! across samples.

use crate::crosscov::{CrossBlockMode, cross_block_unchecked};
use crate::decompose::Decomposition;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use rand::seq::SliceRandom;

/// Each half needs two samples for its columns to be normalized.
pub const MIN_SPLIT_SAMPLES: usize = 4;

/// Split-half correlations of the X-side (`u`) and Y-side (`v`) singular vectors.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitHalfCorrelations {
    pub u: Array1<f64>,
    pub v: Array1<f64>,
}

/// Splits `0..n` into two disjoint sorted halves of sizes `n / 2` and `n - n / 2`.
pub fn split_indices<R: Rng + ?Sized>(n: usize, rng: &mut R) -> (Vec<usize>, Vec<usize>) {
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    let mut second = order.split_off(n / 2);
    order.sort_unstable();
    second.sort_unstable();
    (order, second)
}

/// Pearson correlation, or zero when either side has no spread.
fn pearson(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let n = a.len() as f64;
    let (mean_a, mean_b) = (a.sum() / n, b.sum() / n);
    let mut cross = 0.0;
    let mut ss_a = 0.0;
    let mut ss_b = 0.0;
    for (&va, &vb) in a.iter().zip(b.iter()) {
        let (da, db) = (va - mean_a, vb - mean_b);
        cross += da * db;
        ss_a += da * da;
        ss_b += db * db;
    }
    let scale = (ss_a * ss_b).sqrt();
    if scale > 0.0 { cross / scale } else { 0.0 }
}

/// Average split-half correlation of each latent variable of `decomposition`
/// over `n_split` random splits of the samples.
///
/// `x` and `y` hold raw rows; each half is normalized on its own. Callers
/// guarantee `n_split >= 1` and at least [`MIN_SPLIT_SAMPLES`] rows.
pub fn split_half<R: Rng + ?Sized>(
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    decomposition: &Decomposition,
    mode: CrossBlockMode,
    n_split: usize,
    rng: &mut R,
) -> SplitHalfCorrelations {
    let components = decomposition.n_components();
    let mut u = Array1::zeros(components);
    let mut v = Array1::zeros(components);

    for _ in 0..n_split {
        let (first, second) = split_indices(x.nrows(), rng);
        let half = |rows: &[usize]| {
            let xs = x.select(Axis(0), rows);
            let ys = y.select(Axis(0), rows);
            cross_block_unchecked(xs.view(), ys.view(), mode).matrix
        };
        let (r1, r2) = (half(&first), half(&second));

        // R is q x p: Rᵀ V estimates the X side and R U the Y side.
        let u1 = r1.t().dot(&decomposition.v);
        let u2 = r2.t().dot(&decomposition.v);
        let v1 = r1.dot(&decomposition.u);
        let v2 = r2.dot(&decomposition.u);
        for lv in 0..components {
            u[lv] += pearson(u1.column(lv), u2.column(lv));
            v[lv] += pearson(v1.column(lv), v2.column(lv));
        }
    }

    let splits = n_split.max(1) as f64;
    SplitHalfCorrelations {
        u: u / splits,
        v: v / splits,
    }
}
