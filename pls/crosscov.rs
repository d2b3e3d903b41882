use crate::standardize::{Standardized, center, standardize};
use crate::types::{PlsError, validate_pair};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// How the two blocks are normalized before their cross-product is formed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossBlockMode {
    /// Z-scored blocks; entries of R are Pearson correlations.
    #[default]
    Correlation,
    /// Mean-centered blocks; entries of R are sample covariances.
    Covariance,
}

/// Cross-block matrix `R` (`q x p`) for one (possibly resampled) pair of blocks.
#[derive(Clone, Debug)]
pub struct CrossBlock {
    pub matrix: Array2<f64>,
    /// X columns that were constant and zero-filled.
    pub x_constant_columns: Vec<usize>,
    /// Y columns that were constant and zero-filled.
    pub y_constant_columns: Vec<usize>,
}

impl CrossBlock {
    /// Constant columns across both blocks.
    pub fn constant_column_count(&self) -> usize {
        self.x_constant_columns.len() + self.y_constant_columns.len()
    }

    /// True when every entry is zero, so the decomposition has no defined direction.
    pub fn is_zero(&self) -> bool {
        self.matrix.iter().all(|&value| value == 0.0)
    }
}

/// Normalizes one block the way `mode` requires.
pub fn normalize(matrix: ArrayView2<'_, f64>, mode: CrossBlockMode) -> Standardized {
    match mode {
        CrossBlockMode::Correlation => standardize(matrix),
        CrossBlockMode::Covariance => center(matrix),
    }
}

/// Builds `R = Ỹᵀ X̃ / (n - 1)` without re-validating shapes.
///
/// Callers must have validated the pair; resampling loops call this on every draw.
pub fn cross_block_unchecked(
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    mode: CrossBlockMode,
) -> CrossBlock {
    let n = x.nrows();
    let xn = normalize(x, mode);
    let yn = normalize(y, mode);
    let denom = n.saturating_sub(1).max(1) as f64;
    let matrix = yn.data.t().dot(&xn.data) / denom;
    CrossBlock {
        matrix,
        x_constant_columns: xn.constant_columns,
        y_constant_columns: yn.constant_columns,
    }
}

/// Validated cross-block construction.
pub fn cross_block(
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    mode: CrossBlockMode,
) -> Result<CrossBlock, PlsError> {
    validate_pair(x, y)?;
    Ok(cross_block_unchecked(x, y, mode))
}

/// Cross-correlation of `x` (`n x p`) and `y` (`n x q`), shape `q x p`.
pub fn xcorr(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>) -> Result<Array2<f64>, PlsError> {
    cross_block(x, y, CrossBlockMode::Correlation).map(|block| block.matrix)
}

/// Cross-covariance of `x` (`n x p`) and `y` (`n x q`), shape `q x p`.
pub fn xcov(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>) -> Result<Array2<f64>, PlsError> {
    cross_block(x, y, CrossBlockMode::Covariance).map(|block| block.matrix)
}
