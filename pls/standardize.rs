//! Column preprocessing applied to every (possibly resampled) input block.
//!
//! Columns are z-scored with the sample standard deviation (`ddof = 1`).
//! A column whose spread is numerically zero cannot be scaled; such columns are
//! zero-filled and reported, so they contribute nothing to the cross-block
//! matrix instead of propagating NaN into the decomposition.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

/// Relative threshold under which a column's standard deviation counts as zero.
pub const ZERO_VARIANCE_EPSILON: f64 = 1.0e-12;

/// A z-scored copy of an input block.
#[derive(Clone, Debug)]
pub struct Standardized {
    pub data: Array2<f64>,
    /// Indices of columns that were constant and therefore zero-filled.
    pub constant_columns: Vec<usize>,
}

struct ColumnMoments {
    mean: f64,
    std_dev: f64,
    magnitude: f64,
}

impl ColumnMoments {
    fn of(column: ArrayView1<'_, f64>) -> Self {
        let n = column.len();
        let mean = column.sum() / n as f64;
        let magnitude = column.iter().fold(mean.abs(), |acc, v| acc.max(v.abs()));
        let std_dev = if n < 2 {
            0.0
        } else {
            let sum_sq: f64 = column.iter().map(|&v| (v - mean) * (v - mean)).sum();
            (sum_sq / (n - 1) as f64).sqrt()
        };
        Self {
            mean,
            std_dev,
            magnitude,
        }
    }

    /// Spread is judged against the column's own magnitude, never an absolute floor.
    fn is_constant(&self) -> bool {
        self.std_dev <= ZERO_VARIANCE_EPSILON * self.magnitude
    }
}

/// Z-scores every column of `matrix`. Constant columns become all zeros.
pub fn standardize(matrix: ArrayView2<'_, f64>) -> Standardized {
    let mut data = matrix.to_owned();
    let mut constant_columns = Vec::new();

    for (idx, mut column) in data.axis_iter_mut(Axis(1)).enumerate() {
        let moments = ColumnMoments::of(column.view());
        if moments.is_constant() {
            column.fill(0.0);
            constant_columns.push(idx);
            continue;
        }
        let (mean, inv) = (moments.mean, moments.std_dev.recip());
        column.mapv_inplace(|v| (v - mean) * inv);
    }

    Standardized {
        data,
        constant_columns,
    }
}

/// Removes the column means. Constant columns come out as exact zeros.
pub fn center(matrix: ArrayView2<'_, f64>) -> Standardized {
    let mut data = matrix.to_owned();
    let mut constant_columns = Vec::new();

    for (idx, mut column) in data.axis_iter_mut(Axis(1)).enumerate() {
        let moments = ColumnMoments::of(column.view());
        if moments.is_constant() {
            column.fill(0.0);
            constant_columns.push(idx);
            continue;
        }
        let mean = moments.mean;
        column.mapv_inplace(|v| v - mean);
    }

    Standardized {
        data,
        constant_columns,
    }
}
