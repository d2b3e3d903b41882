//! The immutable result bundle handed back by the pipeline.

use crate::config::{ResolvedConfig, StorageError};
use ndarray::{Array1, Array2};
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Significance of each latent variable under the permutation null.
#[derive(Clone, Debug, Serialize)]
pub struct PermutationResult {
    pub(crate) requested: usize,
    pub(crate) completed: usize,
    pub(crate) excluded: usize,
    pub(crate) retried: usize,
    pub(crate) rotated: bool,
    pub(crate) exceedances: Vec<usize>,
    pub(crate) p_values: Array1<f64>,
    pub(crate) split_half: Option<SplitHalfResult>,
}

impl PermutationResult {
    /// `(1 + exceedances) / (1 + completed)` per latent variable.
    pub fn p_values(&self) -> &Array1<f64> {
        &self.p_values
    }

    /// Completed draws whose singular value reached the observed one.
    pub fn exceedances(&self) -> &[usize] {
        &self.exceedances
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn excluded(&self) -> usize {
        self.excluded
    }

    pub fn retried(&self) -> usize {
        self.retried
    }

    pub fn rotated(&self) -> bool {
        self.rotated
    }

    /// Present when split-half resampling was requested.
    pub fn split_half(&self) -> Option<&SplitHalfResult> {
        self.split_half.as_ref()
    }
}

/// Split-half reliability of each latent variable, tested against the
/// permutation null. Every array has one entry per latent variable.
#[derive(Clone, Debug, Serialize)]
pub struct SplitHalfResult {
    pub(crate) n_split: usize,
    pub(crate) ci: f64,
    pub(crate) u_correlations: Array1<f64>,
    pub(crate) v_correlations: Array1<f64>,
    pub(crate) u_p_values: Array1<f64>,
    pub(crate) v_p_values: Array1<f64>,
    pub(crate) u_lower: Array1<f64>,
    pub(crate) u_upper: Array1<f64>,
    pub(crate) v_lower: Array1<f64>,
    pub(crate) v_upper: Array1<f64>,
}

impl SplitHalfResult {
    /// Splits averaged per decomposition.
    pub fn n_split(&self) -> usize {
        self.n_split
    }

    pub fn ci(&self) -> f64 {
        self.ci
    }

    /// Observed split-half correlation of the X-side singular vectors.
    pub fn u_correlations(&self) -> &Array1<f64> {
        &self.u_correlations
    }

    /// Observed split-half correlation of the Y-side singular vectors.
    pub fn v_correlations(&self) -> &Array1<f64> {
        &self.v_correlations
    }

    pub fn u_p_values(&self) -> &Array1<f64> {
        &self.u_p_values
    }

    pub fn v_p_values(&self) -> &Array1<f64> {
        &self.v_p_values
    }

    /// Percentile bounds of the permuted X-side correlations.
    pub fn u_interval(&self) -> (&Array1<f64>, &Array1<f64>) {
        (&self.u_lower, &self.u_upper)
    }

    /// Percentile bounds of the permuted Y-side correlations.
    pub fn v_interval(&self) -> (&Array1<f64>, &Array1<f64>) {
        (&self.v_lower, &self.v_upper)
    }
}

/// Bootstrap summaries of one `features x l` table of loadings or correlations.
#[derive(Clone, Debug, Serialize)]
pub struct EntryStats {
    pub(crate) standard_errors: Array2<f64>,
    pub(crate) ratios: Array2<f64>,
    pub(crate) lower: Array2<f64>,
    pub(crate) upper: Array2<f64>,
}

impl EntryStats {
    pub fn standard_errors(&self) -> &Array2<f64> {
        &self.standard_errors
    }

    /// Observed value divided by its standard error.
    pub fn ratios(&self) -> &Array2<f64> {
        &self.ratios
    }

    /// Lower percentile bound over the completed draws.
    pub fn lower(&self) -> &Array2<f64> {
        &self.lower
    }

    /// Upper percentile bound over the completed draws.
    pub fn upper(&self) -> &Array2<f64> {
        &self.upper
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BootstrapResult {
    pub(crate) ci: f64,
    pub(crate) requested: usize,
    pub(crate) completed: usize,
    pub(crate) excluded: usize,
    pub(crate) retried: usize,
    pub(crate) degenerate_draws: usize,
    pub(crate) x: EntryStats,
    pub(crate) y: EntryStats,
    pub(crate) y_correlations: EntryStats,
}

impl BootstrapResult {
    pub fn x(&self) -> &EntryStats {
        &self.x
    }

    pub fn y(&self) -> &EntryStats {
        &self.y
    }

    /// Bootstrap distribution of the Y feature correlations with the X scores, `q x l`.
    pub fn y_correlations(&self) -> &EntryStats {
        &self.y_correlations
    }

    pub fn ci(&self) -> f64 {
        self.ci
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn excluded(&self) -> usize {
        self.excluded
    }

    pub fn retried(&self) -> usize {
        self.retried
    }

    /// Completed draws in which at least one column was constant and zero-filled.
    pub fn degenerate_draws(&self) -> usize {
        self.degenerate_draws
    }
}

/// Everything a behavioral PLS run produces.
///
/// Plain values come before nested tables so the TOML form stays readable.
#[derive(Clone, Debug, Serialize)]
pub struct PlsResult {
    pub(crate) n_samples: usize,
    pub(crate) x_constant_columns: Vec<usize>,
    pub(crate) y_constant_columns: Vec<usize>,
    pub(crate) x_labels: Option<Vec<String>>,
    pub(crate) y_labels: Option<Vec<String>>,
    pub(crate) config: ResolvedConfig,
    pub(crate) singular_values: Array1<f64>,
    pub(crate) effect_sizes: Array1<f64>,
    pub(crate) x_loadings: Array2<f64>,
    pub(crate) y_loadings: Array2<f64>,
    pub(crate) x_scores: Array2<f64>,
    pub(crate) y_scores: Array2<f64>,
    pub(crate) y_correlations: Array2<f64>,
    pub(crate) permutation: PermutationResult,
    pub(crate) bootstrap: BootstrapResult,
}

impl PlsResult {
    /// The configuration the run actually used, including the seed.
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn n_components(&self) -> usize {
        self.singular_values.len()
    }

    /// Descending singular values of the cross-block matrix.
    pub fn singular_values(&self) -> &Array1<f64> {
        &self.singular_values
    }

    pub fn effect_sizes(&self) -> &Array1<f64> {
        &self.effect_sizes
    }

    /// `U`, `p x l`.
    pub fn x_loadings(&self) -> &Array2<f64> {
        &self.x_loadings
    }

    /// `V`, `q x l`.
    pub fn y_loadings(&self) -> &Array2<f64> {
        &self.y_loadings
    }

    pub fn x_scores(&self) -> &Array2<f64> {
        &self.x_scores
    }

    pub fn y_scores(&self) -> &Array2<f64> {
        &self.y_scores
    }

    /// Correlation of each Y feature with each latent variable's X score, `q x l`.
    pub fn y_correlations(&self) -> &Array2<f64> {
        &self.y_correlations
    }

    pub fn x_constant_columns(&self) -> &[usize] {
        &self.x_constant_columns
    }

    pub fn y_constant_columns(&self) -> &[usize] {
        &self.y_constant_columns
    }

    pub fn x_labels(&self) -> Option<&[String]> {
        self.x_labels.as_deref()
    }

    pub fn y_labels(&self) -> Option<&[String]> {
        self.y_labels.as_deref()
    }

    pub fn permutation(&self) -> &PermutationResult {
        &self.permutation
    }

    pub fn bootstrap(&self) -> &BootstrapResult {
        &self.bootstrap
    }

    /// Writes the bundle as human-readable TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }
}
