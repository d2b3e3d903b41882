use crate::linalg::LinalgError;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Smallest sample count for which a sample standard deviation exists.
pub const MIN_SAMPLES: usize = 2;

/// Which input block a validation failure refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Block {
    X,
    Y,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => f.write_str("X"),
            Self::Y => f.write_str("Y"),
        }
    }
}

/// The two resampling procedures run by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Procedure {
    Permutation,
    Bootstrap,
}

impl Procedure {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Permutation => "permutation test",
            Self::Bootstrap => "bootstrap resampling",
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

#[derive(Debug, Error)]
pub enum PlsError {
    #[error(
        "X and Y must describe the same samples, but X has {x_rows} rows and Y has {y_rows} rows"
    )]
    RowMismatch { x_rows: usize, y_rows: usize },

    #[error("Matrix {block} has no columns; at least one feature per block is required")]
    EmptyMatrix { block: Block },

    #[error("Found only {found} samples, but at least {required} are required")]
    InsufficientSamples { found: usize, required: usize },

    #[error(
        "Matrix {block} contains a non-finite value at row {row}, column {column}; inputs must be complete and numeric"
    )]
    NonFinite {
        block: Block,
        row: usize,
        column: usize,
    },

    #[error("Matrix {block} has {columns} columns but {labels} labels were provided")]
    LabelMismatch {
        block: Block,
        columns: usize,
        labels: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No shared structure to decompose: {0}")]
    Degenerate(String),

    #[error("Decomposition of the observed cross-block matrix failed: {0}")]
    Decomposition(#[from] LinalgError),

    #[error(
        "The {procedure} excluded {failed} of {requested} draws after repeated decomposition failures, exceeding the allowed fraction"
    )]
    TooManyFailures {
        procedure: Procedure,
        failed: usize,
        requested: usize,
    },

    #[error("The analysis was interrupted before all resamples completed")]
    Interrupted,

    #[error("Failed to build the worker thread pool: {0}")]
    ThreadPool(String),
}

/// Paired observations of two feature sets over the same samples.
#[derive(Clone, Debug)]
pub struct Dataset {
    x: Array2<f64>,
    y: Array2<f64>,
    x_labels: Option<Vec<String>>,
    y_labels: Option<Vec<String>>,
}

impl Dataset {
    /// Validates the pairing and the numeric content of `x` (`n x p`) and `y` (`n x q`).
    pub fn new(x: Array2<f64>, y: Array2<f64>) -> Result<Self, PlsError> {
        validate_pair(x.view(), y.view())?;
        Ok(Self {
            x,
            y,
            x_labels: None,
            y_labels: None,
        })
    }

    /// Attaches column labels. They are carried into the result untouched.
    pub fn with_labels(
        mut self,
        x_labels: Option<Vec<String>>,
        y_labels: Option<Vec<String>>,
    ) -> Result<Self, PlsError> {
        check_labels(Block::X, self.x.ncols(), x_labels.as_deref())?;
        check_labels(Block::Y, self.y.ncols(), y_labels.as_deref())?;
        self.x_labels = x_labels;
        self.y_labels = y_labels;
        Ok(self)
    }

    pub fn x(&self) -> ArrayView2<'_, f64> {
        self.x.view()
    }

    pub fn y(&self) -> ArrayView2<'_, f64> {
        self.y.view()
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn x_labels(&self) -> Option<&[String]> {
        self.x_labels.as_deref()
    }

    pub fn y_labels(&self) -> Option<&[String]> {
        self.y_labels.as_deref()
    }
}

fn check_labels(block: Block, columns: usize, labels: Option<&[String]>) -> Result<(), PlsError> {
    match labels {
        Some(labels) if labels.len() != columns => Err(PlsError::LabelMismatch {
            block,
            columns,
            labels: labels.len(),
        }),
        _ => Ok(()),
    }
}

/// Shape and content checks shared by every public entry point.
pub fn validate_pair(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>) -> Result<(), PlsError> {
    if x.nrows() != y.nrows() {
        return Err(PlsError::RowMismatch {
            x_rows: x.nrows(),
            y_rows: y.nrows(),
        });
    }
    if x.ncols() == 0 {
        return Err(PlsError::EmptyMatrix { block: Block::X });
    }
    if y.ncols() == 0 {
        return Err(PlsError::EmptyMatrix { block: Block::Y });
    }
    if x.nrows() < MIN_SAMPLES {
        return Err(PlsError::InsufficientSamples {
            found: x.nrows(),
            required: MIN_SAMPLES,
        });
    }
    for (block, matrix) in [(Block::X, x.view()), (Block::Y, y.view())] {
        if let Some(((row, column), _)) = matrix.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(PlsError::NonFinite { block, row, column });
        }
    }
    Ok(())
}
