use dyn_stack::{MemBuffer, MemStack};
use faer::diag::{Diag, DiagRef};
use faer::linalg::svd::{self, ComputeSvdVectors};
use faer::{Mat, MatRef, Par};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinalgError {
    #[error("SVD failed to converge")]
    SvdNoConvergence,
    #[error("SVD produced a non-finite singular value at position {0}")]
    NonFiniteSingularValue(usize),
    #[error("cannot decompose an empty {rows}x{cols} matrix")]
    EmptyMatrix { rows: usize, cols: usize },
    #[error("the matrix is identically zero, so its singular vectors are arbitrary")]
    ZeroMatrix,
    #[error("incompatible shapes {left:?} and {right:?}")]
    IncompatibleShapes {
        left: (usize, usize),
        right: (usize, usize),
    },
}

fn mat_to_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

fn diag_to_array(diag: DiagRef<'_, f64>) -> Array1<f64> {
    let mat = diag.column_vector().as_mat();
    Array1::from_shape_fn(mat.nrows(), |i| mat[(i, 0)])
}

enum FaerStorage<'a> {
    Borrowed(MatRef<'a, f64>),
    Owned(Mat<f64>),
}

/// Zero-copy faer view over an ndarray matrix when the memory layout allows it.
pub struct FaerArrayView<'a> {
    storage: FaerStorage<'a>,
}

impl<'a> FaerArrayView<'a> {
    pub fn new<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix2>) -> Self {
        let (rows, cols) = array.dim();
        let storage = match array.as_slice_memory_order() {
            Some(slice) if array.is_standard_layout() => {
                FaerStorage::Borrowed(MatRef::from_row_major_slice(slice, rows, cols))
            }
            Some(slice) if array.t().is_standard_layout() => {
                FaerStorage::Borrowed(MatRef::from_column_major_slice(slice, rows, cols))
            }
            _ => FaerStorage::Owned(Mat::from_fn(rows, cols, |i, j| array[(i, j)])),
        };
        Self { storage }
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        match &self.storage {
            FaerStorage::Borrowed(view) => *view,
            FaerStorage::Owned(mat) => mat.as_ref(),
        }
    }
}

/// Reduced singular value decomposition `A = U diag(S) Vᵀ`.
///
/// `u` is `rows x k`, `v` is `cols x k` (not transposed), `k = min(rows, cols)`.
#[derive(Clone, Debug)]
pub struct ThinSvd {
    pub u: Array2<f64>,
    pub s: Array1<f64>,
    pub v: Array2<f64>,
}

pub trait FaerSvd {
    fn thin_svd(&self) -> Result<ThinSvd, LinalgError>;
}

impl<S: Data<Elem = f64>> FaerSvd for ArrayBase<S, Ix2> {
    fn thin_svd(&self) -> Result<ThinSvd, LinalgError> {
        let (rows, cols) = self.dim();
        if rows == 0 || cols == 0 {
            return Err(LinalgError::EmptyMatrix { rows, cols });
        }
        let k = rows.min(cols);

        let faer_view = FaerArrayView::new(self);
        let faer_mat = faer_view.as_ref();

        let mut singular = Diag::<f64>::zeros(k);
        let mut u_storage = Mat::<f64>::zeros(rows, k);
        let mut v_storage = Mat::<f64>::zeros(cols, k);

        // Resampling parallelizes across draws, so each decomposition stays sequential.
        let par = Par::Seq;
        let mut mem = MemBuffer::new(svd::svd_scratch::<f64>(
            rows,
            cols,
            ComputeSvdVectors::Thin,
            ComputeSvdVectors::Thin,
            par,
            Default::default(),
        ));
        let mut stack = MemStack::new(&mut mem);

        svd::svd(
            faer_mat,
            singular.as_mut(),
            Some(u_storage.as_mut()),
            Some(v_storage.as_mut()),
            par,
            &mut stack,
            Default::default(),
        )
        .map_err(|_| LinalgError::SvdNoConvergence)?;

        let s = diag_to_array(singular.as_ref());
        if let Some(position) = s.iter().position(|value| !value.is_finite()) {
            return Err(LinalgError::NonFiniteSingularValue(position));
        }

        Ok(ThinSvd {
            u: mat_to_array(u_storage.as_ref()),
            s,
            v: mat_to_array(v_storage.as_ref()),
        })
    }
}
