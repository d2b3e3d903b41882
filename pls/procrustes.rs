//! Orthogonal Procrustes alignment of resampled singular vectors.
//!
//! Repeated decompositions return latent variables with arbitrary signs and, when
//! singular values are close, arbitrarily rotated within the near-tied subspace.
//! Before resampled loadings are compared with the original ones they are rotated
//! by the orthogonal matrix that best maps them onto the original loadings.

use crate::linalg::{FaerSvd, LinalgError};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, concatenate};

/// Returns the orthogonal `Q` minimizing `‖target - source·Q‖_F`.
///
/// With `sourceᵀ·target = N Σ Pᵀ` the minimizer is `Q = N Pᵀ`.
pub fn rotation(
    target: ArrayView2<'_, f64>,
    source: ArrayView2<'_, f64>,
) -> Result<Array2<f64>, LinalgError> {
    let cross = source.t().dot(&target);
    let svd = cross.thin_svd()?;
    Ok(svd.u.dot(&svd.v.t()))
}

/// Aligns one resampled pair of loadings to the original pair.
///
/// Both blocks share a single rotation found on the stacked `[U; V]` matrices,
/// which keeps each latent variable's X and Y sides consistent with each other.
pub fn align_loadings(
    u_target: ArrayView2<'_, f64>,
    v_target: ArrayView2<'_, f64>,
    u_source: ArrayView2<'_, f64>,
    v_source: ArrayView2<'_, f64>,
) -> Result<(Array2<f64>, Array2<f64>), LinalgError> {
    let target = stack_rows(u_target, v_target)?;
    let source = stack_rows(u_source, v_source)?;
    let q = rotation(target.view(), source.view())?;
    Ok((u_source.dot(&q), v_source.dot(&q)))
}

/// Singular values of a permuted decomposition after rotating it onto the original.
///
/// The permuted Y loadings are scaled by their singular values, rotated onto the
/// original Y loadings, and each latent variable's magnitude is read back as the
/// column norm of the result.
pub fn rotated_singular_values(
    v_target: ArrayView2<'_, f64>,
    v_source: ArrayView2<'_, f64>,
    s_source: ArrayView1<'_, f64>,
) -> Result<Array1<f64>, LinalgError> {
    let q = rotation(v_target, v_source)?;
    let scaled = &v_source * &s_source;
    let rotated = scaled.dot(&q);
    Ok(rotated.map_axis(Axis(0), |column| column.dot(&column).sqrt()))
}

fn stack_rows(
    top: ArrayView2<'_, f64>,
    bottom: ArrayView2<'_, f64>,
) -> Result<Array2<f64>, LinalgError> {
    concatenate(Axis(0), &[top.view(), bottom.view()]).map_err(|_| {
        LinalgError::IncompatibleShapes {
            left: top.dim(),
            right: bottom.dim(),
        }
    })
}
