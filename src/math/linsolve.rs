//! Pseudo-inverse solve of small linear systems.
//!
//! Fallback for the damped normal equations of the Levenberg–Marquardt loop
//! when the Cholesky factorization fails, e.g. when a parameter has no
//! influence on the residuals. Singular values below `RCOND · σ_max` are
//! dropped, so directions the residuals do not see get a zero step.

use nalgebra::{DMatrix, DVector};

/// Relative cutoff on singular values.
pub const RCOND: f64 = 1e-12;

/// Minimum-norm solution of `a · x = b`, or `None` when `a` is zero or not finite.
pub fn solve_pseudo_inverse(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    if a.nrows() != b.len() {
        return None;
    }
    let svd = a.clone().svd(true, true);
    let sigma_max = svd.singular_values.max();
    if !(sigma_max > 0.0 && sigma_max.is_finite()) {
        return None;
    }
    let x = svd.solve(b, RCOND * sigma_max).ok()?;
    x.iter().all(|v| v.is_finite()).then_some(x)
}
