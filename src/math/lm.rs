//! Levenberg–Marquardt nonlinear least squares.
//!
//! Minimizes `Σ r_i(x)²` for a residual model `r: ℝⁿ → ℝᵐ`:
//!
//! - Jacobian by forward finite differences, columns evaluated in parallel
//! - damped normal equations `(JᵀJ + λ·D) δ = −Jᵀr` with Moré's diagonal scaling
//!   `D` (running maximum of the column norms), solved by Cholesky with an SVD
//!   fallback
//! - a model may declare points infeasible (`None`); such trial steps are
//!   rejected like cost increases, which keeps geometric constraints satisfied
//!
//! Reaching the iteration cap is not an error: the best point found is returned
//! and the outcome says why the loop stopped.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::AppError;
use crate::math::solve_pseudo_inverse;

/// Relative finite-difference step (≈ √ε).
const FD_REL: f64 = 1.5e-8;
/// Absolute floor for the finite-difference step.
const FD_FLOOR: f64 = 1e-9;

const LAMBDA_MIN: f64 = 1e-15;
const LAMBDA_MAX: f64 = 1e16;

/// A residual function to be minimized in the least-squares sense.
pub trait ResidualModel: Sync {
    /// Residuals at `x`, or `None` when `x` violates the model's constraints.
    fn residuals(&self, x: &[f64]) -> Option<Vec<f64>>;
}

#[derive(Debug, Clone)]
pub struct LmOptions {
    pub max_iter: usize,
    /// Stop when an accepted step reduces the cost by less than `ftol · cost`.
    pub ftol: f64,
    /// Stop when `‖δ‖ ≤ xtol · (‖x‖ + xtol)`.
    pub xtol: f64,
    /// Stop when the largest gradient cosine falls below `gtol`.
    pub gtol: f64,
    pub initial_lambda: f64,
    /// Log every iteration at `info` instead of `debug`.
    pub verbose: bool,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iter: 100,
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-10,
            initial_lambda: 1e-3,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    NoParameters,
    ZeroCost,
    CostTolerance,
    StepTolerance,
    GradientTolerance,
    MaxIterations,
    /// No damping level produced a feasible, cost-reducing step.
    Stalled,
}

impl StopReason {
    pub fn converged(self) -> bool {
        !matches!(self, StopReason::MaxIterations | StopReason::Stalled)
    }
}

#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub x: Vec<f64>,
    pub cost_initial: f64,
    pub cost_final: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub reason: StopReason,
}

/// Run Levenberg–Marquardt from `x0`.
pub fn minimize<M: ResidualModel>(model: &M, x0: &[f64], opts: &LmOptions) -> Result<LmOutcome, AppError> {
    let n = x0.len();
    let mut evaluations = 1usize;
    let mut r = model
        .residuals(x0)
        .ok_or_else(|| AppError::numeric("Optimization start point violates the model constraints."))?;
    if r.iter().any(|v| !v.is_finite()) {
        return Err(AppError::numeric("Non-finite residuals at the optimization start point."));
    }
    let mut cost = sum_sq(&r);
    let cost_initial = cost;
    let mut x = x0.to_vec();

    let outcome = |x: Vec<f64>, cost: f64, iterations: usize, evaluations: usize, reason: StopReason| LmOutcome {
        x,
        cost_initial,
        cost_final: cost,
        iterations,
        evaluations,
        reason,
    };

    if n == 0 {
        return Ok(outcome(x, cost, 0, evaluations, StopReason::NoParameters));
    }
    if cost == 0.0 {
        return Ok(outcome(x, cost, 0, evaluations, StopReason::ZeroCost));
    }

    let mut lambda = opts.initial_lambda.max(LAMBDA_MIN);
    let mut scale = vec![0.0_f64; n];
    let mut reason = StopReason::MaxIterations;
    let mut iterations = 0;

    'outer: for iter in 1..=opts.max_iter {
        iterations = iter;
        let jac = jacobian(model, &x, &r);
        evaluations += n;

        let jt = jac.transpose();
        let a = &jt * &jac;
        let g = &jt * DVector::from_column_slice(&r);

        // Gradient test: largest cosine between a Jacobian column and r.
        let r_norm = cost.sqrt();
        let mut g_cos: f64 = 0.0;
        for k in 0..n {
            let col_norm = a[(k, k)].sqrt();
            scale[k] = scale[k].max(a[(k, k)]).max(1e-300);
            if col_norm > 0.0 {
                g_cos = g_cos.max(g[k].abs() / (col_norm * r_norm));
            }
        }
        if g_cos <= opts.gtol {
            reason = StopReason::GradientTolerance;
            break;
        }

        loop {
            if lambda > LAMBDA_MAX {
                reason = StopReason::Stalled;
                break 'outer;
            }
            let mut damped = a.clone();
            for k in 0..n {
                damped[(k, k)] += lambda * scale[k];
            }
            let Some(delta) = solve_damped(damped, -g.clone()) else {
                lambda *= 10.0;
                continue;
            };

            let step_norm = delta.norm();
            let x_new: Vec<f64> = x.iter().zip(delta.iter()).map(|(a, d)| a + d).collect();
            let x_norm = x_new.iter().map(|v| v * v).sum::<f64>().sqrt();
            evaluations += 1;
            let accepted = model
                .residuals(&x_new)
                .filter(|r_new| r_new.iter().all(|v| v.is_finite()))
                .map(|r_new| (sum_sq(&r_new), r_new))
                .filter(|(cost_new, _)| *cost_new < cost);
            let Some((cost_new, r_new)) = accepted else {
                // Rejected steps shrink as λ grows; a negligible one means x is settled.
                if step_norm <= opts.xtol * (x_norm + opts.xtol) {
                    reason = StopReason::StepTolerance;
                    break 'outer;
                }
                lambda *= 10.0;
                continue;
            };

            let reduction = cost - cost_new;
            let prev_cost = cost;
            x = x_new;
            r = r_new;
            cost = cost_new;
            lambda = (lambda / 10.0).max(LAMBDA_MIN);

            if opts.verbose {
                info!(iter, cost, lambda, step = step_norm, "lm iteration");
            } else {
                debug!(iter, cost, lambda, step = step_norm, "lm iteration");
            }

            if cost == 0.0 {
                reason = StopReason::ZeroCost;
                break 'outer;
            }
            if reduction <= opts.ftol * prev_cost {
                reason = StopReason::CostTolerance;
                break 'outer;
            }
            if step_norm <= opts.xtol * (x_norm + opts.xtol) {
                reason = StopReason::StepTolerance;
                break 'outer;
            }
            break;
        }
    }

    Ok(outcome(x, cost, iterations, evaluations, reason))
}

fn sum_sq(r: &[f64]) -> f64 {
    r.iter().map(|v| v * v).sum()
}

fn solve_damped(m: DMatrix<f64>, rhs: DVector<f64>) -> Option<DVector<f64>> {
    if let Some(chol) = m.clone().cholesky() {
        let delta = chol.solve(&rhs);
        if delta.iter().all(|v| v.is_finite()) {
            return Some(delta);
        }
    }
    solve_pseudo_inverse(&m, &rhs)
}

fn jacobian<M: ResidualModel>(model: &M, x: &[f64], r0: &[f64]) -> DMatrix<f64> {
    let m = r0.len();
    let columns: Vec<Vec<f64>> = (0..x.len())
        .into_par_iter()
        .map(|j| {
            let h = FD_REL * x[j].abs().max(FD_FLOOR / FD_REL);
            let mut xp = x.to_vec();
            xp[j] = x[j] + h;
            if let Some(rp) = model.residuals(&xp) {
                return rp.iter().zip(r0).map(|(a, b)| (a - b) / h).collect();
            }
            // Forward step left the feasible set: try backward.
            xp[j] = x[j] - h;
            match model.residuals(&xp) {
                Some(rm) => r0.iter().zip(&rm).map(|(a, b)| (a - b) / h).collect(),
                None => vec![0.0; m],
            }
        })
        .collect();

    let mut jac = DMatrix::<f64>::zeros(m, x.len());
    for (j, col) in columns.iter().enumerate() {
        for (i, v) in col.iter().enumerate() {
            jac[(i, j)] = if v.is_finite() { *v } else { 0.0 };
        }
    }
    jac
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y = a·exp(−b·t) sampled on a grid.
    struct ExpDecay {
        t: Vec<f64>,
        y: Vec<f64>,
    }

    impl ResidualModel for ExpDecay {
        fn residuals(&self, x: &[f64]) -> Option<Vec<f64>> {
            if x[1] < 0.0 {
                return None;
            }
            Some(
                self.t
                    .iter()
                    .zip(&self.y)
                    .map(|(&t, &y)| x[0] * (-x[1] * t).exp() - y)
                    .collect(),
            )
        }
    }

    struct Rosenbrock;

    impl ResidualModel for Rosenbrock {
        fn residuals(&self, x: &[f64]) -> Option<Vec<f64>> {
            Some(vec![10.0 * (x[1] - x[0] * x[0]), 1.0 - x[0]])
        }
    }

    #[test]
    fn recovers_exponential_decay() {
        let t: Vec<f64> = (0..40).map(|i| i as f64 * 0.1).collect();
        let y = t.iter().map(|&t| 2.5 * (-1.3 * t).exp()).collect();
        let model = ExpDecay { t, y };

        let out = minimize(&model, &[1.0, 0.5], &LmOptions::default()).unwrap();
        assert!(out.reason.converged(), "stopped with {:?}", out.reason);
        assert!((out.x[0] - 2.5).abs() < 1e-6);
        assert!((out.x[1] - 1.3).abs() < 1e-6);
        assert!(out.cost_final < 1e-12);
    }

    #[test]
    fn solves_rosenbrock() {
        let opts = LmOptions {
            max_iter: 200,
            ..LmOptions::default()
        };
        let out = minimize(&Rosenbrock, &[-1.2, 1.0], &opts).unwrap();
        assert!((out.x[0] - 1.0).abs() < 1e-6);
        assert!((out.x[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_residual_start_is_left_untouched() {
        let t: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y = t.iter().map(|&t| 2.0 * (-0.5 * t).exp()).collect();
        let model = ExpDecay { t, y };
        let out = minimize(&model, &[2.0, 0.5], &LmOptions::default()).unwrap();
        assert_eq!(out.reason, StopReason::ZeroCost);
        assert_eq!(out.iterations, 0);
        assert_eq!(out.x, vec![2.0, 0.5]);
    }

    #[test]
    fn infeasible_start_is_an_error() {
        let model = ExpDecay {
            t: vec![0.0, 1.0],
            y: vec![1.0, 0.5],
        };
        let err = minimize(&model, &[1.0, -1.0], &LmOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn iteration_cap_keeps_best_point() {
        let opts = LmOptions {
            max_iter: 2,
            ..LmOptions::default()
        };
        let out = minimize(&Rosenbrock, &[-1.2, 1.0], &opts).unwrap();
        assert_eq!(out.iterations, 2);
        assert!(out.cost_final < out.cost_initial);
    }
}
