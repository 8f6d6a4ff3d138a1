//! Geometric adjustment of a candidate bore to a reference bore.
//!
//! The reference radius is sampled once on an even grid over its span; the
//! objective is `Σ (r_candidate(x_i) − r_reference(x_i))²` over that grid and
//! is minimized over the candidate's active parameters.
//!
//! The candidate is mutated in place: successive `optimize` calls (with a
//! different activation in between) continue from the previous result.

use serde::Serialize;
use tracing::{info, warn};

use crate::error::AppError;
use crate::geometry::BoreGeometry;
use crate::math::{LmOptions, LmOutcome, ResidualModel, StopReason, minimize};

pub const DEFAULT_SAMPLES: usize = 10_000;
/// Shortest segment allowed while adjusting (m).
pub const DEFAULT_MIN_PART_LENGTH: f64 = 1e-4;

/// Outcome of one optimization call.
#[derive(Debug, Clone, Serialize)]
pub struct AdjustReport {
    pub cost_initial: f64,
    pub cost_final: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub n_active: usize,
    pub reason: StopReason,
    pub converged: bool,
}

impl AdjustReport {
    pub(crate) fn from_outcome(out: &LmOutcome, n_active: usize) -> Self {
        Self {
            cost_initial: out.cost_initial,
            cost_final: out.cost_final,
            iterations: out.iterations,
            evaluations: out.evaluations,
            n_active,
            reason: out.reason,
            converged: out.reason.converged(),
        }
    }
}

/// Radius deviation between the candidate and the reference, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeometricDeviation {
    pub max_mm: f64,
    pub mean_mm: f64,
}

#[derive(Debug, Clone)]
pub struct GeometryAdjuster {
    candidate: BoreGeometry,
    x: Vec<f64>,
    r_ref: Vec<f64>,
    min_part_length: f64,
}

struct RadiusResiduals<'a> {
    base: &'a BoreGeometry,
    x: &'a [f64],
    r_ref: &'a [f64],
    min_part_length: f64,
}

impl ResidualModel for RadiusResiduals<'_> {
    fn residuals(&self, values: &[f64]) -> Option<Vec<f64>> {
        let mut geom = self.base.clone();
        geom.params_mut().set_active_values(values).ok()?;
        geom.check_feasible(self.min_part_length).ok()?;
        let r = geom.radii_at(self.x).ok()?;
        Some(r.iter().zip(self.r_ref).map(|(a, b)| a - b).collect())
    }
}

impl GeometryAdjuster {
    pub fn new(candidate: BoreGeometry, reference: &BoreGeometry, n_samples: usize) -> Result<Self, AppError> {
        if n_samples < 2 {
            return Err(AppError::config(format!("Need at least 2 sample points, got {n_samples}.")));
        }
        let (x, r_ref) = reference.sample(n_samples)?;
        Ok(Self {
            candidate,
            x,
            r_ref,
            min_part_length: DEFAULT_MIN_PART_LENGTH,
        })
    }

    pub fn with_min_part_length(mut self, min_part_length: f64) -> Self {
        self.min_part_length = min_part_length;
        self
    }

    pub fn candidate(&self) -> &BoreGeometry {
        &self.candidate
    }

    pub fn candidate_mut(&mut self) -> &mut BoreGeometry {
        &mut self.candidate
    }

    pub fn into_candidate(self) -> BoreGeometry {
        self.candidate
    }

    pub fn sample_positions(&self) -> &[f64] {
        &self.x
    }

    /// Current value of the objective.
    pub fn objective(&self) -> Result<f64, AppError> {
        let r = self.candidate.radii_at(&self.x)?;
        Ok(r.iter().zip(&self.r_ref).map(|(a, b)| (a - b) * (a - b)).sum())
    }

    /// Minimize the objective over the active parameters and keep the best values.
    pub fn optimize(&mut self, opts: &LmOptions) -> Result<AdjustReport, AppError> {
        let n_active = self.candidate.params().active_count();
        info!(n_active, samples = self.x.len(), "geometric adjustment");

        let model = RadiusResiduals {
            base: &self.candidate,
            x: &self.x,
            r_ref: &self.r_ref,
            min_part_length: self.min_part_length,
        };
        let x0 = self.candidate.params().active_values();
        let outcome = minimize(&model, &x0, opts)?;
        self.candidate.params_mut().set_active_values(&outcome.x)?;

        let report = AdjustReport::from_outcome(&outcome, n_active);
        if report.converged {
            info!(
                cost = report.cost_final,
                iterations = report.iterations,
                reason = ?report.reason,
                "geometric adjustment done"
            );
        } else {
            warn!(
                cost = report.cost_final,
                iterations = report.iterations,
                reason = ?report.reason,
                "geometric adjustment stopped before convergence"
            );
        }
        Ok(report)
    }

    /// Max and mean absolute radius deviation over the sample grid.
    pub fn deviation(&self) -> Result<GeometricDeviation, AppError> {
        let r = self.candidate.radii_at(&self.x)?;
        let errors: Vec<f64> = r.iter().zip(&self.r_ref).map(|(a, b)| (a - b).abs() * 1e3).collect();
        let max_mm = errors.iter().copied().fold(0.0, f64::max);
        let mean_mm = errors.iter().sum::<f64>() / errors.len() as f64;
        Ok(GeometricDeviation { max_mm, mean_mm })
    }
}
