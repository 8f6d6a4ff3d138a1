//! Inverse acoustic fit: adjust a geometry so that its simulated input
//! impedance matches measured values at selected frequencies.
//!
//! The objective is the relative quadratic error
//! `Σ |Z_sim(f) − Z_target(f)|² / Σ |Z_target(f)|²`, minimized over the active
//! parameters of the instrument's geometry.

use tracing::{info, warn};

use crate::acoustics::{FrequencySolver, InstrumentPhysics};
use crate::domain::{Complex64, ImpedanceCurve, ResonancePeak};
use crate::error::AppError;
use crate::fit::adjust::{AdjustReport, DEFAULT_MIN_PART_LENGTH};
use crate::math::{LmOptions, ResidualModel, minimize};

/// Relative offsets around each resonance used by the study.
pub const DEFAULT_OFFSETS: [f64; 7] = [-2e-3, -1e-3, -5e-4, 0.0, 5e-4, 1e-3, 2e-3];

/// Measured impedance values at the frequencies the fit should match.
#[derive(Debug, Clone, PartialEq)]
pub struct AcousticTargets {
    curve: ImpedanceCurve,
}

impl AcousticTargets {
    pub fn new(curve: ImpedanceCurve) -> Result<Self, AppError> {
        if curve.is_empty() {
            return Err(AppError::config("No target frequency for the acoustic fit."));
        }
        Ok(Self { curve })
    }

    /// Frequencies `(1 + c)·f` for every peak but the first and every offset
    /// `c`, plus `extra_band`; values interpolated from `measured`.
    ///
    /// The first peak is skipped: the pedal note is not played.
    pub fn around_resonances(
        measured: &ImpedanceCurve,
        peaks: &[ResonancePeak],
        offsets: &[f64],
        extra_band: &[f64],
    ) -> Result<Self, AppError> {
        let mut freqs: Vec<f64> = peaks
            .iter()
            .skip(1)
            .flat_map(|p| offsets.iter().map(move |c| (1.0 + c) * p.frequency))
            .chain(extra_band.iter().copied())
            .collect();
        if let Some(f) = freqs.iter().find(|f| !(**f > 0.0 && f.is_finite())) {
            return Err(AppError::config(format!("Invalid target frequency {f}.")));
        }
        freqs.sort_by(f64::total_cmp);
        freqs.dedup();

        let (lo, hi) = match (measured.freqs().first(), measured.freqs().last()) {
            (Some(lo), Some(hi)) => (*lo, *hi),
            _ => return Err(AppError::config("Measured impedance is empty.")),
        };
        let outside = freqs.iter().filter(|f| **f < lo || **f > hi).count();
        if outside > 0 {
            warn!(outside, lo, hi, "target frequencies outside the measured range, end values held");
        }

        let values = measured.interp_many(&freqs);
        Self::new(ImpedanceCurve::new(freqs, values, measured.zc())?)
    }

    pub fn freqs(&self) -> &[f64] {
        self.curve.freqs()
    }

    pub fn values(&self) -> &[Complex64] {
        self.curve.values()
    }

    pub fn curve(&self) -> &ImpedanceCurve {
        &self.curve
    }

    pub fn len(&self) -> usize {
        self.curve.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curve.is_empty()
    }
}

pub struct InverseAcousticOptimizer<S: FrequencySolver> {
    physics: InstrumentPhysics,
    solver: S,
    targets: AcousticTargets,
    min_part_length: f64,
}

struct ImpedanceResiduals<'a, S: FrequencySolver> {
    base: &'a InstrumentPhysics,
    solver: &'a S,
    targets: &'a AcousticTargets,
    scale: f64,
    min_part_length: f64,
}

impl<S: FrequencySolver> ResidualModel for ImpedanceResiduals<'_, S> {
    fn residuals(&self, values: &[f64]) -> Option<Vec<f64>> {
        let mut physics = self.base.clone();
        let geom = physics.geometry_mut();
        geom.params_mut().set_active_values(values).ok()?;
        geom.check_feasible(self.min_part_length).ok()?;
        let z = self.solver.impedance(&physics, self.targets.freqs()).ok()?;
        Some(relative_errors(z.values(), self.targets.values(), self.scale))
    }
}

/// Real and imaginary parts of `(z − target) / scale`, interleaved.
fn relative_errors(z: &[Complex64], target: &[Complex64], scale: f64) -> Vec<f64> {
    z.iter()
        .zip(target)
        .flat_map(|(a, b)| {
            let d = (a - b) / scale;
            [d.re, d.im]
        })
        .collect()
}

impl<S: FrequencySolver> InverseAcousticOptimizer<S> {
    pub fn new(physics: InstrumentPhysics, solver: S, targets: AcousticTargets) -> Self {
        Self {
            physics,
            solver,
            targets,
            min_part_length: DEFAULT_MIN_PART_LENGTH,
        }
    }

    pub fn with_min_part_length(mut self, min_part_length: f64) -> Self {
        self.min_part_length = min_part_length;
        self
    }

    pub fn physics(&self) -> &InstrumentPhysics {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut InstrumentPhysics {
        &mut self.physics
    }

    pub fn into_physics(self) -> InstrumentPhysics {
        self.physics
    }

    pub fn targets(&self) -> &AcousticTargets {
        &self.targets
    }

    fn scale(&self) -> Result<f64, AppError> {
        let energy: f64 = self.targets.values().iter().map(|z| z.norm_sqr()).sum();
        if !(energy > 0.0 && energy.is_finite()) {
            return Err(AppError::numeric("Target impedance has no energy."));
        }
        Ok(energy.sqrt())
    }

    /// Current relative quadratic error.
    pub fn objective(&self) -> Result<f64, AppError> {
        let z = self.solver.impedance(&self.physics, self.targets.freqs())?;
        let r = relative_errors(z.values(), self.targets.values(), self.scale()?);
        Ok(r.iter().map(|v| v * v).sum())
    }

    pub fn optimize(&mut self, opts: &LmOptions) -> Result<AdjustReport, AppError> {
        let n_active = self.physics.geometry().params().active_count();
        info!(
            n_active,
            targets = self.targets.len(),
            solver = %self.solver.describe(),
            "acoustic adjustment"
        );

        let model = ImpedanceResiduals {
            base: &self.physics,
            solver: &self.solver,
            targets: &self.targets,
            scale: self.scale()?,
            min_part_length: self.min_part_length,
        };
        let x0 = self.physics.geometry().params().active_values();
        let outcome = minimize(&model, &x0, opts)?;
        self.physics
            .geometry_mut()
            .params_mut()
            .set_active_values(&outcome.x)?;

        let report = AdjustReport::from_outcome(&outcome, n_active);
        if report.converged {
            info!(cost = report.cost_final, iterations = report.iterations, "acoustic adjustment done");
        } else {
            warn!(
                cost = report.cost_final,
                iterations = report.iterations,
                reason = ?report.reason,
                "acoustic adjustment stopped before convergence"
            );
        }
        Ok(report)
    }
}
