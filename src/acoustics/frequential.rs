//! Frequency-domain solver.
//!
//! The bore is cut into cylindrical slices. Starting from the radiation load
//! at the bell, the acoustic state `(p, u)` is carried upstream through the
//! transfer matrix of each slice:
//!
//! ```text
//! [p_in]   [cosh ΓL      Zc·sinh ΓL] [p_out]
//! [u_in] = [sinh ΓL / Zc  cosh ΓL  ] [u_out]
//! ```
//!
//! With `u_bell = 1` this gives both the input impedance `p_in / u_in` and the
//! flow transfer `u_bell / u_in` in one pass.

use rayon::prelude::*;
use tracing::debug;

use crate::acoustics::physics::{InstrumentPhysics, omega};
use crate::domain::{Complex64, ImpedanceCurve};
use crate::error::AppError;
use crate::geometry::Slice;

pub const DEFAULT_MAX_SLICE_LENGTH: f64 = 2e-3;

/// Computes acoustic responses of an instrument on a frequency grid.
pub trait FrequencySolver: Sync {
    /// Input impedance normalized by the entry characteristic impedance.
    fn impedance(&self, physics: &InstrumentPhysics, freqs: &[f64]) -> Result<ImpedanceCurve, AppError>;

    /// Bell flow per unit entry flow at each frequency.
    fn bell_transfer(&self, physics: &InstrumentPhysics, freqs: &[f64]) -> Result<Vec<Complex64>, AppError>;

    /// Settings that change the result, for cache keys.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferMatrixSolver {
    pub max_slice_length: f64,
}

impl Default for TransferMatrixSolver {
    fn default() -> Self {
        Self {
            max_slice_length: DEFAULT_MAX_SLICE_LENGTH,
        }
    }
}

impl TransferMatrixSolver {
    pub fn new(max_slice_length: f64) -> Self {
        Self { max_slice_length }
    }

    fn entry_states(&self, physics: &InstrumentPhysics, freqs: &[f64]) -> Result<Vec<(Complex64, Complex64)>, AppError> {
        if let Some(f) = freqs.iter().find(|f| !(**f > 0.0 && f.is_finite())) {
            return Err(AppError::config(format!("Frequencies must be positive and finite, got {f}.")));
        }
        let slices = physics.geometry().slices(self.max_slice_length)?;
        debug!(slices = slices.len(), freqs = freqs.len(), "transfer matrix solve");

        let states: Vec<(Complex64, Complex64)> = freqs
            .par_iter()
            .map(|&f| propagate(physics, &slices, omega(f)))
            .collect();
        if states.iter().any(|(p, u)| !(p.re.is_finite() && p.im.is_finite() && u.re.is_finite() && u.im.is_finite())) {
            return Err(AppError::numeric("Transfer matrix produced non-finite values."));
        }
        Ok(states)
    }
}

/// `(p, u)` at the entry for a unit flow leaving the bell.
fn propagate(physics: &InstrumentPhysics, slices: &[Slice], w: f64) -> (Complex64, Complex64) {
    let mut u = Complex64::new(1.0, 0.0);
    let mut p = physics.radiation_impedance(w);
    for slice in slices.iter().rev() {
        let (gamma, zc) = physics.wave_constants(slice.radius, w);
        let gl = gamma * slice.length;
        let (ch, sh) = (gl.cosh(), gl.sinh());
        let p_in = ch * p + zc * sh * u;
        let u_in = sh / zc * p + ch * u;
        p = p_in;
        u = u_in;
    }
    (p, u)
}

impl FrequencySolver for TransferMatrixSolver {
    fn impedance(&self, physics: &InstrumentPhysics, freqs: &[f64]) -> Result<ImpedanceCurve, AppError> {
        let zc = physics.entry_zc();
        let values = self
            .entry_states(physics, freqs)?
            .into_iter()
            .map(|(p, u)| p / u / zc)
            .collect();
        ImpedanceCurve::new(freqs.to_vec(), values, Some(zc))
    }

    fn bell_transfer(&self, physics: &InstrumentPhysics, freqs: &[f64]) -> Result<Vec<Complex64>, AppError> {
        Ok(self
            .entry_states(physics, freqs)?
            .into_iter()
            .map(|(_, u)| Complex64::new(1.0, 0.0) / u)
            .collect())
    }

    fn describe(&self) -> String {
        format!("transfer-matrix;slice={:e}", self.max_slice_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acoustics::peaks::{PeakOptions, find_resonances};
    use crate::acoustics::physics::{LossModel, Radiation};
    use crate::geometry::BoreGeometry;
    use crate::math::arange;

    fn cylinder(losses: LossModel, radiation: Radiation) -> InstrumentPhysics {
        let g = BoreGeometry::from_points(&[(0.0, 0.007), (1.0, 0.007)]).unwrap();
        InstrumentPhysics::new(g, 20.0, losses, radiation)
    }

    #[test]
    fn lossless_open_cylinder_resonates_at_odd_quarter_wavelengths() {
        let physics = cylinder(LossModel::Lossless, Radiation::IdealOpen);
        let c = physics.air().c;
        let solver = TransferMatrixSolver::default();
        let z = solver.impedance(&physics, &arange(20.0, 1500.0, 0.5)).unwrap();
        // Ideal open, lossless: Z = j·tan(kL), poles at f = (2n+1)·c/(4L).
        let peaks = find_resonances(&z, 3, &PeakOptions::default()).unwrap();
        assert_eq!(peaks.len(), 3);
        for (n, peak) in peaks.iter().enumerate() {
            let expected = (2 * n + 1) as f64 * c / 4.0;
            assert!((peak.frequency - expected).abs() < 1.0, "{} vs {expected}", peak.frequency);
        }
    }

    #[test]
    fn losses_lower_the_peaks() {
        let solver = TransferMatrixSolver::default();
        let freqs = arange(50.0, 1000.0, 1.0);
        let ideal = solver
            .impedance(&cylinder(LossModel::Lossless, Radiation::Unflanged), &freqs)
            .unwrap();
        let lossy = solver
            .impedance(&cylinder(LossModel::BoundaryLayer, Radiation::Unflanged), &freqs)
            .unwrap();
        let max = |v: Vec<f64>| v.into_iter().fold(0.0, f64::max);
        assert!(max(lossy.modulus()) < max(ideal.modulus()));
        assert!(lossy.zc().unwrap() > 0.0);
    }

    #[test]
    fn zero_frequency_is_rejected() {
        let solver = TransferMatrixSolver::default();
        let physics = cylinder(LossModel::Lossless, Radiation::Unflanged);
        assert_eq!(solver.impedance(&physics, &[0.0, 10.0]).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn bell_flow_follows_entry_flow_at_low_frequency() {
        let physics = cylinder(LossModel::Lossless, Radiation::IdealOpen);
        let h = TransferMatrixSolver::default().bell_transfer(&physics, &[5.0, 85.0]).unwrap();
        // u_in = cos(kL)·u_bell for an ideal open end.
        assert!((h[0] - Complex64::new(1.0, 0.0)).norm() < 0.01);
        assert!(h[1].norm() > 10.0);
    }
}
