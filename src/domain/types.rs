//! Shared domain types.
//!
//! These types are intentionally kept lightweight so they can be:
//!
//! - produced by the solvers and consumed by the fitting code
//! - written to text/JSON/WAV files
//! - reloaded later for comparisons

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Complex number type used for impedances.
pub type Complex64 = nalgebra::Complex<f64>;

/// What an optimization parameter controls.
///
/// Staged fits select subsets by kind (e.g. "radii first, then positions")
/// instead of inspecting labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// Axial position of a node (segment boundary).
    Position,
    /// Bore radius at a node or spline knot.
    Radius,
    /// Shape-specific coefficient (Bessel flare, spline knot position).
    Shape,
}

impl ParamKind {
    pub fn label(self) -> &'static str {
        match self {
            ParamKind::Position => "position",
            ParamKind::Radius => "radius",
            ParamKind::Shape => "shape",
        }
    }
}

/// Input impedance sampled on a frequency grid.
///
/// Values are dimensionless: normalized by the characteristic impedance `Zc` of
/// the bore entry. `zc` keeps that normalization constant when it is known
/// (simulations, physical files) so values can be converted back.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpedanceCurve {
    freqs: Vec<f64>,
    values: Vec<Complex64>,
    zc: Option<f64>,
}

impl ImpedanceCurve {
    pub fn new(freqs: Vec<f64>, values: Vec<Complex64>, zc: Option<f64>) -> Result<Self, AppError> {
        if freqs.len() != values.len() {
            return Err(AppError::config(format!(
                "Impedance curve length mismatch: {} frequencies vs {} values.",
                freqs.len(),
                values.len()
            )));
        }
        if let Some(i) = freqs.windows(2).position(|w| !(w[1] > w[0])) {
            return Err(AppError::config(format!(
                "Impedance frequencies must be strictly increasing (index {}: {} then {}).",
                i + 1,
                freqs[i],
                freqs[i + 1]
            )));
        }
        if freqs.iter().any(|f| !f.is_finite()) {
            return Err(AppError::config("Impedance frequencies must be finite."));
        }
        if let Some(zc) = zc {
            if !(zc.is_finite() && zc > 0.0) {
                return Err(AppError::config(format!("Invalid characteristic impedance {zc}.")));
            }
        }
        Ok(Self { freqs, values, zc })
    }

    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    pub fn values(&self) -> &[Complex64] {
        &self.values
    }

    pub fn zc(&self) -> Option<f64> {
        self.zc
    }

    pub fn len(&self) -> usize {
        self.freqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freqs.is_empty()
    }

    /// |Z| (normalized).
    pub fn modulus(&self) -> Vec<f64> {
        self.values.iter().map(|z| z.norm()).collect()
    }

    /// 20·log10 |Z| (normalized).
    pub fn modulus_db(&self) -> Vec<f64> {
        self.values.iter().map(|z| 20.0 * z.norm().max(1e-300).log10()).collect()
    }

    /// Values in Pa·s/m³, when the normalization constant is known.
    pub fn denormalized(&self) -> Option<Vec<Complex64>> {
        self.zc.map(|zc| self.values.iter().map(|z| z * zc).collect())
    }

    /// Keep the samples between the grid points nearest to `fmin` and `fmax`
    /// (both included).
    pub fn crop(&self, fmin: f64, fmax: f64) -> Result<Self, AppError> {
        if self.is_empty() {
            return Err(AppError::config("Cannot crop an empty impedance curve."));
        }
        if !(fmax > fmin) {
            return Err(AppError::config(format!("Invalid crop range [{fmin}, {fmax}].")));
        }
        let lo = nearest_index(&self.freqs, fmin);
        let hi = nearest_index(&self.freqs, fmax);
        Self::new(
            self.freqs[lo..=hi].to_vec(),
            self.values[lo..=hi].to_vec(),
            self.zc,
        )
    }

    /// Linear interpolation of the real and imaginary parts.
    ///
    /// Outside the grid the end values are held (same as `numpy.interp`).
    pub fn interp(&self, f: f64) -> Complex64 {
        let n = self.freqs.len();
        if n == 0 {
            return Complex64::new(f64::NAN, f64::NAN);
        }
        if f <= self.freqs[0] {
            return self.values[0];
        }
        if f >= self.freqs[n - 1] {
            return self.values[n - 1];
        }
        let i = self.freqs.partition_point(|&x| x <= f);
        let (f0, f1) = (self.freqs[i - 1], self.freqs[i]);
        let t = (f - f0) / (f1 - f0);
        self.values[i - 1] * (1.0 - t) + self.values[i] * t
    }

    pub fn interp_many(&self, freqs: &[f64]) -> Vec<Complex64> {
        freqs.iter().map(|&f| self.interp(f)).collect()
    }
}

fn nearest_index(values: &[f64], target: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, &v) in values.iter().enumerate() {
        let d = (v - target).abs();
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    best
}

/// One resonance of an impedance curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResonancePeak {
    /// Resonance frequency (Hz).
    pub frequency: f64,
    /// Normalized impedance modulus at the resonance.
    pub amplitude: f64,
    /// Quality factor.
    pub quality: f64,
}

/// Physical quantity carried by a time signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Quantity {
    Pressure,
    Flow,
    FlowDerivative,
    Opening,
    /// Normalized waveform (e.g. read back from a WAV file).
    Audio,
}

impl Quantity {
    pub fn unit(self) -> &'static str {
        match self {
            Quantity::Pressure => "Pa",
            Quantity::Flow => "m^3/s",
            Quantity::FlowDerivative => "m^3/s^2",
            Quantity::Opening => "m",
            Quantity::Audio => "-",
        }
    }
}

/// Time samples paired with one physical quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSignal {
    time: Vec<f64>,
    values: Vec<f64>,
    quantity: Quantity,
}

impl TimeSignal {
    pub fn new(time: Vec<f64>, values: Vec<f64>, quantity: Quantity) -> Result<Self, AppError> {
        if time.len() != values.len() {
            return Err(AppError::config(format!(
                "Time signal length mismatch: {} times vs {} values.",
                time.len(),
                values.len()
            )));
        }
        if time.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(AppError::config("Time samples must be strictly increasing."));
        }
        Ok(Self {
            time,
            values,
            quantity,
        })
    }

    /// Uniformly sampled signal starting at `t0`.
    pub fn uniform(t0: f64, sample_rate: f64, values: Vec<f64>, quantity: Quantity) -> Result<Self, AppError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(AppError::config(format!("Invalid sample rate {sample_rate}.")));
        }
        let dt = 1.0 / sample_rate;
        let time = (0..values.len()).map(|i| t0 + i as f64 * dt).collect();
        Self::new(time, values, quantity)
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Sample rate of a uniformly sampled signal.
    ///
    /// Fails when the time step varies by more than a relative `1e-6`.
    pub fn sample_rate(&self) -> Result<f64, AppError> {
        if self.time.len() < 2 {
            return Err(AppError::config("A time signal needs at least two samples."));
        }
        let dt = (self.time[self.time.len() - 1] - self.time[0]) / (self.time.len() - 1) as f64;
        let uniform = self
            .time
            .windows(2)
            .all(|w| ((w[1] - w[0]) - dt).abs() <= 1e-6 * dt);
        if !uniform {
            return Err(AppError::config("Time signal is not uniformly sampled."));
        }
        Ok(1.0 / dt)
    }

    /// `diff(values) / diff(time)`, stamped at `time[..n-1]`.
    pub fn derivative(&self) -> Result<Self, AppError> {
        if self.time.len() < 2 {
            return Err(AppError::config("Cannot differentiate a signal with fewer than two samples."));
        }
        let values = self
            .time
            .windows(2)
            .zip(self.values.windows(2))
            .map(|(t, v)| (v[1] - v[0]) / (t[1] - t[0]))
            .collect();
        let quantity = match self.quantity {
            Quantity::Flow => Quantity::FlowDerivative,
            other => other,
        };
        Self::new(self.time[..self.time.len() - 1].to_vec(), values, quantity)
    }

    /// Samples with `from <= t <= to`.
    pub fn extract(&self, from: f64, to: f64) -> Result<Self, AppError> {
        let start = self.time.partition_point(|&t| t < from);
        let end = self.time.partition_point(|&t| t <= to);
        if end <= start {
            return Err(AppError::config(format!(
                "Empty extraction window [{from}, {to}] s."
            )));
        }
        Self::new(
            self.time[start..end].to_vec(),
            self.values[start..end].to_vec(),
            self.quantity,
        )
    }
}

/// Which recorded channel of a time-domain run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    EntryPressure,
    EntryFlow,
    BellFlow,
    LipOpening,
}

/// Output of a time-domain simulation.
#[derive(Debug, Clone)]
pub struct Recording {
    pub time: Vec<f64>,
    /// Acoustic pressure at the bore entry (Pa).
    pub entry_pressure: Vec<f64>,
    /// Volume flow entering the bore (m³/s).
    pub entry_flow: Vec<f64>,
    /// Volume flow radiated at the bell (m³/s).
    pub bell_flow: Vec<f64>,
    /// Lip opening height (m).
    pub lip_opening: Vec<f64>,
}

impl Recording {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn signal(&self, channel: Channel) -> Result<TimeSignal, AppError> {
        let (values, quantity) = match channel {
            Channel::EntryPressure => (&self.entry_pressure, Quantity::Pressure),
            Channel::EntryFlow => (&self.entry_flow, Quantity::Flow),
            Channel::BellFlow => (&self.bell_flow, Quantity::Flow),
            Channel::LipOpening => (&self.lip_opening, Quantity::Opening),
        };
        TimeSignal::new(self.time.clone(), values.clone(), quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    #[test]
    fn impedance_curve_rejects_non_increasing_frequencies() {
        let err = ImpedanceCurve::new(vec![10.0, 10.0, 20.0], vec![c(1.0, 0.0); 3], None).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(ImpedanceCurve::new(vec![10.0, 20.0], vec![c(1.0, 0.0)], None).is_err());
    }

    #[test]
    fn impedance_interp_is_linear_and_clamped() {
        let curve = ImpedanceCurve::new(vec![100.0, 200.0], vec![c(0.0, 2.0), c(10.0, -2.0)], Some(1.0)).unwrap();
        let mid = curve.interp(150.0);
        assert!((mid.re - 5.0).abs() < 1e-12);
        assert!(mid.im.abs() < 1e-12);
        assert_eq!(curve.interp(50.0), c(0.0, 2.0));
        assert_eq!(curve.interp(500.0), c(10.0, -2.0));
    }

    #[test]
    fn crop_uses_nearest_grid_points() {
        let freqs: Vec<f64> = (0..100).map(|i| 10.0 + i as f64 * 10.0).collect();
        let values = vec![c(1.0, 0.0); freqs.len()];
        let curve = ImpedanceCurve::new(freqs, values, None).unwrap();
        let cropped = curve.crop(34.0, 506.0).unwrap();
        assert_eq!(cropped.freqs()[0], 30.0);
        assert_eq!(*cropped.freqs().last().unwrap(), 510.0);
    }

    #[test]
    fn derivative_matches_finite_difference() {
        let sig = TimeSignal::uniform(0.0, 10.0, vec![0.0, 1.0, 4.0, 9.0], Quantity::Flow).unwrap();
        let d = sig.derivative().unwrap();
        assert_eq!(d.len(), 3);
        assert_eq!(d.quantity(), Quantity::FlowDerivative);
        assert!((d.values()[0] - 10.0).abs() < 1e-9);
        assert!((d.values()[2] - 50.0).abs() < 1e-9);
        assert!((d.sample_rate().unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn extract_keeps_window() {
        let sig = TimeSignal::uniform(0.0, 100.0, vec![0.0; 100], Quantity::Pressure).unwrap();
        let part = sig.extract(0.25, 0.5).unwrap();
        assert_eq!(part.len(), 26);
        assert!(sig.extract(2.0, 3.0).is_err());
    }
}
