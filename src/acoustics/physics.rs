//! Physical setting of an acoustic computation: bore, air, loss and radiation
//! models.

use std::f64::consts::{FRAC_1_SQRT_2, PI};
use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::acoustics::air::AirProperties;
use crate::domain::Complex64;
use crate::geometry::BoreGeometry;

/// Wall losses in the bore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LossModel {
    Lossless,
    /// First-order visco-thermal boundary layer (Keefe).
    #[serde(alias = "diffrepr", alias = "bl")]
    #[value(alias = "diffrepr", alias = "bl")]
    BoundaryLayer,
}

impl LossModel {
    pub fn keyword(self) -> &'static str {
        match self {
            LossModel::Lossless => "lossless",
            LossModel::BoundaryLayer => "boundary-layer",
        }
    }
}

impl fmt::Display for LossModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Boundary condition at the bell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Radiation {
    Unflanged,
    Flanged,
    /// `p = 0` at the bell.
    IdealOpen,
}

impl Radiation {
    pub fn keyword(self) -> &'static str {
        match self {
            Radiation::Unflanged => "unflanged",
            Radiation::Flanged => "flanged",
            Radiation::IdealOpen => "ideal-open",
        }
    }

    /// Radiation impedance normalized by the characteristic impedance of the
    /// bell, as a function of `ka`.
    ///
    /// `(a·(ka)² + j·b·ka) / (1 + a·(ka)²)`, which keeps the low-frequency limits
    /// `Re ≈ (ka)²/4`, `Im ≈ 0.6133·ka` (unflanged) and
    /// `Re ≈ (ka)²/2`, `Im ≈ 0.8216·ka` (flanged), and tends to 1 at high `ka`.
    pub fn normalized_impedance(self, ka: f64) -> Complex64 {
        let (a, b) = match self {
            Radiation::Unflanged => (0.25, 0.6133),
            Radiation::Flanged => (0.5, 0.8216),
            Radiation::IdealOpen => return Complex64::new(0.0, 0.0),
        };
        let ka2 = ka * ka;
        Complex64::new(a * ka2, b * ka) / (1.0 + a * ka2)
    }
}

impl fmt::Display for Radiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Everything a solver needs besides the frequencies.
#[derive(Debug, Clone)]
pub struct InstrumentPhysics {
    geometry: BoreGeometry,
    air: AirProperties,
    losses: LossModel,
    radiation: Radiation,
}

impl InstrumentPhysics {
    pub fn new(geometry: BoreGeometry, temperature: f64, losses: LossModel, radiation: Radiation) -> Self {
        Self {
            geometry,
            air: AirProperties::at(temperature),
            losses,
            radiation,
        }
    }

    pub fn geometry(&self) -> &BoreGeometry {
        &self.geometry
    }

    pub fn geometry_mut(&mut self) -> &mut BoreGeometry {
        &mut self.geometry
    }

    pub fn into_geometry(self) -> BoreGeometry {
        self.geometry
    }

    pub fn air(&self) -> &AirProperties {
        &self.air
    }

    pub fn temperature(&self) -> f64 {
        self.air.temperature
    }

    pub fn losses(&self) -> LossModel {
        self.losses
    }

    pub fn radiation(&self) -> Radiation {
        self.radiation
    }

    /// Characteristic impedance at the bore entry (Pa·s/m³).
    pub fn entry_zc(&self) -> f64 {
        self.air.characteristic_impedance(self.geometry.entry_radius())
    }

    /// Propagation constant `Γ` and characteristic impedance of a cylinder of
    /// radius `radius` at angular frequency `omega`.
    pub fn wave_constants(&self, radius: f64, omega: f64) -> (Complex64, Complex64) {
        let air = &self.air;
        let k = omega / air.c;
        let zc = air.characteristic_impedance(radius);
        match self.losses {
            LossModel::Lossless => (Complex64::new(0.0, k), Complex64::new(zc, 0.0)),
            LossModel::BoundaryLayer => {
                // Ratio of radius to viscous boundary-layer thickness.
                let rv = radius * (air.rho * omega / air.mu).sqrt();
                let thermal = (air.gamma - 1.0) / air.prandtl.sqrt();
                let eps_gamma = (1.0 + thermal) * FRAC_1_SQRT_2 / rv;
                let eps_z = (1.0 - thermal) * FRAC_1_SQRT_2 / rv;
                let j = Complex64::new(0.0, 1.0);
                let one_minus_j = Complex64::new(1.0, -1.0);
                let gamma = j * k * (Complex64::new(1.0, 0.0) + one_minus_j * eps_gamma);
                let zc = (Complex64::new(1.0, 0.0) + one_minus_j * eps_z) * zc;
                (gamma, zc)
            }
        }
    }

    /// Radiation impedance at the bell (Pa·s/m³).
    pub fn radiation_impedance(&self, omega: f64) -> Complex64 {
        let a = self.geometry.bell_radius();
        let ka = omega / self.air.c * a;
        self.radiation.normalized_impedance(ka) * self.air.characteristic_impedance(a)
    }
}

/// Angular frequency of `f` Hz.
pub fn omega(f: f64) -> f64 {
    2.0 * PI * f
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radiation_limits() {
        let low = Radiation::Unflanged.normalized_impedance(1e-3);
        assert!((low.im / 1e-3 - 0.6133).abs() < 1e-3);
        assert!((low.re / 1e-6 - 0.25).abs() < 1e-2);
        let high = Radiation::Flanged.normalized_impedance(1e3);
        assert!((high - Complex64::new(1.0, 0.0)).norm() < 1e-2);
        assert_eq!(Radiation::IdealOpen.normalized_impedance(2.0).norm(), 0.0);
    }

    #[test]
    fn boundary_layer_adds_attenuation() {
        let g = BoreGeometry::from_points(&[(0.0, 0.005), (1.0, 0.005)]).unwrap();
        let lossy = InstrumentPhysics::new(g.clone(), 20.0, LossModel::BoundaryLayer, Radiation::Unflanged);
        let ideal = InstrumentPhysics::new(g, 20.0, LossModel::Lossless, Radiation::Unflanged);
        let w = omega(500.0);
        let (gl, zl) = lossy.wave_constants(0.005, w);
        let (gi, zi) = ideal.wave_constants(0.005, w);
        assert!(gl.re > 0.0);
        assert_eq!(gi.re, 0.0);
        assert!(gl.im > gi.im);
        assert!(zl.re > zi.re);
    }

    #[test]
    fn loss_keywords() {
        assert_eq!(LossModel::from_str("diffrepr", true).unwrap(), LossModel::BoundaryLayer);
        assert_eq!(LossModel::from_str("lossless", true).unwrap(), LossModel::Lossless);
        assert!(LossModel::from_str("viscous", true).is_err());
        assert_eq!(Radiation::from_str("ideal-open", true).unwrap(), Radiation::IdealOpen);
    }
}
