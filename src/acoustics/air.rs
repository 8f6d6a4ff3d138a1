//! Properties of air as a function of temperature.

use std::f64::consts::PI;

use serde::Serialize;

const KELVIN: f64 = 273.15;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AirProperties {
    /// °C
    pub temperature: f64,
    /// Density (kg/m³).
    pub rho: f64,
    /// Speed of sound (m/s).
    pub c: f64,
    /// Dynamic viscosity (Pa·s).
    pub mu: f64,
    /// Ratio of specific heats.
    pub gamma: f64,
    /// Prandtl number.
    pub prandtl: f64,
}

impl AirProperties {
    pub fn at(temperature: f64) -> Self {
        let t_abs = temperature + KELVIN;
        Self {
            temperature,
            rho: 1.2929 * KELVIN / t_abs,
            c: 331.45 * (t_abs / KELVIN).sqrt(),
            mu: 1.708e-5 * (1.0 + 0.0029 * temperature),
            gamma: 1.402,
            prandtl: 0.71,
        }
    }

    /// Plane-wave characteristic impedance `ρc / S` of a tube of radius `radius`.
    pub fn characteristic_impedance(&self, radius: f64) -> f64 {
        self.rho * self.c / (PI * radius * radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_temperature_values() {
        let air = AirProperties::at(20.0);
        assert!((air.c - 343.4).abs() < 0.5, "c = {}", air.c);
        assert!((air.rho - 1.2046).abs() < 1e-3, "rho = {}", air.rho);
        assert!(air.mu > 1.7e-5 && air.mu < 1.9e-5);
    }

    #[test]
    fn sound_gets_faster_when_warmer() {
        assert!(AirProperties::at(37.0).c > AirProperties::at(20.0).c);
    }
}
