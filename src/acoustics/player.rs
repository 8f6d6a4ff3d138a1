//! Excitation: a scaled one-degree-of-freedom lip model.
//!
//! Dimensionless variables: `x = h/H − 1` (so the lips touch at `x = −1`),
//! `p̃ = p/p_M`, `ũ = u·Zc/p_M` where `H` is the rest opening and `p_M` the
//! closing pressure. The lips obey
//!
//! ```text
//! ẍ + (ω/Q)·ẋ + ω²·x = σ·ω²·(γ(t) − p̃) + ω²·F_contact(x)
//! ũ = ζ·(1 + x)⁺·sign(γ − p̃)·√|γ − p̃| + κ·ẋ/ω
//! ```
//!
//! with `σ = +1` for outward striking lips and `−1` for inward striking ones,
//! and `F_contact = K·(−(1 + x))^e` once the lips are pressed together.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Piecewise-linear attack / decay / sustain / release envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Adsr {
    /// Time the attack begins (s).
    pub start: f64,
    /// Time from `start` to the release (s).
    pub gate: f64,
    /// Peak value.
    pub amplitude: f64,
    pub attack: f64,
    pub decay: f64,
    /// Sustain level as a fraction of `amplitude`.
    pub sustain: f64,
    pub release: f64,
}

impl Default for Adsr {
    fn default() -> Self {
        Self {
            start: 0.0,
            gate: 1.0,
            amplitude: 0.5,
            attack: 1e-2,
            decay: 1e-2,
            sustain: 1.0,
            release: 1e-2,
        }
    }
}

impl Adsr {
    pub fn value(&self, t: f64) -> f64 {
        let tau = t - self.start;
        if tau < 0.0 {
            return 0.0;
        }
        if tau < self.gate {
            return self.held(tau);
        }
        let r = (tau - self.gate) / self.release;
        if r >= 1.0 { 0.0 } else { self.held(self.gate) * (1.0 - r) }
    }

    /// Envelope while the gate is open.
    fn held(&self, tau: f64) -> f64 {
        let sustain = self.amplitude * self.sustain;
        if tau < self.attack {
            self.amplitude * tau / self.attack
        } else if tau < self.attack + self.decay {
            let u = (tau - self.attack) / self.decay;
            self.amplitude + (sustain - self.amplitude) * u
        } else {
            sustain
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LipDirection {
    Outwards,
    Inwards,
}

impl LipDirection {
    fn sign(self) -> f64 {
        match self {
            LipDirection::Outwards => 1.0,
            LipDirection::Inwards => -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LipModel {
    /// Dimensionless supply pressure `γ(t)`.
    pub gamma: Adsr,
    pub zeta: f64,
    pub kappa: f64,
    /// Lip resonance (rad/s).
    pub pulsation: f64,
    pub quality: f64,
    pub direction: LipDirection,
    pub contact_stiffness: f64,
    pub contact_exponent: f64,
    /// Rest opening `H` (m).
    pub opening: f64,
    /// Closing pressure `p_M` (Pa).
    pub closing_pressure: f64,
}

impl Default for LipModel {
    fn default() -> Self {
        Self {
            gamma: Adsr::default(),
            zeta: 0.1,
            kappa: 1e-3,
            pulsation: 2.0 * PI * 2700.0,
            quality: 33.0,
            direction: LipDirection::Outwards,
            contact_stiffness: 0.0,
            contact_exponent: 4.0,
            opening: 5e-4,
            closing_pressure: 5e3,
        }
    }
}

impl LipModel {
    pub fn validate(&self) -> Result<(), AppError> {
        let positive = [
            ("pulsation", self.pulsation),
            ("quality", self.quality),
            ("opening", self.opening),
            ("closing_pressure", self.closing_pressure),
        ];
        if let Some((name, v)) = positive.iter().find(|(_, v)| !(*v > 0.0 && v.is_finite())) {
            return Err(AppError::config(format!("Lip parameter '{name}' must be > 0, got {v}.")));
        }
        if !(self.zeta >= 0.0 && self.kappa >= 0.0 && self.contact_stiffness >= 0.0) {
            return Err(AppError::config("Lip parameters zeta, kappa and contact stiffness must be >= 0."));
        }
        if !(self.gamma.attack > 0.0 && self.gamma.decay > 0.0 && self.gamma.release > 0.0) {
            return Err(AppError::config("Envelope attack, decay and release must be > 0."));
        }
        Ok(())
    }

    /// Replace the lip resonance, given in Hz.
    pub fn set_lip_frequency(&mut self, f: f64) {
        self.pulsation = 2.0 * PI * f;
    }

    pub fn lip_frequency(&self) -> f64 {
        self.pulsation / (2.0 * PI)
    }

    /// Acceleration `ẍ` for the current state and mouthpiece pressure.
    pub fn acceleration(&self, x: f64, v: f64, gamma: f64, p: f64) -> f64 {
        let w = self.pulsation;
        let w2 = w * w;
        let contact = if x < -1.0 {
            self.contact_stiffness * (-(1.0 + x)).powf(self.contact_exponent)
        } else {
            0.0
        };
        self.direction.sign() * w2 * (gamma - p) - w2 * x - w / self.quality * v + w2 * contact
    }

    /// Flow through the lip channel for a pressure jump `gamma − p`.
    pub fn channel_flow(&self, x: f64, delta: f64) -> f64 {
        self.zeta * (1.0 + x).max(0.0) * delta.signum() * delta.abs().sqrt()
    }

    /// Flow swept by the moving lips.
    pub fn swept_flow(&self, v: f64) -> f64 {
        self.kappa * v / self.pulsation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adsr_shape() {
        let env = Adsr {
            start: 0.1,
            gate: 1.0,
            amplitude: 0.5,
            attack: 0.01,
            decay: 0.02,
            sustain: 0.8,
            release: 0.05,
        };
        assert_eq!(env.value(0.0), 0.0);
        assert!((env.value(0.105) - 0.25).abs() < 1e-12);
        assert!((env.value(0.11) - 0.5).abs() < 1e-9);
        assert!((env.value(0.5) - 0.4).abs() < 1e-12);
        assert!((env.value(1.125) - 0.2).abs() < 1e-6);
        assert_eq!(env.value(2.0), 0.0);
    }

    #[test]
    fn lip_frequency_round_trip() {
        let mut lips = LipModel::default();
        lips.set_lip_frequency(230.0);
        assert!((lips.lip_frequency() - 230.0).abs() < 1e-9);
        lips.validate().unwrap();
    }

    #[test]
    fn closed_lips_let_no_air_through() {
        let lips = LipModel::default();
        assert_eq!(lips.channel_flow(-1.2, 0.5), 0.0);
        assert!(lips.channel_flow(0.0, 0.25) > 0.0);
        assert!(lips.channel_flow(0.0, -0.25) < 0.0);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let lips = LipModel {
            quality: 0.0,
            ..LipModel::default()
        };
        assert_eq!(lips.validate().unwrap_err().exit_code(), 2);
    }
}
