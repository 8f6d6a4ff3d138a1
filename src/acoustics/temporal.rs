//! Time-domain synthesis.
//!
//! The bore is represented by two impulse responses computed once from the
//! frequency solver:
//!
//! - the reflection function `r`, inverse FFT of `R = (Z − 1)/(Z + 1)`, which
//!   relates the incoming and outgoing pressure waves at the entry
//!   (`p⁻ = r ∗ p⁺`)
//! - the flow transfer `g`, inverse FFT of `u_bell/u_entry`, used to derive the
//!   radiated flow from the entry flow after the run
//!
//! Both spectra are tapered by a half Hann window before the inverse FFT.
//!
//! At each step the lip equations are advanced with a semi-implicit Euler
//! scheme; the coupling `p̃ = a·ũ + (1 + a)·h` (`a = (1 + r₀)/(1 − r₀)`, `h` the
//! reflection history) turns the flow equation into a quadratic in
//! `√|γ − p̃|`, solved in closed form.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::acoustics::frequential::FrequencySolver;
use crate::acoustics::physics::InstrumentPhysics;
use crate::acoustics::player::LipModel;
use crate::domain::{Complex64, Recording};
use crate::error::AppError;
use crate::math::{fft_convolve, irfft};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalOptions {
    /// Hz
    pub sample_rate: f64,
    /// FFT length for the impulse responses.
    pub fft_len: usize,
    /// Samples of the impulse responses kept.
    pub reflection_len: usize,
}

impl Default for TemporalOptions {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            fft_len: 16_384,
            reflection_len: 8_192,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemporalSolver {
    options: TemporalOptions,
    zc: f64,
    reflection: Vec<f64>,
    bell_response: Vec<f64>,
}

impl TemporalSolver {
    pub fn new<S: FrequencySolver + ?Sized>(
        physics: &InstrumentPhysics,
        solver: &S,
        options: TemporalOptions,
    ) -> Result<Self, AppError> {
        if !(options.sample_rate > 0.0) {
            return Err(AppError::config(format!("Sample rate must be > 0, got {}.", options.sample_rate)));
        }
        if options.fft_len < 4 || options.reflection_len == 0 || options.reflection_len > options.fft_len {
            return Err(AppError::config(format!(
                "Need 0 < reflection_len <= fft_len (fft_len >= 4); got {} and {}.",
                options.reflection_len, options.fft_len
            )));
        }

        let n = options.fft_len;
        let half = n / 2;
        let df = options.sample_rate / n as f64;
        let freqs: Vec<f64> = (1..=half).map(|k| k as f64 * df).collect();

        let z = solver.impedance(physics, &freqs)?;
        let one = Complex64::new(1.0, 0.0);
        let mut refl: Vec<Complex64> = Vec::with_capacity(half + 1);
        refl.push(one);
        refl.extend(z.values().iter().map(|z| (z - one) / (z + one)));
        refl[0] = Complex64::new(refl[1].re, 0.0);

        let mut transfer: Vec<Complex64> = Vec::with_capacity(half + 1);
        transfer.push(one);
        transfer.extend(solver.bell_transfer(physics, &freqs)?);

        taper(&mut refl);
        taper(&mut transfer);
        let mut reflection = irfft(&refl, n);
        reflection.truncate(options.reflection_len);
        let mut bell_response = irfft(&transfer, n);
        bell_response.truncate(options.reflection_len);

        let r0 = reflection[0];
        if !(r0.abs() < 1.0) {
            return Err(AppError::numeric(format!("Reflection function starts at {r0}, expected |r0| < 1.")));
        }
        debug!(r0, len = reflection.len(), "reflection function ready");

        Ok(Self {
            options,
            zc: physics.entry_zc(),
            reflection,
            bell_response,
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.options.sample_rate
    }

    pub fn reflection(&self) -> &[f64] {
        &self.reflection
    }

    /// Play the instrument for `duration` seconds.
    pub fn run_simulation(&self, player: &LipModel, duration: f64) -> Result<Recording, AppError> {
        player.validate()?;
        if !(duration > 0.0) {
            return Err(AppError::config(format!("Simulation duration must be > 0, got {duration}.")));
        }
        let sr = self.options.sample_rate;
        let dt = 1.0 / sr;
        let n_steps = (duration * sr).round() as usize;
        info!(
            lip_frequency = player.lip_frequency(),
            duration,
            steps = n_steps,
            "time-domain simulation"
        );

        let r = &self.reflection;
        let r0 = r[0];
        let a = (1.0 + r0) / (1.0 - r0);
        let w = player.pulsation;
        let damping = 1.0 + dt * w / player.quality;

        let mut p_plus = vec![0.0; n_steps];
        let mut time = Vec::with_capacity(n_steps);
        let mut pressure = Vec::with_capacity(n_steps);
        let mut flow = Vec::with_capacity(n_steps);
        let mut opening = Vec::with_capacity(n_steps);

        let (mut x, mut v) = (0.0_f64, 0.0_f64);
        for step in 0..n_steps {
            let t = step as f64 * dt;
            let gamma = player.gamma.value(t);

            let history: f64 = r
                .iter()
                .enumerate()
                .skip(1)
                .take(step)
                .map(|(m, rm)| rm * p_plus[step - m])
                .sum();

            // Solve ũ = ũ_k + ζ(1+x)⁺ s √|Δ| with Δ = γ − a·ũ − (1+a)·h.
            let u_swept = player.swept_flow(v);
            let d0 = gamma - (1.0 + a) * history - a * u_swept;
            let coef = a * player.zeta * (1.0 + x).max(0.0);
            let root = 0.5 * (-coef + (coef * coef + 4.0 * d0.abs()).sqrt());
            let u = u_swept + player.zeta * (1.0 + x).max(0.0) * d0.signum() * root;
            let p = a * u + (1.0 + a) * history;
            p_plus[step] = 0.5 * (p + u);

            let acc_free = player.acceleration(x, 0.0, gamma, p);
            v = (v + dt * acc_free) / damping;
            x += dt * v;

            if !(p.is_finite() && u.is_finite() && x.is_finite()) {
                return Err(AppError::numeric(format!("Time-domain simulation diverged at t = {t:.4} s.")));
            }

            time.push(t);
            pressure.push(p * player.closing_pressure);
            flow.push(u * player.closing_pressure / self.zc);
            opening.push(player.opening * (1.0 + x).max(0.0));
        }

        let bell_flow = fft_convolve(&flow, &self.bell_response, n_steps);
        Ok(Recording {
            time,
            entry_pressure: pressure,
            entry_flow: flow,
            bell_flow,
            lip_opening: opening,
        })
    }
}

/// Half Hann window over bins `0..=n/2`, reaching zero at Nyquist.
fn taper(spectrum: &mut [Complex64]) {
    let last = spectrum.len().saturating_sub(1).max(1) as f64;
    for (k, v) in spectrum.iter_mut().enumerate() {
        let w = 0.5 * (1.0 + (std::f64::consts::PI * k as f64 / last).cos());
        *v *= w;
    }
}
