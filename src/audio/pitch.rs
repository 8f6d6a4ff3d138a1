//! Pitch tracking with the McLeod pitch method (MPM).
//!
//! For each analysis window the normalized square difference function
//!
//! ```text
//! n(τ) = 2·r(τ) / m(τ),   r(τ) = Σ x_j·x_{j+τ},   m(τ) = Σ (x_j² + x_{j+τ}²)
//! ```
//!
//! is computed (autocorrelation by FFT, `m` incrementally). The period is the
//! first key maximum reaching `cutoff` times the highest one, refined by a
//! parabola; its height is the clarity of the frame.

use serde::{Deserialize, Serialize};

use crate::domain::TimeSignal;
use crate::error::AppError;
use crate::math::autocorrelation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchOptions {
    /// Samples per analysis window.
    pub window: usize,
    /// Samples between consecutive windows.
    pub hop: usize,
    /// Hz
    pub fmin: f64,
    /// Pitch ceiling (Hz).
    pub fmax: f64,
    /// Fraction of the highest key maximum a candidate period must reach.
    pub cutoff: f64,
    /// Minimal clarity of a voiced frame.
    pub voicing_threshold: f64,
}

impl Default for PitchOptions {
    fn default() -> Self {
        Self {
            window: 2048,
            hop: 256,
            fmin: 50.0,
            fmax: 2000.0,
            cutoff: 0.93,
            voicing_threshold: 0.8,
        }
    }
}

impl PitchOptions {
    fn validate(&self) -> Result<(), AppError> {
        if self.window < 4 || self.hop == 0 {
            return Err(AppError::config("Pitch window must be >= 4 samples and hop > 0."));
        }
        if !(self.fmin > 0.0 && self.fmax > self.fmin) {
            return Err(AppError::config(format!(
                "Invalid pitch range [{}, {}] Hz.",
                self.fmin, self.fmax
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PitchFrame {
    /// Centre of the analysis window (s).
    pub time: f64,
    /// `None` for unvoiced frames.
    pub frequency: Option<f64>,
    pub clarity: f64,
}

/// Pitch of every analysis window of a uniformly sampled signal.
pub fn track_pitch(signal: &TimeSignal, opts: &PitchOptions) -> Result<Vec<PitchFrame>, AppError> {
    opts.validate()?;
    let sr = signal.sample_rate()?;
    let x = signal.values();
    if x.len() < opts.window {
        return Err(AppError::config(format!(
            "Signal has {} samples, fewer than the pitch window ({}).",
            x.len(),
            opts.window
        )));
    }

    let min_lag = ((sr / opts.fmax).floor() as usize).max(1);
    let max_lag = ((sr / opts.fmin).ceil() as usize).min(opts.window - 2);
    let t0 = signal.time()[0];

    let frames = (0..=(x.len() - opts.window) / opts.hop)
        .map(|k| {
            let start = k * opts.hop;
            let frame = &x[start..start + opts.window];
            let time = t0 + (start as f64 + 0.5 * opts.window as f64) / sr;
            match period(frame, min_lag, max_lag, opts.cutoff) {
                Some((tau, clarity)) => PitchFrame {
                    time,
                    frequency: (clarity >= opts.voicing_threshold).then_some(sr / tau),
                    clarity,
                },
                None => PitchFrame {
                    time,
                    frequency: None,
                    clarity: 0.0,
                },
            }
        })
        .collect();
    Ok(frames)
}

/// Mean pitch over the voiced frames of `signal` restricted to `[from, to]` s.
pub fn mean_pitch(signal: &TimeSignal, from: f64, to: f64, opts: &PitchOptions) -> Result<Option<f64>, AppError> {
    let part = signal.extract(from, to)?;
    let voiced: Vec<f64> = track_pitch(&part, opts)?
        .into_iter()
        .filter_map(|f| f.frequency)
        .collect();
    if voiced.is_empty() {
        return Ok(None);
    }
    Ok(Some(voiced.iter().sum::<f64>() / voiced.len() as f64))
}

fn nsdf(frame: &[f64]) -> Vec<f64> {
    let r = autocorrelation(frame);
    let n = frame.len();
    let mut m = 2.0 * r[0];
    let mut out = vec![0.0; n];
    for tau in 0..n {
        if tau > 0 {
            m -= frame[tau - 1] * frame[tau - 1] + frame[n - tau] * frame[n - tau];
        }
        out[tau] = if m > 1e-12 * r[0].max(f64::MIN_POSITIVE) { 2.0 * r[tau] / m } else { 0.0 };
    }
    out
}

/// `(period in samples, clarity)` of one window.
fn period(frame: &[f64], min_lag: usize, max_lag: usize, cutoff: f64) -> Option<(f64, f64)> {
    if frame.iter().all(|v| *v == 0.0) {
        return None;
    }
    let n = nsdf(frame);

    // Key maxima: the highest point of each positive lobe after the first
    // negative-going zero crossing.
    let mut maxima: Vec<usize> = Vec::new();
    let mut tau = 1;
    while tau < max_lag && n[tau] > 0.0 {
        tau += 1;
    }
    let mut current: Option<usize> = None;
    while tau <= max_lag {
        if n[tau] > 0.0 {
            if current.is_none_or(|c| n[tau] > n[c]) {
                current = Some(tau);
            }
        } else if let Some(c) = current.take() {
            maxima.push(c);
        }
        tau += 1;
    }
    maxima.extend(current);
    maxima.retain(|&t| t >= min_lag && t + 1 < n.len());

    let highest = maxima.iter().map(|&t| n[t]).fold(f64::NEG_INFINITY, f64::max);
    let chosen = *maxima.iter().find(|&&t| n[t] >= cutoff * highest)?;

    let (y0, y1, y2) = (n[chosen - 1], n[chosen], n[chosen + 1]);
    let a = 0.5 * (y0 - 2.0 * y1 + y2);
    let b = 0.5 * (y2 - y0);
    if a < 0.0 {
        let dt = (-b / (2.0 * a)).clamp(-1.0, 1.0);
        Some((chosen as f64 + dt, y1 + b * dt + a * dt * dt))
    } else {
        Some((chosen as f64, y1))
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::*;
    use crate::domain::Quantity;

    fn tone(partials: &[(f64, f64)], duration: f64) -> TimeSignal {
        let sr = 44_100.0;
        let n = (duration * sr) as usize;
        let values = (0..n)
            .map(|i| {
                let t = i as f64 / sr;
                partials.iter().map(|(f, a)| a * (2.0 * PI * f * t).sin()).sum()
            })
            .collect();
        TimeSignal::uniform(0.0, sr, values, Quantity::Audio).unwrap()
    }

    #[test]
    fn pure_tone_pitch() {
        let s = tone(&[(220.0, 1.0)], 0.3);
        let f = mean_pitch(&s, 0.05, 0.3, &PitchOptions::default()).unwrap().unwrap();
        assert!((f - 220.0).abs() < 0.5, "{f}");
    }

    #[test]
    fn harmonic_tone_gives_the_fundamental() {
        let s = tone(&[(150.0, 1.0), (300.0, 0.8), (450.0, 0.6)], 0.3);
        let frames = track_pitch(&s, &PitchOptions::default()).unwrap();
        assert!(!frames.is_empty());
        for frame in &frames {
            let f = frame.frequency.unwrap();
            assert!((f - 150.0).abs() < 1.0, "{f}");
            assert!(frame.clarity > 0.9);
        }
    }

    #[test]
    fn differentiated_sound_keeps_its_pitch() {
        let s = tone(&[(233.0, 1.0), (466.0, 0.5), (699.0, 0.3)], 0.3);
        let opts = PitchOptions::default();
        let raw = mean_pitch(&s, 0.05, 0.29, &opts).unwrap().unwrap();
        let diff = mean_pitch(&s.derivative().unwrap(), 0.05, 0.29, &opts).unwrap().unwrap();
        assert!((raw - 233.0).abs() < 1.0, "{raw}");
        assert!((diff - raw).abs() < 1.0, "{diff} vs {raw}");
    }

    #[test]
    fn silence_is_unvoiced() {
        let s = TimeSignal::uniform(0.0, 44_100.0, vec![0.0; 8000], Quantity::Audio).unwrap();
        assert_eq!(mean_pitch(&s, 0.0, 1.0, &PitchOptions::default()).unwrap(), None);
    }

    #[test]
    fn short_signal_is_rejected() {
        let s = tone(&[(220.0, 1.0)], 0.01);
        assert_eq!(track_pitch(&s, &PitchOptions::default()).unwrap_err().exit_code(), 2);
    }
}
