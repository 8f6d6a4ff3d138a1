//! Resonance extraction from impedance curves.
//!
//! A resonance is a local maximum of |Z| above `fmin` that stands out from its
//! surroundings by at least `min_prominence_db`. For each one:
//!
//! - frequency and amplitude are refined by a parabola through the three
//!   samples around the maximum (in dB)
//! - the quality factor is `f / Δf` with `Δf` the −3 dB bandwidth, or, when
//!   the curve does not drop 3 dB on both sides, the width implied by the
//!   parabola's curvature

use tracing::warn;

use crate::domain::{ImpedanceCurve, ResonancePeak};
use crate::error::AppError;

const HALF_POWER_DB: f64 = 3.010_299_956_639_812;

#[derive(Debug, Clone, PartialEq)]
pub struct PeakOptions {
    /// Ignore maxima below this frequency (Hz).
    pub fmin: f64,
    /// Minimum height above the higher of the two surrounding valleys (dB).
    pub min_prominence_db: f64,
}

impl Default for PeakOptions {
    fn default() -> Self {
        Self {
            fmin: 0.0,
            min_prominence_db: 1.0,
        }
    }
}

/// First `k` resonances above `opts.fmin`, by increasing frequency.
///
/// Finding fewer than `k` is logged, not an error.
pub fn find_resonances(curve: &ImpedanceCurve, k: usize, opts: &PeakOptions) -> Result<Vec<ResonancePeak>, AppError> {
    if curve.len() < 3 {
        return Err(AppError::config(format!(
            "Need at least 3 impedance samples to find resonances, got {}.",
            curve.len()
        )));
    }
    let freqs = curve.freqs();
    let mag = curve.modulus();
    let db = curve.modulus_db();

    let mut peaks = Vec::with_capacity(k);
    for i in 1..mag.len() - 1 {
        if peaks.len() == k {
            break;
        }
        if freqs[i] < opts.fmin {
            continue;
        }
        if !(mag[i] > mag[i - 1] && mag[i] >= mag[i + 1]) {
            continue;
        }
        if local_prominence_db(&mag, i) < opts.min_prominence_db {
            continue;
        }
        peaks.push(refine(freqs, &db, i));
    }

    if peaks.len() < k {
        warn!(
            found = peaks.len(),
            requested = k,
            fmin = opts.fmin,
            "fewer resonances than requested"
        );
    }
    Ok(peaks)
}

fn local_prominence_db(mag: &[f64], idx: usize) -> f64 {
    let peak = mag[idx];
    if peak <= 0.0 {
        return f64::NEG_INFINITY;
    }

    let mut left_min = peak;
    for &v in mag[..idx].iter().rev() {
        left_min = left_min.min(v);
        if v > peak {
            break;
        }
    }
    let mut right_min = peak;
    for &v in &mag[idx + 1..] {
        right_min = right_min.min(v);
        if v > peak {
            break;
        }
    }

    let base = left_min.max(right_min).max(1e-300);
    20.0 * (peak / base).log10()
}

fn refine(freqs: &[f64], db: &[f64], i: usize) -> ResonancePeak {
    let (y0, y1, y2) = (db[i - 1], db[i], db[i + 1]);
    let h = 0.5 * (freqs[i + 1] - freqs[i - 1]);
    // y(t) = y1 + b·t + a·t² with t in grid steps.
    let a = 0.5 * (y0 - 2.0 * y1 + y2);
    let b = 0.5 * (y2 - y0);
    let (frequency, peak_db) = if a < 0.0 {
        let t = (-b / (2.0 * a)).clamp(-1.0, 1.0);
        (freqs[i] + t * h, y1 + b * t + a * t * t)
    } else {
        (freqs[i], y1)
    };

    let target = peak_db - HALF_POWER_DB;
    let quality = match (crossing(freqs, db, i, target, -1), crossing(freqs, db, i, target, 1)) {
        (Some(lo), Some(hi)) if hi > lo => frequency / (hi - lo),
        _ if a < 0.0 => {
            let curvature = -a / (h * h);
            frequency / (2.0 * (HALF_POWER_DB / curvature).sqrt())
        }
        _ => f64::NAN,
    };

    ResonancePeak {
        frequency,
        amplitude: 10f64.powf(peak_db / 20.0),
        quality,
    }
}

/// Frequency where `db` first falls below `target` walking from `i` in `dir`,
/// linearly interpolated. `None` if the curve rises above the peak first or the
/// grid ends.
fn crossing(freqs: &[f64], db: &[f64], i: usize, target: f64, dir: isize) -> Option<f64> {
    let mut j = i;
    loop {
        let next = j.checked_add_signed(dir)?;
        if next >= db.len() || db[next] > db[i] {
            return None;
        }
        if db[next] <= target {
            let t = (db[j] - target) / (db[j] - db[next]);
            return Some(freqs[j] + t * (freqs[next] - freqs[j]));
        }
        j = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Complex64;
    use crate::math::arange;

    /// Sum of second-order resonators `1 / (1 + jQ(f/fn − fn/f))`.
    fn resonators(modes: &[(f64, f64, f64)], freqs: &[f64]) -> ImpedanceCurve {
        let values: Vec<Complex64> = freqs
            .iter()
            .map(|&f| {
                modes
                    .iter()
                    .map(|&(fn_, q, amp)| {
                        Complex64::new(amp, 0.0) / Complex64::new(1.0, q * (f / fn_ - fn_ / f))
                    })
                    .sum::<Complex64>()
            })
            .collect();
        ImpedanceCurve::new(freqs.to_vec(), values, None).unwrap()
    }

    #[test]
    fn finds_isolated_resonance_with_quality() {
        let z = resonators(&[(440.0, 30.0, 20.0)], &arange(100.0, 1000.0, 1.0));
        let peaks = find_resonances(&z, 1, &PeakOptions::default()).unwrap();
        assert_eq!(peaks.len(), 1);
        assert!((peaks[0].frequency - 440.0).abs() < 0.2);
        assert!((peaks[0].amplitude - 20.0).abs() < 0.1);
        assert!((peaks[0].quality - 30.0).abs() < 1.0, "Q = {}", peaks[0].quality);
    }

    #[test]
    fn returns_at_most_k_sorted_peaks_above_fmin() {
        let modes = [(90.0, 20.0, 10.0), (230.0, 25.0, 30.0), (350.0, 25.0, 25.0), (470.0, 25.0, 20.0)];
        let z = resonators(&modes, &arange(30.0, 600.0, 0.5));
        let opts = PeakOptions {
            fmin: 150.0,
            ..PeakOptions::default()
        };
        let peaks = find_resonances(&z, 2, &opts).unwrap();
        assert_eq!(peaks.len(), 2);
        assert!((peaks[0].frequency - 230.0).abs() < 2.0);
        assert!(peaks.windows(2).all(|w| w[1].frequency > w[0].frequency));

        let all = find_resonances(&z, 10, &PeakOptions::default()).unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn flat_curve_has_no_resonance() {
        let freqs = arange(10.0, 20.0, 1.0);
        let z = ImpedanceCurve::new(freqs.clone(), vec![Complex64::new(1.0, 0.0); freqs.len()], None).unwrap();
        assert!(find_resonances(&z, 3, &PeakOptions::default()).unwrap().is_empty());
    }
}
