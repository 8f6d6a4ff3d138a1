//! Short-time power spectrum of a sound (Hann windowed STFT).

use serde::{Deserialize, Serialize};

use crate::domain::TimeSignal;
use crate::error::AppError;
use crate::math::{hann_window, power_spectrum};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramOptions {
    /// Analysis window (s).
    pub window_length: f64,
    /// Time between consecutive windows (s).
    pub time_step: f64,
    /// Highest frequency kept (Hz), clipped to Nyquist.
    pub max_frequency: f64,
    /// Range drawn below the loudest cell (dB).
    pub dynamic_range_db: f64,
}

impl Default for SpectrogramOptions {
    fn default() -> Self {
        Self {
            window_length: 0.03,
            time_step: 0.0075,
            max_frequency: 8000.0,
            dynamic_range_db: 100.0,
        }
    }
}

impl SpectrogramOptions {
    fn validate(&self) -> Result<(), AppError> {
        let positive = [self.window_length, self.time_step, self.max_frequency, self.dynamic_range_db];
        if positive.iter().all(|v| v.is_finite() && *v > 0.0) {
            Ok(())
        } else {
            Err(AppError::config(format!("Invalid spectrogram options: {self:?}.")))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    /// Window centres (s).
    pub times: Vec<f64>,
    /// Bin frequencies (Hz).
    pub freqs: Vec<f64>,
    /// `power[frame][bin]`
    pub power: Vec<Vec<f64>>,
}

impl Spectrogram {
    pub fn max_power(&self) -> f64 {
        self.power.iter().flatten().copied().fold(0.0, f64::max)
    }

    /// Cells in dB, floored at `max − dynamic_range_db`.
    pub fn power_db(&self, dynamic_range_db: f64) -> Vec<Vec<f64>> {
        let to_db = |p: f64| 10.0 * p.max(f64::MIN_POSITIVE).log10();
        let floor = to_db(self.max_power()) - dynamic_range_db;
        self.power
            .iter()
            .map(|frame| frame.iter().map(|&p| to_db(p).max(floor)).collect())
            .collect()
    }

    /// Bin with the most power in each frame.
    pub fn loudest_frequencies(&self) -> Vec<f64> {
        self.power
            .iter()
            .map(|frame| {
                let k = frame
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (k, &p)| if p > best.1 { (k, p) } else { best })
                    .0;
                self.freqs.get(k).copied().unwrap_or(0.0)
            })
            .collect()
    }
}

/// Power spectrum of every full window of a uniformly sampled signal.
pub fn spectrogram(signal: &TimeSignal, opts: &SpectrogramOptions) -> Result<Spectrogram, AppError> {
    opts.validate()?;
    let sr = signal.sample_rate()?;
    let x = signal.values();
    let win = (opts.window_length * sr).round() as usize;
    if win < 4 || win > x.len() {
        return Err(AppError::config(format!(
            "Spectrogram window of {win} samples does not fit a {}-sample signal.",
            x.len()
        )));
    }
    let hop = ((opts.time_step * sr).round() as usize).max(1);
    let n_fft = win.next_power_of_two();
    let n_bins = if opts.max_frequency >= 0.5 * sr {
        n_fft / 2 + 1
    } else {
        ((opts.max_frequency * n_fft as f64 / sr).floor() as usize + 1).min(n_fft / 2 + 1)
    };
    let freqs: Vec<f64> = (0..n_bins).map(|k| k as f64 * sr / n_fft as f64).collect();

    let window = hann_window(win);
    let t0 = signal.time()[0];
    let mut times = Vec::new();
    let mut power = Vec::new();
    let mut frame = vec![0.0; win];
    let mut start = 0;
    while start + win <= x.len() {
        for ((f, &v), &w) in frame.iter_mut().zip(&x[start..start + win]).zip(&window) {
            *f = v * w;
        }
        let mut ps = power_spectrum(&frame, n_fft);
        ps.truncate(n_bins);
        power.push(ps);
        times.push(t0 + (start as f64 + 0.5 * win as f64) / sr);
        start += hop;
    }
    Ok(Spectrogram { times, freqs, power })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Quantity;

    fn tone(freq: f64, sr: f64, seconds: f64) -> TimeSignal {
        let n = (seconds * sr) as usize;
        let values = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sr).sin())
            .collect();
        TimeSignal::uniform(0.0, sr, values, Quantity::Audio).unwrap()
    }

    #[test]
    fn tone_shows_up_in_every_frame() {
        let sr = 22_050.0;
        let sg = spectrogram(&tone(1000.0, sr, 0.2), &SpectrogramOptions::default()).unwrap();
        // ~662-sample windows every 165 samples over 4410 samples.
        assert_eq!(sg.times.len(), 23);
        assert!(sg.times.windows(2).all(|w| w[1] > w[0]));
        let bin = sr / 1024.0;
        for f in sg.loudest_frequencies() {
            assert!((f - 1000.0).abs() <= bin, "{f}");
        }
    }

    #[test]
    fn frequencies_stop_at_the_limit_or_nyquist() {
        let sr = 8000.0;
        let sg = spectrogram(&tone(440.0, sr, 0.1), &SpectrogramOptions::default()).unwrap();
        assert_eq!(sg.freqs.len(), 129);
        assert!((sg.freqs.last().unwrap() - 4000.0).abs() < 1e-6);

        let low = SpectrogramOptions {
            max_frequency: 1000.0,
            ..SpectrogramOptions::default()
        };
        let sg = spectrogram(&tone(440.0, sr, 0.1), &low).unwrap();
        assert!(*sg.freqs.last().unwrap() <= 1000.0 + 1e-6);
        assert!(sg.freqs.len() < 129);
        assert!(sg.power.iter().all(|frame| frame.len() == sg.freqs.len()));
    }

    #[test]
    fn silence_is_floored_at_the_dynamic_range() {
        let silent = TimeSignal::uniform(0.0, 8000.0, vec![0.0; 800], Quantity::Audio).unwrap();
        let sg = spectrogram(&silent, &SpectrogramOptions::default()).unwrap();
        assert_eq!(sg.max_power(), 0.0);
        let db = sg.power_db(60.0);
        assert!(db.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn window_longer_than_the_signal_is_rejected() {
        let short = TimeSignal::uniform(0.0, 8000.0, vec![0.0; 100], Quantity::Audio).unwrap();
        let err = spectrogram(&short, &SpectrogramOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
