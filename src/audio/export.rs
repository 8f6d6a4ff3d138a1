//! Mono 16-bit WAV files.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::debug;

use crate::domain::{Quantity, TimeSignal};
use crate::error::AppError;

/// Write `signal` as a peak-normalized 16-bit mono WAV.
///
/// With `differentiate`, `diff(values)/diff(time)` is written instead (the
/// radiated pressure is proportional to the derivative of the bell flow). The
/// sample rate comes from the signal's uniform time step.
pub fn export_mono(path: &Path, signal: &TimeSignal, differentiate: bool) -> Result<(), AppError> {
    let signal = if differentiate { signal.derivative()? } else { signal.clone() };
    let sample_rate = signal.sample_rate()?.round();
    if !(sample_rate >= 1.0 && sample_rate <= u32::MAX as f64) {
        return Err(AppError::config(format!("Unsupported sample rate {sample_rate} Hz.")));
    }

    let peak = signal.values().iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if !peak.is_finite() {
        return Err(AppError::numeric("Cannot export a signal with non-finite samples."));
    }
    let gain = if peak > 0.0 { 1.0 / peak } else { 0.0 };

    let spec = WavSpec {
        channels: 1,
        sample_rate: sample_rate as u32,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).map_err(|e| AppError::write(path, e))?;
    for v in signal.values() {
        let s = ((v * gain).clamp(-1.0, 1.0) * i16::MAX as f64) as i16;
        writer.write_sample(s).map_err(|e| AppError::write(path, e))?;
    }
    writer.finalize().map_err(|e| AppError::write(path, e))?;
    debug!(path = %path.display(), samples = signal.len(), peak, "wav written");
    Ok(())
}

/// Read a mono WAV file, samples scaled to [-1, 1].
pub fn read_mono(path: &Path) -> Result<TimeSignal, AppError> {
    let mut reader = WavReader::open(path).map_err(|e| AppError::read(path, e))?;
    let spec = reader.spec();
    if spec.channels != 1 {
        return Err(AppError::config(format!(
            "{}: expected a mono file, found {} channels.",
            path.display(),
            spec.channels
        )));
    }

    let values: Vec<f64> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<Result<_, _>>()
            .map_err(|e| AppError::read(path, e))?,
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f64;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f64 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| AppError::read(path, e))?
        }
    };
    TimeSignal::uniform(0.0, spec.sample_rate as f64, values, Quantity::Audio)
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::*;

    fn sine(freq: f64, amplitude: f64, n: usize) -> TimeSignal {
        let values = (0..n).map(|i| amplitude * (2.0 * PI * freq * i as f64 / 8000.0).sin()).collect();
        TimeSignal::uniform(0.0, 8000.0, values, Quantity::Flow).unwrap()
    }

    #[test]
    fn written_sound_is_normalized_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        export_mono(&path, &sine(440.0, 1e-4, 800), false).unwrap();

        let back = read_mono(&path).unwrap();
        assert_eq!(back.len(), 800);
        assert!((back.sample_rate().unwrap() - 8000.0).abs() < 1e-6);
        let peak = back.values().iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        assert!((peak - 1.0).abs() < 1e-3);
        assert_eq!(back.quantity(), Quantity::Audio);
    }

    #[test]
    fn differentiated_export_drops_one_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diff.wav");
        export_mono(&path, &sine(100.0, 1.0, 400), true).unwrap();
        assert_eq!(read_mono(&path).unwrap().len(), 399);
    }

    #[test]
    fn silence_is_written_as_zeros() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        let s = TimeSignal::uniform(0.0, 8000.0, vec![0.0; 100], Quantity::Flow).unwrap();
        export_mono(&path, &s, false).unwrap();
        assert!(read_mono(&path).unwrap().values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = read_mono(Path::new("/nonexistent/dir/none.wav")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
