//! Comparison of resonances and the JSON run report.
//!
//! Resonances are aligned by index: the n-th simulated peak is compared with
//! the n-th reference peak. When the counts differ only the common prefix is
//! compared and the leftovers on each side are reported.

pub mod format;

use std::fs;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::ResonancePeak;
use crate::error::{AppError, EXIT_OUTPUT};
use crate::fit::{AdjustReport, GeometricDeviation};

pub use format::*;

pub fn amplitude_deviation_db(amplitude: f64, reference: f64) -> f64 {
    20.0 * (amplitude / reference).log10()
}

pub fn pitch_deviation_cents(frequency: f64, reference: f64) -> f64 {
    1200.0 * (frequency / reference).log2()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakDeviation {
    /// Rank of the peak, from 0.
    pub index: usize,
    pub reference: ResonancePeak,
    pub candidate: ResonancePeak,
    pub cents: f64,
    pub db: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResonanceComparison {
    pub deviations: Vec<PeakDeviation>,
    pub unmatched_reference: usize,
    pub unmatched_candidate: usize,
}

impl ResonanceComparison {
    pub fn max_abs_cents(&self) -> f64 {
        self.deviations.iter().map(|d| d.cents.abs()).fold(0.0, f64::max)
    }

    pub fn max_abs_db(&self) -> f64 {
        self.deviations.iter().map(|d| d.db.abs()).fold(0.0, f64::max)
    }

    pub fn rms_cents(&self) -> f64 {
        if self.deviations.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.deviations.iter().map(|d| d.cents * d.cents).sum();
        (sum / self.deviations.len() as f64).sqrt()
    }
}

pub fn compare_resonances(reference: &[ResonancePeak], candidate: &[ResonancePeak]) -> ResonanceComparison {
    let deviations: Vec<PeakDeviation> = reference
        .iter()
        .zip(candidate)
        .enumerate()
        .map(|(index, (r, c))| PeakDeviation {
            index,
            reference: *r,
            candidate: *c,
            cents: pitch_deviation_cents(c.frequency, r.frequency),
            db: amplitude_deviation_db(c.amplitude, r.amplitude),
        })
        .collect();
    let common = deviations.len();
    let cmp = ResonanceComparison {
        deviations,
        unmatched_reference: reference.len() - common,
        unmatched_candidate: candidate.len() - common,
    };
    if cmp.unmatched_reference > 0 || cmp.unmatched_candidate > 0 {
        warn!(
            reference = reference.len(),
            candidate = candidate.len(),
            compared = common,
            "resonance counts differ, comparing the common prefix"
        );
    }
    cmp
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub name: String,
    pub report: AdjustReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabeledComparison {
    pub label: String,
    pub comparison: ResonanceComparison,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PitchPoint {
    pub lip_frequency: f64,
    pub pitch: Option<f64>,
}

/// Everything a run produced, written as `report.json`.
#[derive(Debug, Clone, Serialize)]
pub struct StudyReport {
    pub generated_at: String,
    pub command: String,
    pub stages: Vec<StageReport>,
    pub geometric_deviation: Option<GeometricDeviation>,
    pub comparisons: Vec<LabeledComparison>,
    pub pitch: Vec<PitchPoint>,
    pub outputs: Vec<String>,
}

impl StudyReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            command: command.into(),
            stages: Vec::new(),
            geometric_deviation: None,
            comparisons: Vec::new(),
            pitch: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn add_output(&mut self, path: &Path) {
        self.outputs.push(path.display().to_string());
    }

    pub fn write_json(&self, path: &Path) -> Result<(), AppError> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::new(EXIT_OUTPUT, format!("Failed to serialize report: {e}")))?;
        fs::write(path, text).map_err(|e| AppError::write(path, e))?;
        debug!(path = %path.display(), "report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(frequency: f64, amplitude: f64) -> ResonancePeak {
        ResonancePeak {
            frequency,
            amplitude,
            quality: 20.0,
        }
    }

    #[test]
    fn deviation_units() {
        assert!((pitch_deviation_cents(880.0, 440.0) - 1200.0).abs() < 1e-9);
        assert!((pitch_deviation_cents(440.0 * 2f64.powf(1.0 / 12.0), 440.0) - 100.0).abs() < 1e-9);
        assert!((amplitude_deviation_db(20.0, 2.0) - 20.0).abs() < 1e-12);
        assert_eq!(amplitude_deviation_db(3.0, 3.0), 0.0);
    }

    #[test]
    fn compares_the_common_prefix_by_index() {
        let reference = [peak(100.0, 10.0), peak(200.0, 20.0), peak(300.0, 30.0)];
        let candidate = [peak(100.0, 10.0), peak(400.0, 2.0)];
        let cmp = compare_resonances(&reference, &candidate);
        assert_eq!(cmp.deviations.len(), 2);
        assert_eq!(cmp.unmatched_reference, 1);
        assert_eq!(cmp.unmatched_candidate, 0);
        assert_eq!(cmp.deviations[0].cents, 0.0);
        assert!((cmp.deviations[1].cents - 1200.0).abs() < 1e-9);
        assert!((cmp.deviations[1].db + 20.0).abs() < 1e-9);
        assert!((cmp.max_abs_cents() - 1200.0).abs() < 1e-9);
        assert!((cmp.rms_cents() - 1200.0 / 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn report_is_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let mut report = StudyReport::new("compare");
        report.comparisons.push(LabeledComparison {
            label: "sim".into(),
            comparison: compare_resonances(&[peak(100.0, 1.0)], &[peak(101.0, 1.0)]),
        });
        report.write_json(&path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["command"], "compare");
        assert_eq!(value["comparisons"][0]["comparison"]["deviations"][0]["index"], 0);
    }
}
