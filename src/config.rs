//! Study configuration (TOML).
//!
//! Every field has a default reproducing the trumpet study, so an empty file
//! (or no file at all) runs the study as published. Command-line flags override
//! individual values after loading.
//!
//! ```toml
//! temperature = 20.0
//!
//! [solver]
//! losses = "boundary-layer"
//!
//! [adjust]
//! max_iter = 50
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::acoustics::{LipModel, LossModel, PeakOptions, Radiation, TemporalOptions, TransferMatrixSolver};
use crate::audio::{PitchOptions, SpectrogramOptions};
use crate::error::{AppError, EXIT_OUTPUT};
use crate::fit::DEFAULT_OFFSETS;
use crate::geometry::ProtoDesign;
use crate::io::WriteOptions;
use crate::math::{LmOptions, arange, linspace};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Longest cylindrical slice of the transfer-matrix discretization (m).
    #[serde(default = "SolverConfig::default_max_slice_length")]
    pub max_slice_length: f64,
    #[serde(default = "SolverConfig::default_losses")]
    pub losses: LossModel,
    #[serde(default = "SolverConfig::default_radiation")]
    pub radiation: Radiation,
}

impl SolverConfig {
    fn default_max_slice_length() -> f64 {
        crate::acoustics::DEFAULT_MAX_SLICE_LENGTH
    }
    fn default_losses() -> LossModel {
        LossModel::BoundaryLayer
    }
    fn default_radiation() -> Radiation {
        Radiation::Unflanged
    }

    pub fn solver(&self) -> TransferMatrixSolver {
        TransferMatrixSolver::new(self.max_slice_length)
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_slice_length: Self::default_max_slice_length(),
            losses: Self::default_losses(),
            radiation: Self::default_radiation(),
        }
    }
}

/// Evenly spaced frequency grid, both ends included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyGrid {
    #[serde(default = "FrequencyGrid::default_fmin")]
    pub fmin: f64,
    #[serde(default = "FrequencyGrid::default_fmax")]
    pub fmax: f64,
    #[serde(default = "FrequencyGrid::default_step")]
    pub step: f64,
}

impl FrequencyGrid {
    fn default_fmin() -> f64 {
        30.0
    }
    fn default_fmax() -> f64 {
        3000.0
    }
    fn default_step() -> f64 {
        1.0
    }

    pub fn values(&self) -> Result<Vec<f64>, AppError> {
        if !(self.fmin > 0.0 && self.fmax > self.fmin && self.step > 0.0) {
            return Err(AppError::config(format!(
                "Invalid frequency grid: fmin = {}, fmax = {}, step = {}.",
                self.fmin, self.fmax, self.step
            )));
        }
        Ok(arange(self.fmin, self.fmax, self.step))
    }
}

impl Default for FrequencyGrid {
    fn default() -> Self {
        Self {
            fmin: Self::default_fmin(),
            fmax: Self::default_fmax(),
            step: Self::default_step(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeaksConfig {
    /// Number of resonances extracted.
    #[serde(default = "PeaksConfig::default_count")]
    pub count: usize,
    #[serde(default = "PeaksConfig::default_fmin")]
    pub fmin: f64,
    #[serde(default = "PeaksConfig::default_min_prominence_db")]
    pub min_prominence_db: f64,
}

impl PeaksConfig {
    fn default_count() -> usize {
        10
    }
    fn default_fmin() -> f64 {
        30.0
    }
    fn default_min_prominence_db() -> f64 {
        1.0
    }

    pub fn options(&self) -> PeakOptions {
        PeakOptions {
            fmin: self.fmin,
            min_prominence_db: self.min_prominence_db,
        }
    }
}

impl Default for PeaksConfig {
    fn default() -> Self {
        Self {
            count: Self::default_count(),
            fmin: Self::default_fmin(),
            min_prominence_db: Self::default_min_prominence_db(),
        }
    }
}

/// The simplified design fitted to the reference bore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignConfig {
    #[serde(default = "DesignConfig::default_proto")]
    pub proto: ProtoDesign,
    /// Take the span and the bell radius of the design from the reference bore.
    #[serde(default = "DesignConfig::default_span_from_reference")]
    pub span_from_reference: bool,
}

impl DesignConfig {
    /// Mouthpiece splines, leadpipe, tuning slide cones and a two-part Bessel bell.
    fn default_proto() -> ProtoDesign {
        ProtoDesign {
            x_start: 0.0,
            x_end: 2.2,
            boundaries: vec![7.7e-3, 10.6e-3, 87.5e-3, 1.4, 1.7, 2.04],
            subsegments: vec![1, 1, 1, 4, 1, 1, 1],
            shapes: ["spline5", "cone", "spline5", "cone", "spline", "bessel", "bessel"]
                .into_iter()
                .map(String::from)
                .collect(),
            r_start: Some(9.5e-3),
            r_end: None,
            free_positions: true,
            pin_boundaries: false,
        }
    }
    fn default_span_from_reference() -> bool {
        true
    }
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            proto: Self::default_proto(),
            span_from_reference: Self::default_span_from_reference(),
        }
    }
}

/// Targets added above the resonances: `count` frequencies from `from` to `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub from: f64,
    pub to: f64,
    pub count: usize,
}

impl Band {
    pub fn values(&self) -> Vec<f64> {
        linspace(self.from, self.to, self.count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustConfig {
    /// Points of the reference radius sampled for the geometric fit.
    #[serde(default = "AdjustConfig::default_n_samples")]
    pub n_samples: usize,
    #[serde(default = "AdjustConfig::default_max_iter")]
    pub max_iter: usize,
    #[serde(default = "AdjustConfig::default_min_part_length")]
    pub min_part_length: f64,
    /// Node positions up to here stay fixed during the acoustic fit (m).
    #[serde(default = "AdjustConfig::default_mouthpiece_length")]
    pub mouthpiece_length: f64,
    /// Relative offsets around each resonance used as acoustic targets.
    #[serde(default = "AdjustConfig::default_offsets")]
    pub offsets: Vec<f64>,
    #[serde(default = "AdjustConfig::default_extra_band")]
    pub extra_band: Band,
    /// Significant digits of the geometry written after the geometric fit.
    #[serde(default = "AdjustConfig::default_geometry_digits")]
    pub geometry_digits: usize,
    /// Significant digits of the geometry written after the acoustic fit.
    #[serde(default = "AdjustConfig::default_acoustic_digits")]
    pub acoustic_digits: usize,
    /// Log every optimizer iteration at `info`.
    #[serde(default)]
    pub verbose: bool,
}

impl AdjustConfig {
    fn default_n_samples() -> usize {
        crate::fit::DEFAULT_SAMPLES
    }
    fn default_max_iter() -> usize {
        100
    }
    fn default_min_part_length() -> f64 {
        crate::fit::DEFAULT_MIN_PART_LENGTH
    }
    fn default_mouthpiece_length() -> f64 {
        87.5e-3
    }
    fn default_offsets() -> Vec<f64> {
        DEFAULT_OFFSETS.to_vec()
    }
    fn default_extra_band() -> Band {
        Band {
            from: 1000.0,
            to: 3000.0,
            count: 10,
        }
    }
    fn default_geometry_digits() -> usize {
        6
    }
    fn default_acoustic_digits() -> usize {
        4
    }

    pub fn lm_options(&self) -> LmOptions {
        LmOptions {
            max_iter: self.max_iter,
            verbose: self.verbose,
            ..LmOptions::default()
        }
    }

    pub fn geometry_write_options(&self) -> WriteOptions {
        WriteOptions {
            digits: self.geometry_digits,
            display_optim: true,
        }
    }

    pub fn acoustic_write_options(&self) -> WriteOptions {
        WriteOptions {
            digits: self.acoustic_digits,
            display_optim: false,
        }
    }
}

impl Default for AdjustConfig {
    fn default() -> Self {
        Self {
            n_samples: Self::default_n_samples(),
            max_iter: Self::default_max_iter(),
            min_part_length: Self::default_min_part_length(),
            mouthpiece_length: Self::default_mouthpiece_length(),
            offsets: Self::default_offsets(),
            extra_band: Self::default_extra_band(),
            geometry_digits: Self::default_geometry_digits(),
            acoustic_digits: Self::default_acoustic_digits(),
            verbose: false,
        }
    }
}

/// Sound synthesis runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthConfig {
    #[serde(default = "SynthConfig::default_temperature")]
    pub temperature: f64,
    #[serde(default = "SynthConfig::default_losses")]
    pub losses: LossModel,
    /// s
    #[serde(default = "SynthConfig::default_duration")]
    pub duration: f64,
    /// Time the mouth pressure is held (s); the whole duration when absent.
    #[serde(default)]
    pub gate: Option<f64>,
    /// Lip resonance frequencies played, one sound each (Hz).
    #[serde(default = "SynthConfig::default_lip_frequencies")]
    pub lip_frequencies: Vec<f64>,
    /// Write the time derivative of the bell flow, closer to the radiated pressure.
    #[serde(default = "SynthConfig::default_differentiate")]
    pub differentiate: bool,
}

impl SynthConfig {
    fn default_temperature() -> f64 {
        25.0
    }
    fn default_losses() -> LossModel {
        LossModel::BoundaryLayer
    }
    fn default_duration() -> f64 {
        1.45
    }
    fn default_lip_frequencies() -> Vec<f64> {
        vec![
            60.0, 150.0, 230.0, 300.0, 350.0, 420.0, 500.0, 580.0, 660.0, 740.0, 840.0, 920.0, 980.0, 1060.0, 1160.0,
        ]
    }
    fn default_differentiate() -> bool {
        true
    }

    pub fn gate(&self) -> f64 {
        self.gate.unwrap_or(self.duration)
    }
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            temperature: Self::default_temperature(),
            losses: Self::default_losses(),
            duration: Self::default_duration(),
            gate: None,
            lip_frequencies: Self::default_lip_frequencies(),
            differentiate: Self::default_differentiate(),
        }
    }
}

/// Played pitch against lip frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchConfig {
    #[serde(default = "PitchConfig::default_temperature")]
    pub temperature: f64,
    #[serde(default = "PitchConfig::default_losses")]
    pub losses: LossModel,
    #[serde(default = "PitchConfig::default_duration")]
    pub duration: f64,
    /// Mouth pressure gate (s).
    #[serde(default = "PitchConfig::default_gate")]
    pub gate: f64,
    #[serde(default = "PitchConfig::default_lip_frequencies")]
    pub lip_frequencies: Vec<f64>,
    /// Grid on which the resonances drawn with the pitch are searched.
    #[serde(default = "PitchConfig::default_resonance_grid")]
    pub resonance_grid: FrequencyGrid,
    #[serde(default = "PitchConfig::default_resonance_count")]
    pub resonance_count: usize,
    /// Analysis window inside each sound (s).
    #[serde(default = "PitchConfig::default_window_from")]
    pub window_from: f64,
    #[serde(default = "PitchConfig::default_window_to")]
    pub window_to: f64,
    #[serde(default)]
    pub tracker: PitchOptions,
    /// Spectrogram drawn for the last lip frequency.
    #[serde(default)]
    pub spectrogram: SpectrogramOptions,
}

impl PitchConfig {
    fn default_temperature() -> f64 {
        25.0
    }
    fn default_losses() -> LossModel {
        LossModel::Lossless
    }
    fn default_duration() -> f64 {
        0.5
    }
    fn default_gate() -> f64 {
        1.0
    }
    fn default_lip_frequencies() -> Vec<f64> {
        vec![300.0]
    }
    fn default_resonance_grid() -> FrequencyGrid {
        FrequencyGrid {
            fmin: 20.0,
            fmax: 2000.0,
            step: 1.0,
        }
    }
    fn default_resonance_count() -> usize {
        30
    }
    fn default_window_from() -> f64 {
        0.35
    }
    fn default_window_to() -> f64 {
        0.5
    }
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            temperature: Self::default_temperature(),
            losses: Self::default_losses(),
            duration: Self::default_duration(),
            gate: Self::default_gate(),
            lip_frequencies: Self::default_lip_frequencies(),
            resonance_grid: Self::default_resonance_grid(),
            resonance_count: Self::default_resonance_count(),
            window_from: Self::default_window_from(),
            window_to: Self::default_window_to(),
            tracker: PitchOptions::default(),
            spectrogram: SpectrogramOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "OutputConfig::default_dir")]
    pub dir: PathBuf,
    /// Cached impedances and sounds; `<dir>/cache` when absent.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Write SVG figures.
    #[serde(default = "OutputConfig::default_figures")]
    pub figures: bool,
}

impl OutputConfig {
    fn default_dir() -> PathBuf {
        PathBuf::from("results")
    }
    fn default_figures() -> bool {
        true
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| self.dir.join("cache"))
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            cache_dir: None,
            figures: Self::default_figures(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyConfig {
    /// Air temperature of impedance computations (°C).
    #[serde(default = "StudyConfig::default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub frequencies: FrequencyGrid,
    #[serde(default)]
    pub peaks: PeaksConfig,
    #[serde(default)]
    pub design: DesignConfig,
    #[serde(default)]
    pub adjust: AdjustConfig,
    #[serde(default)]
    pub temporal: TemporalOptions,
    #[serde(default)]
    pub player: LipModel,
    #[serde(default)]
    pub synth: SynthConfig,
    #[serde(default)]
    pub pitch: PitchConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl StudyConfig {
    fn default_temperature() -> f64 {
        20.0
    }

    /// Defaults when `path` is `None`; a given file must exist and parse.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).map_err(|e| AppError::read(path, e))?;
        let cfg = Self::from_toml(&text).map_err(|e| AppError::config(format!("{}: {}", path.display(), e.message())))?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(cfg)
    }

    pub fn from_toml(text: &str) -> Result<Self, AppError> {
        toml::from_str(text).map_err(|e| AppError::config(format!("Invalid configuration: {e}")))
    }

    pub fn to_toml(&self) -> Result<String, AppError> {
        toml::to_string_pretty(self).map_err(|e| AppError::new(EXIT_OUTPUT, format!("Cannot serialize configuration: {e}")))
    }
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            temperature: Self::default_temperature(),
            solver: SolverConfig::default(),
            frequencies: FrequencyGrid::default(),
            peaks: PeaksConfig::default(),
            design: DesignConfig::default(),
            adjust: AdjustConfig::default(),
            temporal: TemporalOptions::default(),
            player: LipModel::default(),
            synth: SynthConfig::default(),
            pitch: PitchConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_gives_the_study_defaults() {
        let cfg = StudyConfig::load(None).unwrap();
        assert_eq!(cfg, StudyConfig::default());
        assert_eq!(cfg.temperature, 20.0);
        assert_eq!(cfg.peaks.count, 10);
        assert_eq!(cfg.synth.lip_frequencies.len(), 15);
        assert_eq!(cfg.synth.gate(), 1.45);
        assert_eq!(cfg.pitch.losses, LossModel::Lossless);
        assert_eq!(cfg.design.proto.subsegments.iter().sum::<usize>(), 10);
        assert_eq!(cfg.output.cache_dir(), PathBuf::from("results").join("cache"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg = StudyConfig::from_toml(
            r#"
temperature = 25.0

[solver]
losses = "diffrepr"
radiation = "ideal-open"

[adjust]
max_iter = 7
extra_band = { from = 500.0, to = 600.0, count = 3 }

[player]
zeta = 0.2
"#,
        )
        .unwrap();
        assert_eq!(cfg.temperature, 25.0);
        assert_eq!(cfg.solver.losses, LossModel::BoundaryLayer);
        assert_eq!(cfg.solver.radiation, Radiation::IdealOpen);
        assert_eq!(cfg.solver.max_slice_length, crate::acoustics::DEFAULT_MAX_SLICE_LENGTH);
        assert_eq!(cfg.adjust.max_iter, 7);
        assert_eq!(cfg.adjust.lm_options().max_iter, 7);
        assert_eq!(cfg.adjust.extra_band.values(), vec![500.0, 550.0, 600.0]);
        assert_eq!(cfg.adjust.offsets, DEFAULT_OFFSETS.to_vec());
        assert_eq!(cfg.player.zeta, 0.2);
        assert_eq!(cfg.player.quality, LipModel::default().quality);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("study.toml");
        let mut cfg = StudyConfig::default();
        cfg.pitch.lip_frequencies = vec![100.0, 200.0];
        cfg.output.figures = false;
        fs::write(&path, cfg.to_toml().unwrap()).unwrap();

        assert_eq!(StudyConfig::load(Some(&path)).unwrap(), cfg);
    }

    #[test]
    fn bad_files_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert_eq!(StudyConfig::load(Some(&missing)).unwrap_err().exit_code(), 2);

        let err = StudyConfig::from_toml("[solver]\nlosses = \"plasma\"\n").unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let grid = FrequencyGrid {
            fmin: 100.0,
            fmax: 50.0,
            step: 1.0,
        };
        assert!(grid.values().is_err());
    }

    #[test]
    fn default_grid_matches_the_measurement_band() {
        let f = FrequencyGrid::default().values().unwrap();
        assert_eq!(f.len(), 2971);
        assert_eq!(f[0], 30.0);
        assert_eq!(*f.last().unwrap(), 3000.0);
    }
}
