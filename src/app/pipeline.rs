//! The study workflows behind each subcommand.
//!
//! Every stage receives an explicit `StudyContext` (configuration, output
//! directory, cache, frequency solver) and returns what it computed; printing
//! is left to `app`. Files written by a stage are listed in its `StudyReport`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::acoustics::{
    InstrumentPhysics, LipModel, LossModel, PeakOptions, TemporalSolver, TransferMatrixSolver,
    find_resonances,
};
use crate::audio::{export_mono, mean_pitch, read_mono, spectrogram};
use crate::config::{DesignConfig, StudyConfig};
use crate::domain::{Channel, ImpedanceCurve, ParamKind, ResonancePeak};
use crate::error::AppError;
use crate::fit::{AcousticTargets, GeometryAdjuster, InverseAcousticOptimizer};
use crate::geometry::{BoreGeometry, ParamId, ProtoDesign};
use crate::io::{CacheKey, ImpedanceCache, read_geometry, read_impedance, write_geometry, write_impedance};
use crate::plot::{
    Series, plot_bore_profiles, plot_impedances, plot_pitch, plot_resonance_deviation, plot_spectrogram,
};
use crate::report::{LabeledComparison, PitchPoint, StageReport, StudyReport, compare_resonances};

/// Points drawn per bore profile.
const PROFILE_POINTS: usize = 2000;

#[derive(Debug, Clone)]
pub struct StudyContext {
    config: StudyConfig,
    cache: ImpedanceCache,
    solver: TransferMatrixSolver,
}

impl StudyContext {
    /// Create the output directory and the cache handle.
    pub fn new(config: StudyConfig) -> Result<Self, AppError> {
        let out = &config.output.dir;
        fs::create_dir_all(out).map_err(|e| AppError::write(out, e))?;
        let cache = ImpedanceCache::new(config.output.cache_dir());
        let solver = config.solver.solver();
        Ok(Self { config, cache, solver })
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    pub fn cache(&self) -> &ImpedanceCache {
        &self.cache
    }

    pub fn solver(&self) -> &TransferMatrixSolver {
        &self.solver
    }

    pub fn output_path(&self, name: &str) -> PathBuf {
        self.config.output.dir.join(name)
    }

    pub fn physics(&self, geometry: BoreGeometry, temperature: f64, losses: LossModel) -> InstrumentPhysics {
        InstrumentPhysics::new(geometry, temperature, losses, self.config.solver.radiation)
    }

    /// Physics of the frequency-domain commands: `temperature` and `[solver]`.
    pub fn frequency_physics(&self, geometry: BoreGeometry) -> InstrumentPhysics {
        self.physics(geometry, self.config.temperature, self.config.solver.losses)
    }

    pub fn impedance(&self, stem: &str, physics: &InstrumentPhysics, freqs: &[f64]) -> Result<ImpedanceCurve, AppError> {
        self.cache.get_or_compute(stem, physics, &self.solver, freqs)
    }

    fn figures(&self) -> bool {
        self.config.output.figures
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bore".to_string())
}

/// Measured curve restricted to the configured band.
fn load_measured(ctx: &StudyContext, path: &Path) -> Result<ImpedanceCurve, AppError> {
    let f = &ctx.config().frequencies;
    read_impedance(path)?.crop(f.fmin, f.fmax)
}

fn resonances(ctx: &StudyContext, curve: &ImpedanceCurve) -> Result<Vec<ResonancePeak>, AppError> {
    let peaks = &ctx.config().peaks;
    find_resonances(curve, peaks.count, &peaks.options())
}

#[derive(Debug, Clone)]
pub struct ImpedanceRun {
    pub curve: ImpedanceCurve,
    pub peaks: Vec<ResonancePeak>,
    pub report: StudyReport,
}

/// Impedance of a geometry on the configured grid, written as `<stem>_impedance.txt`.
pub fn run_impedance(ctx: &StudyContext, geometry: &Path, physical: bool) -> Result<ImpedanceRun, AppError> {
    let stem = file_stem(geometry);
    let physics = ctx.frequency_physics(read_geometry(geometry)?);
    let freqs = ctx.config().frequencies.values()?;
    let curve = ctx.impedance(&stem, &physics, &freqs)?;
    let peaks = resonances(ctx, &curve)?;

    let mut report = StudyReport::new("impedance");
    let path = ctx.output_path(&format!("{stem}_impedance.txt"));
    write_impedance(&path, &curve, !physical)?;
    report.add_output(&path);
    if ctx.figures() {
        let fig = ctx.output_path(&format!("{stem}_impedance.svg"));
        plot_impedances(&fig, &format!("Input impedance: {stem}"), &[(stem.as_str(), &curve)], None, None)?;
        report.add_output(&fig);
    }
    Ok(ImpedanceRun { curve, peaks, report })
}

pub fn run_peaks(ctx: &StudyContext, impedance: &Path) -> Result<Vec<ResonancePeak>, AppError> {
    resonances(ctx, &read_impedance(impedance)?)
}

#[derive(Debug, Clone)]
pub struct SimplifyRun {
    pub geometric: BoreGeometry,
    pub acoustic: Option<BoreGeometry>,
    pub measured_peaks: Vec<ResonancePeak>,
    pub report: StudyReport,
}

/// The design to fit, spanning the reference when configured so.
pub fn design_for(cfg: &DesignConfig, reference: &BoreGeometry) -> ProtoDesign {
    let mut design = cfg.proto.clone();
    if cfg.span_from_reference {
        design.x_start = reference.x_start();
        design.x_end = reference.x_end();
        design.r_end = Some(reference.bell_radius());
    }
    design
}

/// Parameter moving the bell end, which stays where the reference ends.
fn end_position(geometry: &BoreGeometry) -> Option<ParamId> {
    geometry.nodes().last().and_then(|n| n.x.param_id())
}

/// Geometric simplification of `reference`, then (with a measurement) the
/// acoustic adjustment of the node positions beyond the mouthpiece.
///
/// Writes `<name>_geometric.txt`, `<name>_acoustic.txt`, figures and
/// `<name>_report.json`.
pub fn run_simplify(
    ctx: &StudyContext,
    reference_path: &Path,
    measured_path: Option<&Path>,
    name: &str,
) -> Result<SimplifyRun, AppError> {
    let cfg = ctx.config();
    let reference = read_geometry(reference_path)?;
    let candidate = design_for(&cfg.design, &reference).build(Some(&reference))?;
    info!(
        segments = candidate.segment_count(),
        params = candidate.params().len(),
        length = reference.length(),
        "simplified design built"
    );
    let fixed_end = end_position(&candidate);
    let lm = cfg.adjust.lm_options();
    let mut report = StudyReport::new("simplify");

    let mut adjuster = GeometryAdjuster::new(candidate, &reference, cfg.adjust.n_samples)?
        .with_min_part_length(cfg.adjust.min_part_length);

    adjuster
        .candidate_mut()
        .params_mut()
        .activate_only(|_, p| p.kind != ParamKind::Position);
    report.stages.push(StageReport {
        name: "geometric: radii and shapes".into(),
        report: adjuster.optimize(&lm)?,
    });

    adjuster
        .candidate_mut()
        .params_mut()
        .activate_only(|id, _| Some(id) != fixed_end);
    report.stages.push(StageReport {
        name: "geometric: all but the bell end".into(),
        report: adjuster.optimize(&lm)?,
    });

    report.geometric_deviation = Some(adjuster.deviation()?);
    let geometric = adjuster.into_candidate();
    let path = ctx.output_path(&format!("{name}_geometric.txt"));
    write_geometry(&path, &geometric, &cfg.adjust.geometry_write_options())?;
    report.add_output(&path);

    let Some(measured_path) = measured_path else {
        if ctx.figures() {
            let fig = ctx.output_path(&format!("{name}_profiles.svg"));
            plot_profiles(&fig, &[("reference", &reference), ("geometric", &geometric)])?;
            report.add_output(&fig);
        }
        finish_report(ctx, &mut report, name)?;
        return Ok(SimplifyRun {
            geometric,
            acoustic: None,
            measured_peaks: Vec::new(),
            report,
        });
    };

    let measured = load_measured(ctx, measured_path)?;
    let measured_peaks = resonances(ctx, &measured)?;
    let targets = AcousticTargets::around_resonances(
        &measured,
        &measured_peaks,
        &cfg.adjust.offsets,
        &cfg.adjust.extra_band.values(),
    )?;

    let mut physics = ctx.frequency_physics(geometric.clone());
    let mouthpiece = cfg.adjust.mouthpiece_length;
    physics
        .geometry_mut()
        .params_mut()
        .activate_only(|id, p| p.kind == ParamKind::Position && p.value > mouthpiece && Some(id) != fixed_end);
    let mut optimizer = InverseAcousticOptimizer::new(physics, *ctx.solver(), targets)
        .with_min_part_length(cfg.adjust.min_part_length);
    report.stages.push(StageReport {
        name: "acoustic: positions beyond the mouthpiece".into(),
        report: optimizer.optimize(&lm)?,
    });
    let acoustic = optimizer.into_physics().into_geometry();
    let path = ctx.output_path(&format!("{name}_acoustic.txt"));
    write_geometry(&path, &acoustic, &cfg.adjust.acoustic_write_options())?;
    report.add_output(&path);

    let mut curves = Vec::with_capacity(2);
    for (label, geometry) in [("geometric", &geometric), ("acoustic", &acoustic)] {
        let physics = ctx.frequency_physics(geometry.clone());
        let curve = ctx.impedance(&format!("{name}_{label}"), &physics, measured.freqs())?;
        let peaks = resonances(ctx, &curve)?;
        report.comparisons.push(LabeledComparison {
            label: label.to_string(),
            comparison: compare_resonances(&measured_peaks, &peaks),
        });
        curves.push((label, curve));
    }

    if ctx.figures() {
        let fig = ctx.output_path(&format!("{name}_profiles.svg"));
        plot_profiles(
            &fig,
            &[("reference", &reference), ("geometric", &geometric), ("acoustic", &acoustic)],
        )?;
        report.add_output(&fig);

        let mut overlay: Vec<(&str, &ImpedanceCurve)> = vec![("measured", &measured)];
        overlay.extend(curves.iter().map(|(l, c)| (*l, c)));
        let fig = ctx.output_path(&format!("{name}_impedance.svg"));
        plot_impedances(&fig, "Input impedance", &overlay, None, None)?;
        report.add_output(&fig);

        let fig = ctx.output_path(&format!("{name}_resonances.svg"));
        plot_resonance_deviation(&fig, &report.comparisons)?;
        report.add_output(&fig);
    }

    finish_report(ctx, &mut report, name)?;
    Ok(SimplifyRun {
        geometric,
        acoustic: Some(acoustic),
        measured_peaks,
        report,
    })
}

fn plot_profiles(path: &Path, bores: &[(&str, &BoreGeometry)]) -> Result<(), AppError> {
    let series = bores
        .iter()
        .map(|(label, g)| {
            let (xs, rs) = g.sample(PROFILE_POINTS)?;
            Ok(Series::new(*label, xs.into_iter().zip(rs).collect()))
        })
        .collect::<Result<Vec<_>, AppError>>()?;
    plot_bore_profiles(path, "Bore profile", &series)
}

fn finish_report(ctx: &StudyContext, report: &mut StudyReport, name: &str) -> Result<(), AppError> {
    let path = ctx.output_path(&format!("{name}_report.json"));
    report.add_output(&path);
    report.write_json(&path)
}

#[derive(Debug, Clone)]
pub struct CompareRun {
    pub measured_peaks: Vec<ResonancePeak>,
    /// Resonances of each geometry, labelled by file stem.
    pub simulated: Vec<(String, Vec<ResonancePeak>)>,
    pub report: StudyReport,
}

/// Simulate every geometry on the measured grid and compare the resonances.
pub fn run_compare(
    ctx: &StudyContext,
    measured_path: &Path,
    geometries: &[PathBuf],
    name: &str,
    xlim: Option<(f64, f64)>,
) -> Result<CompareRun, AppError> {
    let measured = load_measured(ctx, measured_path)?;
    let measured_peaks = resonances(ctx, &measured)?;
    let mut report = StudyReport::new("compare");
    let mut simulated = Vec::with_capacity(geometries.len());
    let mut curves = Vec::with_capacity(geometries.len());

    for path in geometries {
        let stem = file_stem(path);
        let physics = ctx.frequency_physics(read_geometry(path)?);
        let curve = ctx.impedance(&stem, &physics, measured.freqs())?;
        let peaks = resonances(ctx, &curve)?;
        report.comparisons.push(LabeledComparison {
            label: stem.clone(),
            comparison: compare_resonances(&measured_peaks, &peaks),
        });
        simulated.push((stem.clone(), peaks));
        curves.push((stem, curve));
    }

    if ctx.figures() {
        let mut overlay: Vec<(&str, &ImpedanceCurve)> = vec![("measured", &measured)];
        overlay.extend(curves.iter().map(|(l, c)| (l.as_str(), c)));
        let fig = ctx.output_path(&format!("{name}_impedance.svg"));
        plot_impedances(&fig, "Input impedance", &overlay, xlim, None)?;
        report.add_output(&fig);

        let fig = ctx.output_path(&format!("{name}_resonances.svg"));
        plot_resonance_deviation(&fig, &report.comparisons)?;
        report.add_output(&fig);
    }

    finish_report(ctx, &mut report, name)?;
    Ok(CompareRun {
        measured_peaks,
        simulated,
        report,
    })
}

/// Sound of `player` on `physics`, from the cache or simulated and cached.
fn cached_sound(
    ctx: &StudyContext,
    stem: &str,
    physics: &InstrumentPhysics,
    temporal: &TemporalSolver,
    player: &LipModel,
    duration: f64,
    differentiate: bool,
) -> Result<PathBuf, AppError> {
    let key = CacheKey::for_sound(physics, ctx.solver(), player, &ctx.config().temporal, duration)?;
    let kind = if differentiate { "dflow" } else { "flow" };
    let path = ctx.cache().sound_path(&format!("{stem}_{kind}"), &key);
    if path.is_file() {
        info!(path = %path.display(), lip_frequency = player.lip_frequency(), "sound cache hit");
        return Ok(path);
    }
    info!(lip_frequency = player.lip_frequency(), duration, "simulating sound");
    let recording = temporal.run_simulation(player, duration)?;
    ctx.cache().ensure_dir()?;
    export_mono(&path, &recording.signal(Channel::BellFlow)?, differentiate)?;
    Ok(path)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoundFile {
    pub lip_frequency: f64,
    pub path: PathBuf,
}

/// One WAV per configured lip frequency: `<stem>_<losses>_flips_<f>Hz.wav`.
pub fn run_synth(ctx: &StudyContext, geometry: &Path) -> Result<Vec<SoundFile>, AppError> {
    let cfg = ctx.config();
    let synth = &cfg.synth;
    let stem = file_stem(geometry);
    let physics = ctx.physics(read_geometry(geometry)?, synth.temperature, synth.losses);
    let temporal = TemporalSolver::new(&physics, ctx.solver(), cfg.temporal.clone())?;
    let mut player = cfg.player.clone();
    player.gamma.gate = synth.gate();

    let mut sounds = Vec::with_capacity(synth.lip_frequencies.len());
    let mut report = StudyReport::new("synth");
    for &f in &synth.lip_frequencies {
        player.set_lip_frequency(f);
        let cached = cached_sound(ctx, &stem, &physics, &temporal, &player, synth.duration, synth.differentiate)?;
        let path = ctx.output_path(&format!("{stem}_{}_flips_{f:.0}Hz.wav", physics.losses().keyword()));
        fs::copy(&cached, &path).map_err(|e| AppError::write(&path, e))?;
        report.add_output(&path);
        sounds.push(SoundFile { lip_frequency: f, path });
    }
    finish_report(ctx, &mut report, &format!("{stem}_synth"))?;
    Ok(sounds)
}

#[derive(Debug, Clone)]
pub struct PitchRun {
    pub resonances: Vec<ResonancePeak>,
    pub points: Vec<PitchPoint>,
    pub report: StudyReport,
}

/// Played pitch for each configured lip frequency, next to the resonances.
///
/// The analyzed signal is the cached sound: the time derivative of the bell
/// flow when `synth.differentiate` is set (the default), the bell flow
/// itself otherwise. Differentiation does not move the fundamental. The
/// spectrogram figure shows the sound of the last lip frequency.
pub fn run_pitch(ctx: &StudyContext, geometry: &Path) -> Result<PitchRun, AppError> {
    let cfg = ctx.config();
    let pc = &cfg.pitch;
    let stem = file_stem(geometry);
    let physics = ctx.physics(read_geometry(geometry)?, pc.temperature, pc.losses);

    let curve = ctx.impedance(&stem, &physics, &pc.resonance_grid.values()?)?;
    let peak_opts = PeakOptions {
        fmin: pc.resonance_grid.fmin,
        ..cfg.peaks.options()
    };
    let resonances = find_resonances(&curve, pc.resonance_count, &peak_opts)?;

    let temporal = TemporalSolver::new(&physics, ctx.solver(), cfg.temporal.clone())?;
    let mut player = cfg.player.clone();
    player.gamma.gate = pc.gate;

    let mut points = Vec::with_capacity(pc.lip_frequencies.len());
    let mut last_sound = None;
    for &f in &pc.lip_frequencies {
        player.set_lip_frequency(f);
        let path = cached_sound(ctx, &stem, &physics, &temporal, &player, pc.duration, cfg.synth.differentiate)?;
        let sound = read_mono(&path)?;
        let pitch = mean_pitch(&sound, pc.window_from, pc.window_to, &pc.tracker)?;
        if pitch.is_none() {
            warn!(lip_frequency = f, "no voiced frame, the lips did not self-oscillate");
        }
        points.push(PitchPoint { lip_frequency: f, pitch });
        last_sound = Some((f, sound));
    }

    let mut report = StudyReport::new("pitch");
    report.pitch = points.clone();
    if ctx.figures() {
        let fig = ctx.output_path(&format!("{stem}_pitch.svg"));
        let freqs: Vec<f64> = resonances.iter().map(|p| p.frequency).collect();
        plot_pitch(&fig, &points, &freqs)?;
        report.add_output(&fig);

        if let Some((f, sound)) = &last_sound {
            let sg = spectrogram(sound, &pc.spectrogram)?;
            let fig = ctx.output_path(&format!("{stem}_spectrogram_{f:.0}Hz.svg"));
            plot_spectrogram(&fig, &format!("Lip frequency {f:.0} Hz"), &sg, pc.spectrogram.dynamic_range_db)?;
            report.add_output(&fig);
        }
    }
    finish_report(ctx, &mut report, &format!("{stem}_pitch"))?;
    Ok(PitchRun {
        resonances,
        points,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acoustics::TemporalOptions;
    use crate::config::FrequencyGrid;
    use crate::io::WriteOptions;

    fn context(dir: &Path) -> StudyContext {
        let mut cfg = StudyConfig::default();
        cfg.output.dir = dir.join("out");
        cfg.solver.max_slice_length = 1e-2;
        cfg.frequencies = FrequencyGrid {
            fmin: 40.0,
            fmax: 1500.0,
            step: 5.0,
        };
        cfg.peaks.count = 6;
        cfg.design.proto = ProtoDesign::uniform(0.0, 1.0, 3);
        cfg.adjust.n_samples = 400;
        cfg.adjust.max_iter = 15;
        cfg.adjust.mouthpiece_length = 0.05;
        cfg.temporal = TemporalOptions {
            sample_rate: 22_050.0,
            fft_len: 4096,
            reflection_len: 2048,
        };
        StudyContext::new(cfg).unwrap()
    }

    fn write_reference(dir: &Path) -> PathBuf {
        let g = BoreGeometry::from_points(&[(0.0, 0.008), (0.05, 0.005), (0.4, 0.006), (0.7, 0.03)]).unwrap();
        let path = dir.join("reference.txt");
        write_geometry(&path, &g, &WriteOptions::default()).unwrap();
        path
    }

    #[test]
    fn impedance_is_written_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let reference = write_reference(dir.path());

        let first = run_impedance(&ctx, &reference, false).unwrap();
        assert!(ctx.output_path("reference_impedance.txt").is_file());
        assert!(ctx.output_path("reference_impedance.svg").is_file());
        assert!(!first.peaks.is_empty());
        assert!(first.peaks.windows(2).all(|w| w[0].frequency < w[1].frequency));

        let second = run_impedance(&ctx, &reference, true).unwrap();
        assert_eq!(first.curve, second.curve);
        let peaks = run_peaks(&ctx, &ctx.output_path("reference_impedance.txt")).unwrap();
        assert_eq!(peaks.len(), first.peaks.len());
    }

    #[test]
    fn design_takes_the_reference_span() {
        let g = BoreGeometry::from_points(&[(0.0, 0.008), (1.3, 0.06)]).unwrap();
        let cfg = DesignConfig {
            proto: ProtoDesign::uniform(0.0, 1.0, 2),
            span_from_reference: true,
        };
        let d = design_for(&cfg, &g);
        assert_eq!(d.x_end, 1.3);
        assert_eq!(d.r_end, Some(0.06));

        let kept = design_for(
            &DesignConfig {
                span_from_reference: false,
                ..cfg
            },
            &g,
        );
        assert_eq!(kept.x_end, 1.0);
    }

    #[test]
    fn simplify_runs_both_fits_against_a_measurement() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let reference = write_reference(dir.path());
        let measured = run_impedance(&ctx, &reference, false).unwrap();
        let measured_path = dir.path().join("measured.txt");
        write_impedance(&measured_path, &measured.curve, true).unwrap();

        let run = run_simplify(&ctx, &reference, Some(&measured_path), "simple").unwrap();
        assert_eq!(run.report.stages.len(), 3);
        assert_eq!(run.report.comparisons.len(), 2);
        assert!(run.report.stages[1].report.cost_final <= run.report.stages[0].report.cost_final);
        assert_eq!(run.geometric.x_end(), 0.7);
        let acoustic = run.acoustic.unwrap();
        assert_eq!(acoustic.x_end(), 0.7);
        assert_eq!(acoustic.x_start(), 0.0);
        for name in ["simple_geometric.txt", "simple_acoustic.txt", "simple_report.json", "simple_resonances.svg"] {
            assert!(ctx.output_path(name).is_file(), "{name} missing");
        }
        let reloaded = read_geometry(&ctx.output_path("simple_geometric.txt")).unwrap();
        assert_eq!(reloaded.segment_count(), 3);
    }

    #[test]
    fn compare_reports_each_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let reference = write_reference(dir.path());
        let measured = run_impedance(&ctx, &reference, false).unwrap();
        let measured_path = dir.path().join("measured.txt");
        write_impedance(&measured_path, &measured.curve, true).unwrap();

        let cylinder = dir.path().join("cylinder.txt");
        let g = BoreGeometry::from_points(&[(0.0, 0.008), (0.7, 0.008)]).unwrap();
        write_geometry(&cylinder, &g, &WriteOptions::default()).unwrap();

        let run = run_compare(&ctx, &measured_path, &[reference, cylinder], "cmp", Some((40.0, 1000.0))).unwrap();
        assert_eq!(run.simulated.len(), 2);
        assert_eq!(run.simulated[0].0, "reference");
        let same = &run.report.comparisons[0].comparison;
        assert!(same.max_abs_cents() < 1e-6);
        assert!(ctx.output_path("cmp_impedance.svg").is_file());
    }

    #[test]
    fn synth_writes_one_sound_per_lip_frequency() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        ctx.config.synth.duration = 0.05;
        ctx.config.synth.lip_frequencies = vec![230.0, 300.0];
        let reference = write_reference(dir.path());

        let sounds = run_synth(&ctx, &reference).unwrap();
        assert_eq!(sounds.len(), 2);
        assert!(sounds[0].path.ends_with("reference_boundary-layer_flips_230Hz.wav"));
        assert!(sounds.iter().all(|s| s.path.is_file()));

        let again = run_synth(&ctx, &reference).unwrap();
        assert_eq!(again, sounds);
        let cached = fs::read_dir(ctx.cache().dir())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "wav"))
            .count();
        assert_eq!(cached, 2);
    }

    #[test]
    fn pitch_gives_one_point_per_lip_frequency() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        ctx.config.pitch.duration = 0.2;
        ctx.config.pitch.window_from = 0.1;
        ctx.config.pitch.window_to = 0.2;
        ctx.config.pitch.resonance_grid = FrequencyGrid {
            fmin: 20.0,
            fmax: 1500.0,
            step: 2.0,
        };
        let reference = write_reference(dir.path());

        let run = run_pitch(&ctx, &reference).unwrap();
        assert_eq!(run.points.len(), 1);
        assert_eq!(run.points[0].lip_frequency, 300.0);
        assert!(!run.resonances.is_empty());
        assert!(ctx.output_path("reference_pitch.svg").is_file());
        assert!(ctx.output_path("reference_spectrogram_300Hz.svg").is_file());
        assert!(ctx.output_path("reference_pitch_report.json").is_file());
        assert_eq!(run.report.outputs.len(), 3);
    }
}
