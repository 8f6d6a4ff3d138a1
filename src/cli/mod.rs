//! Command-line parsing for the `bore` binary.
//!
//! Parsing and dispatch stay apart from the acoustics and fitting code: every
//! flag here only overrides a field of `StudyConfig`.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::acoustics::{LossModel, Radiation};
use crate::config::StudyConfig;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "bore",
    version,
    about = "Brass bore simplification, impedance and sound research workflow"
)]
pub struct Cli {
    /// TOML study configuration (defaults reproduce the trumpet study).
    #[arg(short, long, global = true, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// More diagnostics on stderr (repeat for more).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Fewer diagnostics on stderr (repeat for fewer).
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "verbose")]
    pub quiet: u8,

    /// Output directory for geometries, impedances, sounds, figures and reports.
    #[arg(short, long, global = true, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Do not write SVG figures.
    #[arg(long, global = true)]
    pub no_figures: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// `-v` count minus `-q` count.
    pub fn verbosity(&self) -> i8 {
        let v = i8::try_from(self.verbose).unwrap_or(i8::MAX);
        let q = i8::try_from(self.quiet).unwrap_or(i8::MAX);
        v.saturating_sub(q)
    }

    /// Apply the global flags to a loaded configuration.
    pub fn apply(&self, config: &mut StudyConfig) {
        if let Some(dir) = &self.output {
            config.output.dir = dir.clone();
        }
        if self.no_figures {
            config.output.figures = false;
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compute (or reuse from the cache) the input impedance of a geometry and write it.
    Impedance(ImpedanceArgs),
    /// List the resonances of an impedance file.
    Peaks(PeaksArgs),
    /// Fit a simplified design to a reference bore, then optionally to a measured impedance.
    Simplify(SimplifyArgs),
    /// Compare simulated impedances of geometries with a measured one.
    Compare(CompareArgs),
    /// Synthesize sounds of a geometry for a list of lip frequencies.
    Synth(SynthArgs),
    /// Played pitch against lip frequency, with the resonances of the bore.
    Pitch(PitchArgs),
}

/// Physical setting shared by the commands that simulate.
#[derive(Debug, Args, Clone, Default)]
pub struct PhysicsArgs {
    /// Air temperature (°C).
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Wall loss model.
    #[arg(long, value_enum)]
    pub losses: Option<LossModel>,

    /// Radiation condition at the bell.
    #[arg(long, value_enum)]
    pub radiation: Option<Radiation>,
}

impl PhysicsArgs {
    /// Override the radiation of every command and the loss model of `[solver]`.
    pub fn apply_solver(&self, config: &mut StudyConfig) {
        if let Some(r) = self.radiation {
            config.solver.radiation = r;
        }
        if let Some(l) = self.losses {
            config.solver.losses = l;
        }
        if let Some(t) = self.temperature {
            config.temperature = t;
        }
    }
}

/// Frequency grid overrides.
#[derive(Debug, Args, Clone, Default)]
pub struct GridArgs {
    /// Lowest frequency (Hz).
    #[arg(long)]
    pub fmin: Option<f64>,

    /// Highest frequency (Hz).
    #[arg(long)]
    pub fmax: Option<f64>,

    /// Frequency step (Hz).
    #[arg(long)]
    pub step: Option<f64>,
}

impl GridArgs {
    pub fn apply(&self, config: &mut StudyConfig) {
        if let Some(v) = self.fmin {
            config.frequencies.fmin = v;
        }
        if let Some(v) = self.fmax {
            config.frequencies.fmax = v;
        }
        if let Some(v) = self.step {
            config.frequencies.step = v;
        }
    }
}

#[derive(Debug, Parser, Clone)]
pub struct ImpedanceArgs {
    /// Geometry file.
    #[arg(value_name = "GEOMETRY")]
    pub geometry: PathBuf,

    /// Write values in Pa·s/m³ instead of normalized by the entry Zc.
    #[arg(long)]
    pub physical: bool,

    /// Also print the resonances.
    #[arg(long)]
    pub peaks: bool,

    #[command(flatten)]
    pub physics: PhysicsArgs,

    #[command(flatten)]
    pub grid: GridArgs,
}

#[derive(Debug, Parser, Clone)]
pub struct PeaksArgs {
    /// Impedance file.
    #[arg(value_name = "IMPEDANCE")]
    pub impedance: PathBuf,

    /// Number of resonances.
    #[arg(short = 'k', long)]
    pub count: Option<usize>,

    /// Ignore resonances below this frequency (Hz).
    #[arg(long)]
    pub fmin: Option<f64>,
}

#[derive(Debug, Parser, Clone)]
pub struct SimplifyArgs {
    /// Reference geometry (e.g. from tomography).
    #[arg(long, value_name = "GEOMETRY")]
    pub reference: PathBuf,

    /// Measured impedance; enables the acoustic fit.
    #[arg(long, value_name = "IMPEDANCE")]
    pub measured: Option<PathBuf>,

    /// Stem of the written files.
    #[arg(long, default_value = "simplified")]
    pub name: String,

    /// Iteration cap of each optimization stage.
    #[arg(long)]
    pub max_iter: Option<usize>,

    /// Log every optimizer iteration.
    #[arg(long)]
    pub trace_optim: bool,

    #[command(flatten)]
    pub physics: PhysicsArgs,
}

#[derive(Debug, Parser, Clone)]
pub struct CompareArgs {
    /// Measured impedance.
    #[arg(long, value_name = "IMPEDANCE")]
    pub measured: PathBuf,

    /// Geometries to simulate and compare.
    #[arg(value_name = "GEOMETRY", required = true)]
    pub geometries: Vec<PathBuf>,

    /// Stem of the written figures and report.
    #[arg(long, default_value = "compare")]
    pub name: String,

    /// Lower x limit of the impedance figure (Hz).
    #[arg(long, requires = "xmax")]
    pub xmin: Option<f64>,

    /// Upper x limit of the impedance figure (Hz).
    #[arg(long, requires = "xmin")]
    pub xmax: Option<f64>,

    #[command(flatten)]
    pub physics: PhysicsArgs,
}

impl CompareArgs {
    pub fn xlim(&self) -> Option<(f64, f64)> {
        self.xmin.zip(self.xmax)
    }
}

/// Overrides shared by the time-domain commands.
#[derive(Debug, Args, Clone, Default)]
pub struct PlayArgs {
    /// Lip resonance frequency (Hz); repeat for several sounds.
    #[arg(long = "lip-freq", value_name = "HZ")]
    pub lip_frequencies: Vec<f64>,

    /// Simulated duration (s).
    #[arg(long)]
    pub duration: Option<f64>,

    /// Air temperature (°C).
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Wall loss model.
    #[arg(long, value_enum)]
    pub losses: Option<LossModel>,
}

#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    /// Geometry file.
    #[arg(value_name = "GEOMETRY")]
    pub geometry: PathBuf,

    /// Write the bell flow itself instead of its derivative.
    #[arg(long)]
    pub raw_flow: bool,

    #[command(flatten)]
    pub play: PlayArgs,
}

impl SynthArgs {
    pub fn apply(&self, config: &mut StudyConfig) {
        let synth = &mut config.synth;
        if !self.play.lip_frequencies.is_empty() {
            synth.lip_frequencies = self.play.lip_frequencies.clone();
        }
        if let Some(d) = self.play.duration {
            synth.duration = d;
        }
        if let Some(t) = self.play.temperature {
            synth.temperature = t;
        }
        if let Some(l) = self.play.losses {
            synth.losses = l;
        }
        if self.raw_flow {
            synth.differentiate = false;
        }
    }
}

#[derive(Debug, Parser, Clone)]
pub struct PitchArgs {
    /// Geometry file.
    #[arg(value_name = "GEOMETRY")]
    pub geometry: PathBuf,

    /// Sweep lip frequencies `FROM:TO:STEP` (Hz) instead of listing them.
    #[arg(long, value_name = "FROM:TO:STEP", conflicts_with = "lip_frequencies")]
    pub sweep: Option<String>,

    #[command(flatten)]
    pub play: PlayArgs,
}

impl PitchArgs {
    pub fn apply(&self, config: &mut StudyConfig) -> Result<(), crate::error::AppError> {
        let pitch = &mut config.pitch;
        if let Some(sweep) = &self.sweep {
            pitch.lip_frequencies = parse_sweep(sweep)?;
        } else if !self.play.lip_frequencies.is_empty() {
            pitch.lip_frequencies = self.play.lip_frequencies.clone();
        }
        if let Some(d) = self.play.duration {
            pitch.duration = d;
        }
        if let Some(t) = self.play.temperature {
            pitch.temperature = t;
        }
        if let Some(l) = self.play.losses {
            pitch.losses = l;
        }
        Ok(())
    }
}

/// `from:to:step` with `to` excluded, e.g. `20:1220:20`.
pub fn parse_sweep(s: &str) -> Result<Vec<f64>, crate::error::AppError> {
    let bad = || crate::error::AppError::config(format!("Invalid sweep '{s}', expected FROM:TO:STEP."));
    let parts = s
        .split(':')
        .map(|p| p.trim().parse::<f64>().map_err(|_| bad()))
        .collect::<Result<Vec<_>, _>>()?;
    let [from, to, step] = parts.as_slice() else {
        return Err(bad());
    };
    if !(*step > 0.0 && to > from && *from > 0.0) {
        return Err(bad());
    }
    let mut out = Vec::new();
    let mut i = 0usize;
    loop {
        let f = from + step * i as f64;
        if f >= to - step * 1e-9 {
            break;
        }
        out.push(f);
        i += 1;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_override_the_config() {
        let cli = Cli::parse_from(["bore", "-vv", "--output", "out", "--no-figures", "peaks", "z.txt"]);
        assert_eq!(cli.verbosity(), 2);
        let mut cfg = StudyConfig::default();
        cli.apply(&mut cfg);
        assert_eq!(cfg.output.dir, PathBuf::from("out"));
        assert!(!cfg.output.figures);
    }

    #[test]
    fn synth_overrides() {
        let cli = Cli::parse_from([
            "bore",
            "synth",
            "bore.txt",
            "--lip-freq",
            "230",
            "--lip-freq",
            "300",
            "--losses",
            "lossless",
            "--raw-flow",
        ]);
        let Command::Synth(args) = cli.command else {
            panic!("expected synth");
        };
        let mut cfg = StudyConfig::default();
        args.apply(&mut cfg);
        assert_eq!(cfg.synth.lip_frequencies, vec![230.0, 300.0]);
        assert_eq!(cfg.synth.losses, LossModel::Lossless);
        assert!(!cfg.synth.differentiate);
        assert_eq!(cfg.synth.duration, 1.45);
    }

    #[test]
    fn sweep_excludes_its_end() {
        let f = parse_sweep("20:1220:20").unwrap();
        assert_eq!(f.len(), 60);
        assert_eq!(f[0], 20.0);
        assert_eq!(*f.last().unwrap(), 1200.0);
        assert!(parse_sweep("20:10:5").is_err());
        assert!(parse_sweep("a:b").is_err());
    }
}
