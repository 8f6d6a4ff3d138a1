//! Top-level application orchestration.
//!
//! `src/main.rs` only maps errors to exit codes; this module is the real main:
//! - parses CLI arguments and initializes logging
//! - loads the study configuration and applies the flag overrides
//! - runs the requested workflow through `pipeline`
//! - prints the reports

use clap::Parser;
use tracing::info;

use crate::acoustics::FrequencySolver;
use crate::cli::{Cli, Command};
use crate::config::StudyConfig;
use crate::error::AppError;
use crate::report::{format_comparison, format_deviation, format_pitch_table, format_resonances, format_stage};

pub mod pipeline;

use pipeline::StudyContext;

/// Entry point for the `bore` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    crate::logging::init(cli.verbosity());

    let mut config = StudyConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    match cli.command {
        Command::Impedance(args) => {
            args.physics.apply_solver(&mut config);
            args.grid.apply(&mut config);
            let ctx = context(config)?;
            let run = pipeline::run_impedance(&ctx, &args.geometry, args.physical)?;
            if args.peaks {
                print!("{}", format_resonances("Resonances", &run.peaks));
            }
            print_outputs(&run.report.outputs);
        }
        Command::Peaks(args) => {
            if let Some(k) = args.count {
                config.peaks.count = k;
            }
            if let Some(fmin) = args.fmin {
                config.peaks.fmin = fmin;
            }
            let ctx = context(config)?;
            let peaks = pipeline::run_peaks(&ctx, &args.impedance)?;
            print!("{}", format_resonances(&args.impedance.display().to_string(), &peaks));
        }
        Command::Simplify(args) => {
            args.physics.apply_solver(&mut config);
            if let Some(n) = args.max_iter {
                config.adjust.max_iter = n;
            }
            if args.trace_optim {
                config.adjust.verbose = true;
            }
            let ctx = context(config)?;
            let run = pipeline::run_simplify(&ctx, &args.reference, args.measured.as_deref(), &args.name)?;
            for stage in &run.report.stages {
                print!("{}", format_stage(&stage.name, &stage.report));
            }
            if let Some(dev) = &run.report.geometric_deviation {
                print!("{}", format_deviation(dev));
            }
            if !run.measured_peaks.is_empty() {
                print!("{}", format_resonances("Measured resonances", &run.measured_peaks));
            }
            for c in &run.report.comparisons {
                print!("{}", format_comparison(&c.label, &c.comparison));
            }
            print_outputs(&run.report.outputs);
        }
        Command::Compare(args) => {
            args.physics.apply_solver(&mut config);
            let ctx = context(config)?;
            let run = pipeline::run_compare(&ctx, &args.measured, &args.geometries, &args.name, args.xlim())?;
            print!("{}", format_resonances("Measured resonances", &run.measured_peaks));
            for c in &run.report.comparisons {
                print!("{}", format_comparison(&c.label, &c.comparison));
            }
            print_outputs(&run.report.outputs);
        }
        Command::Synth(args) => {
            args.apply(&mut config);
            let ctx = context(config)?;
            let sounds = pipeline::run_synth(&ctx, &args.geometry)?;
            for s in &sounds {
                println!("{:>8.1} Hz  {}", s.lip_frequency, s.path.display());
            }
        }
        Command::Pitch(args) => {
            args.apply(&mut config)?;
            let ctx = context(config)?;
            let run = pipeline::run_pitch(&ctx, &args.geometry)?;
            print!("{}", format_resonances("Resonances", &run.resonances));
            print!("{}", format_pitch_table(&run.points));
            print_outputs(&run.report.outputs);
        }
    }
    Ok(())
}

fn context(config: StudyConfig) -> Result<StudyContext, AppError> {
    let ctx = StudyContext::new(config)?;
    info!(
        output = %ctx.config().output.dir.display(),
        solver = %ctx.solver().describe(),
        "study context ready"
    );
    Ok(ctx)
}

fn print_outputs(outputs: &[String]) {
    if outputs.is_empty() {
        return;
    }
    println!("Written:");
    for o in outputs {
        println!("  {o}");
    }
}
