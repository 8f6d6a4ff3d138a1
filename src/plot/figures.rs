//! SVG figures of a study.

use std::fmt::Display;
use std::ops::Range;
use std::path::Path;

use plotters::prelude::*;
use tracing::debug;

use crate::audio::Spectrogram;
use crate::domain::ImpedanceCurve;
use crate::error::AppError;
use crate::report::{LabeledComparison, PitchPoint};

const SIZE: (u32, u32) = (1000, 600);

const PALETTE: [RGBColor; 6] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
];

fn color(i: usize) -> RGBColor {
    PALETTE[i % PALETTE.len()]
}

/// One labeled line of a figure.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: String,
    pub points: Vec<(f64, f64)>,
}

impl Series {
    pub fn new(label: impl Into<String>, points: Vec<(f64, f64)>) -> Self {
        Self {
            label: label.into(),
            points,
        }
    }
}

fn write_err<E: Display>(path: &Path) -> impl Fn(E) -> AppError + '_ {
    move |e| AppError::write(path, e)
}

/// `[min, max]` of finite values, widened by 5 % (or by 1 when flat).
fn padded_range(values: impl Iterator<Item = f64>) -> Option<Range<f64>> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !(lo <= hi) {
        return None;
    }
    let pad = if hi > lo { 0.05 * (hi - lo) } else { 1.0 };
    Some(lo - pad..hi + pad)
}

fn range_or_err(values: impl Iterator<Item = f64>, what: &str) -> Result<Range<f64>, AppError> {
    padded_range(values).ok_or_else(|| AppError::numeric(format!("Nothing finite to plot for {what}.")))
}

/// Bore radius against position, radii in millimetres.
pub fn plot_bore_profiles(path: &Path, title: &str, series: &[Series]) -> Result<(), AppError> {
    let xs = range_or_err(series.iter().flat_map(|s| s.points.iter().map(|p| p.0)), "bore positions")?;
    let rs = range_or_err(series.iter().flat_map(|s| s.points.iter().map(|p| p.1 * 1e3)), "bore radii")?;

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(write_err(path))?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(xs, rs)
        .map_err(write_err(path))?;
    chart
        .configure_mesh()
        .x_desc("x (m)")
        .y_desc("radius (mm)")
        .draw()
        .map_err(write_err(path))?;

    for (i, s) in series.iter().enumerate() {
        let c = color(i);
        chart
            .draw_series(LineSeries::new(s.points.iter().map(|&(x, r)| (x, r * 1e3)), c.stroke_width(2)))
            .map_err(write_err(path))?
            .label(s.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], c.stroke_width(2)));
    }
    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(&WHITE.mix(0.8))
        .draw()
        .map_err(write_err(path))?;
    root.present().map_err(write_err(path))?;
    debug!(path = %path.display(), "bore figure written");
    Ok(())
}

/// Impedance modulus in dB for several curves, with optional axis limits.
pub fn plot_impedances(
    path: &Path,
    title: &str,
    curves: &[(&str, &ImpedanceCurve)],
    xlim: Option<(f64, f64)>,
    ylim: Option<(f64, f64)>,
) -> Result<(), AppError> {
    let xs = match xlim {
        Some((a, b)) if b > a => a..b,
        _ => range_or_err(curves.iter().flat_map(|(_, c)| c.freqs().iter().copied()), "frequencies")?,
    };
    let ys = match ylim {
        Some((a, b)) if b > a => a..b,
        _ => range_or_err(curves.iter().flat_map(|(_, c)| c.modulus_db()), "impedance")?,
    };

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(write_err(path))?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(xs.clone(), ys.clone())
        .map_err(write_err(path))?;
    chart
        .configure_mesh()
        .x_desc("frequency (Hz)")
        .y_desc("|Z|/Zc (dB)")
        .draw()
        .map_err(write_err(path))?;

    for (i, (label, curve)) in curves.iter().enumerate() {
        let c = color(i);
        let points: Vec<(f64, f64)> = curve
            .freqs()
            .iter()
            .copied()
            .zip(curve.modulus_db())
            .filter(|(f, db)| xs.contains(f) && db.is_finite())
            .map(|(f, db)| (f, db.clamp(ys.start, ys.end)))
            .collect();
        chart
            .draw_series(LineSeries::new(points, c.stroke_width(1)))
            .map_err(write_err(path))?
            .label(*label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], c.stroke_width(2)));
    }
    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(&WHITE.mix(0.8))
        .draw()
        .map_err(write_err(path))?;
    root.present().map_err(write_err(path))?;
    debug!(path = %path.display(), "impedance figure written");
    Ok(())
}

/// Two panels against the reference frequency: deviation in cents, then in dB.
pub fn plot_resonance_deviation(path: &Path, comparisons: &[LabeledComparison]) -> Result<(), AppError> {
    let all = || comparisons.iter().flat_map(|c| c.comparison.deviations.iter());
    let xs = range_or_err(all().map(|d| d.reference.frequency), "resonance deviation")?;
    let cents = range_or_err(all().map(|d| d.cents).chain([0.0]), "cents")?;
    let dbs = range_or_err(all().map(|d| d.db).chain([0.0]), "dB")?;

    let root = SVGBackend::new(path, (SIZE.0, 800)).into_drawing_area();
    root.fill(&WHITE).map_err(write_err(path))?;
    let panels = root.split_evenly((2, 1));

    for (panel, (range, unit)) in panels.iter().zip([(cents, "cents"), (dbs, "dB")]) {
        let mut chart = ChartBuilder::on(panel)
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(xs.clone(), range)
            .map_err(write_err(path))?;
        chart
            .configure_mesh()
            .x_desc("reference resonance (Hz)")
            .y_desc(format!("deviation ({unit})"))
            .draw()
            .map_err(write_err(path))?;
        chart
            .draw_series(LineSeries::new([(xs.start, 0.0), (xs.end, 0.0)], BLACK.mix(0.5).stroke_width(1)))
            .map_err(write_err(path))?;

        for (i, cmp) in comparisons.iter().enumerate() {
            let c = color(i);
            let points: Vec<(f64, f64)> = cmp
                .comparison
                .deviations
                .iter()
                .map(|d| (d.reference.frequency, if unit == "cents" { d.cents } else { d.db }))
                .collect();
            chart
                .draw_series(LineSeries::new(points.clone(), c.stroke_width(1)))
                .map_err(write_err(path))?
                .label(cmp.label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], c.stroke_width(2)));
            chart
                .draw_series(points.into_iter().map(|p| Circle::new(p, 4, c.filled())))
                .map_err(write_err(path))?;
        }
        chart
            .configure_series_labels()
            .border_style(&BLACK)
            .background_style(&WHITE.mix(0.8))
            .draw()
            .map_err(write_err(path))?;
    }
    root.present().map_err(write_err(path))?;
    debug!(path = %path.display(), "deviation figure written");
    Ok(())
}

/// Played pitch against lip frequency, with horizontal lines at the bore
/// resonances and the `pitch = lip frequency` diagonal dashed.
pub fn plot_pitch(path: &Path, points: &[PitchPoint], resonances: &[f64]) -> Result<(), AppError> {
    let xs = range_or_err(points.iter().map(|p| p.lip_frequency), "lip frequencies")?;
    let ys = range_or_err(
        points.iter().filter_map(|p| p.pitch).chain(resonances.iter().copied()),
        "pitch",
    )?;

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(write_err(path))?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Played pitch", ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(xs.clone(), ys.clone())
        .map_err(write_err(path))?;
    chart
        .configure_mesh()
        .x_desc("lip frequency (Hz)")
        .y_desc("pitch (Hz)")
        .draw()
        .map_err(write_err(path))?;

    let grey = BLACK.mix(0.3).stroke_width(1);
    for &f in resonances.iter().filter(|f| ys.contains(f)) {
        chart
            .draw_series(LineSeries::new([(xs.start, f), (xs.end, f)], grey))
            .map_err(write_err(path))?;
    }

    // Diagonal, dashed: 40 dashes over the shared span.
    let (lo, hi) = (xs.start.max(ys.start), xs.end.min(ys.end));
    if hi > lo {
        let step = (hi - lo) / 80.0;
        for k in (0..80).step_by(2) {
            let a = lo + k as f64 * step;
            chart
                .draw_series(LineSeries::new([(a, a), (a + step, a + step)], BLACK.stroke_width(1)))
                .map_err(write_err(path))?;
        }
    }

    let voiced: Vec<(f64, f64)> = points
        .iter()
        .filter_map(|p| p.pitch.map(|f| (p.lip_frequency, f)))
        .collect();
    let c = color(0);
    chart
        .draw_series(voiced.iter().map(|&p| Circle::new(p, 5, c.filled())))
        .map_err(write_err(path))?;
    root.present().map_err(write_err(path))?;
    debug!(path = %path.display(), "pitch figure written");
    Ok(())
}

/// Black through red and orange to white, `v` in `[0, 1]`.
fn heat(v: f64) -> RGBColor {
    let channel = |offset: f64| ((2.0 * v - offset).clamp(0.0, 1.0) * 255.0).round() as u8;
    RGBColor(channel(0.0), channel(0.5), channel(1.0))
}

/// Spectrogram cells in dB, from `max − dynamic_range_db` (black) to the
/// loudest cell (white).
pub fn plot_spectrogram(path: &Path, title: &str, sg: &Spectrogram, dynamic_range_db: f64) -> Result<(), AppError> {
    let (Some(&t_first), Some(&t_last), Some(&f_last)) = (sg.times.first(), sg.times.last(), sg.freqs.last()) else {
        return Err(AppError::numeric(format!("Empty spectrogram for {}.", path.display())));
    };
    let dt = if sg.times.len() > 1 { sg.times[1] - sg.times[0] } else { 1e-3 };
    let df = if sg.freqs.len() > 1 { sg.freqs[1] - sg.freqs[0] } else { 1.0 };
    let db = sg.power_db(dynamic_range_db);
    let top = db.iter().flatten().copied().fold(f64::NEG_INFINITY, f64::max);
    let level = |v: f64| if dynamic_range_db > 0.0 { 1.0 - (top - v) / dynamic_range_db } else { 1.0 };

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(write_err(path))?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(t_first - 0.5 * dt..t_last + 0.5 * dt, 0.0..f_last + 0.5 * df)
        .map_err(write_err(path))?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("time (s)")
        .y_desc("frequency (Hz)")
        .draw()
        .map_err(write_err(path))?;

    let cells = sg.times.iter().zip(&db).flat_map(|(&t, frame)| {
        sg.freqs.iter().zip(frame).map(move |(&f, &v)| {
            let lo = (t - 0.5 * dt, (f - 0.5 * df).max(0.0));
            let hi = (t + 0.5 * dt, f + 0.5 * df);
            Rectangle::new([lo, hi], heat(level(v)).filled())
        })
    });
    chart.draw_series(cells).map_err(write_err(path))?;
    root.present().map_err(write_err(path))?;
    debug!(path = %path.display(), frames = sg.times.len(), "spectrogram figure written");
    Ok(())
}
