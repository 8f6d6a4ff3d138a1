//! Terminal output: resonance tables, comparisons and optimization summaries.
//!
//! All formatting lives here so the numeric code stays free of presentation.

use crate::domain::ResonancePeak;
use crate::fit::{AdjustReport, GeometricDeviation};
use crate::report::{PitchPoint, ResonanceComparison};

pub fn format_resonances(title: &str, peaks: &[ResonancePeak]) -> String {
    let mut out = format!("{title}\n");
    push_row(&mut out, format!("{:>3} {:>12} {:>10} {:>8}", "#", "f (Hz)", "|Z|/Zc", "Q"));
    push_row(&mut out, format!("{:->3} {:->12} {:->10} {:->8}", "", "", "", ""));
    for (i, p) in peaks.iter().enumerate() {
        push_row(
            &mut out,
            format!("{:>3} {:>12.2} {:>10.2} {:>8.1}", i + 1, p.frequency, p.amplitude, p.quality),
        );
    }
    out
}

pub fn format_comparison(label: &str, cmp: &ResonanceComparison) -> String {
    let mut out = format!("Resonance deviation: {label}\n");
    push_row(
        &mut out,
        format!("{:>3} {:>12} {:>12} {:>10} {:>8}", "#", "f_ref (Hz)", "f (Hz)", "cents", "dB"),
    );
    push_row(&mut out, format!("{:->3} {:->12} {:->12} {:->10} {:->8}", "", "", "", "", ""));
    for d in &cmp.deviations {
        push_row(
            &mut out,
            format!(
                "{:>3} {:>12.2} {:>12.2} {:>10.1} {:>8.2}",
                d.index + 1,
                d.reference.frequency,
                d.candidate.frequency,
                d.cents,
                d.db
            ),
        );
    }
    out.push_str(&format!(
        "max |cents| = {:.1}, rms cents = {:.1}, max |dB| = {:.2}\n",
        cmp.max_abs_cents(),
        cmp.rms_cents(),
        cmp.max_abs_db()
    ));
    if cmp.unmatched_reference > 0 || cmp.unmatched_candidate > 0 {
        out.push_str(&format!(
            "unmatched peaks: {} reference, {} simulated\n",
            cmp.unmatched_reference, cmp.unmatched_candidate
        ));
    }
    out
}

pub fn format_stage(name: &str, report: &AdjustReport) -> String {
    let status = if report.converged { "converged" } else { "NOT converged" };
    format!(
        "{name}: {status} ({:?}) after {} iterations, {} active parameters, cost {:.4e} -> {:.4e}\n",
        report.reason, report.iterations, report.n_active, report.cost_initial, report.cost_final
    )
}

pub fn format_deviation(dev: &GeometricDeviation) -> String {
    format!(
        "Radius deviation: max {:.4} mm, mean {:.4} mm\n",
        dev.max_mm, dev.mean_mm
    )
}

pub fn format_pitch_table(points: &[PitchPoint]) -> String {
    let mut out = String::from("Played pitch\n");
    push_row(&mut out, format!("{:>12} {:>12}", "lip (Hz)", "pitch (Hz)"));
    push_row(&mut out, format!("{:->12} {:->12}", "", ""));
    for p in points {
        let pitch = p.pitch.map(|f| format!("{f:.2}")).unwrap_or_else(|| "-".to_string());
        push_row(&mut out, format!("{:>12.1} {:>12}", p.lip_frequency, pitch));
    }
    out
}

fn push_row(out: &mut String, row: String) {
    out.push_str(row.trim_end());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::compare_resonances;

    fn peak(frequency: f64) -> ResonancePeak {
        ResonancePeak {
            frequency,
            amplitude: 12.0,
            quality: 25.0,
        }
    }

    #[test]
    fn resonance_table_lists_every_peak() {
        let s = format_resonances("Measured", &[peak(116.5), peak(233.08)]);
        assert_eq!(s.lines().count(), 5);
        assert!(s.contains("233.08"));
        assert!(s.lines().all(|l| l == l.trim_end()));
    }

    #[test]
    fn comparison_mentions_unmatched_peaks() {
        let cmp = compare_resonances(&[peak(100.0), peak(200.0)], &[peak(100.0)]);
        let s = format_comparison("sim", &cmp);
        assert!(s.contains("unmatched peaks: 1 reference, 0 simulated"));

        let even = compare_resonances(&[peak(100.0)], &[peak(100.0)]);
        assert!(!format_comparison("sim", &even).contains("unmatched"));
    }

    #[test]
    fn pitch_table_marks_unvoiced_runs() {
        let s = format_pitch_table(&[
            PitchPoint {
                lip_frequency: 60.0,
                pitch: None,
            },
            PitchPoint {
                lip_frequency: 230.0,
                pitch: Some(233.1),
            },
        ]);
        assert!(s.lines().any(|l| l.trim_start().starts_with("60.0") && l.ends_with('-')));
        assert!(s.contains("233.10"));
    }
}
