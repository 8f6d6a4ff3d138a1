//! Impedance text files: `f re im` per line.
//!
//! Header comments carry the normalization:
//!
//! ```text
//! # normalized = true
//! # zc = 3.25e6
//! ```
//!
//! Values are normalized by `zc` on reading when the file holds physical
//! values (`normalized = false`), which then requires `zc`. Files without a
//! header are taken as normalized.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::domain::{Complex64, ImpedanceCurve};
use crate::error::AppError;

pub fn read_impedance(path: &Path) -> Result<ImpedanceCurve, AppError> {
    let text = fs::read_to_string(path).map_err(|e| AppError::read(path, e))?;
    let curve = parse_impedance(&text, &path.display().to_string())?;
    debug!(path = %path.display(), samples = curve.len(), "impedance loaded");
    Ok(curve)
}

pub fn parse_impedance(text: &str, origin: &str) -> Result<ImpedanceCurve, AppError> {
    let mut normalized = true;
    let mut zc: Option<f64> = None;
    let mut freqs = Vec::new();
    let mut values = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let err = |m: String| AppError::config(format!("{origin}:{line}: {m}"));
        let raw = raw.trim();
        if let Some(comment) = raw.strip_prefix('#') {
            if let Some((key, value)) = comment.split_once('=') {
                match key.trim() {
                    "normalized" => {
                        normalized = value
                            .trim()
                            .parse()
                            .map_err(|_| err(format!("invalid boolean '{}'", value.trim())))?;
                    }
                    "zc" => {
                        zc = Some(
                            value
                                .trim()
                                .parse()
                                .map_err(|_| err(format!("invalid zc '{}'", value.trim())))?,
                        );
                    }
                    _ => {}
                }
            }
            continue;
        }
        if raw.is_empty() {
            continue;
        }

        let nums = raw
            .split_whitespace()
            .map(|t| t.parse::<f64>().map_err(|_| err(format!("invalid number '{t}'"))))
            .collect::<Result<Vec<_>, _>>()?;
        let [f, re, im] = nums.as_slice() else {
            return Err(err(format!("expected 3 columns (f re im), found {}", nums.len())));
        };
        freqs.push(*f);
        values.push(Complex64::new(*re, *im));
    }

    if freqs.is_empty() {
        return Err(AppError::config(format!("{origin}: no impedance samples.")));
    }
    if !normalized {
        let zc = zc.ok_or_else(|| AppError::config(format!("{origin}: physical impedance without 'zc' header.")))?;
        for v in values.iter_mut() {
            *v /= zc;
        }
    }
    ImpedanceCurve::new(freqs, values, zc)
}

/// Render a curve, normalized or (when `zc` is known) in Pa·s/m³.
pub fn format_impedance(curve: &ImpedanceCurve, normalized: bool) -> Result<String, AppError> {
    let values = if normalized {
        curve.values().to_vec()
    } else {
        curve
            .denormalized()
            .ok_or_else(|| AppError::config("Cannot write physical values: characteristic impedance unknown."))?
    };

    let mut out = String::new();
    out.push_str(&format!("# normalized = {normalized}\n"));
    if let Some(zc) = curve.zc() {
        out.push_str(&format!("# zc = {zc}\n"));
    }
    out.push_str("# f re im\n");
    for (f, z) in curve.freqs().iter().zip(&values) {
        out.push_str(&format!("{f} {} {}\n", z.re, z.im));
    }
    Ok(out)
}

pub fn write_impedance(path: &Path, curve: &ImpedanceCurve, normalized: bool) -> Result<(), AppError> {
    let text = format_impedance(curve, normalized)?;
    fs::write(path, text).map_err(|e| AppError::write(path, e))?;
    debug!(path = %path.display(), samples = curve.len(), "impedance written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(zc: Option<f64>) -> ImpedanceCurve {
        ImpedanceCurve::new(
            vec![100.0, 100.5, 101.0],
            vec![Complex64::new(1.5, -2.0), Complex64::new(0.1 + 0.2, 3.0), Complex64::new(-4.0, 1e-7)],
            zc,
        )
        .unwrap()
    }

    #[test]
    fn normalized_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("z.txt");
        let original = curve(Some(2.5e6));
        write_impedance(&path, &original, true).unwrap();
        assert_eq!(read_impedance(&path).unwrap(), original);
    }

    #[test]
    fn physical_values_are_normalized_on_reading() {
        let text = "# normalized = false\n# zc = 2.0\n100 4 2\n200 -2 0\n";
        let z = parse_impedance(text, "phys").unwrap();
        assert_eq!(z.values()[0], Complex64::new(2.0, 1.0));
        assert_eq!(z.zc(), Some(2.0));

        let out = format_impedance(&z, false).unwrap();
        assert!(out.contains("100 4 2"));
    }

    #[test]
    fn headerless_file_is_normalized() {
        let z = parse_impedance("10 1 0\n20 2 0\n", "plain").unwrap();
        assert_eq!(z.zc(), None);
        assert!(format_impedance(&z, false).is_err());
    }

    #[test]
    fn malformed_inputs_are_config_errors() {
        assert_eq!(parse_impedance("10 1\n", "x").unwrap_err().exit_code(), 2);
        assert!(parse_impedance("# normalized = false\n10 1 0\n", "x").is_err());
        assert!(parse_impedance("# only comments\n", "x").is_err());
        assert!(parse_impedance("20 1 0\n10 1 0\n", "x").is_err());
    }
}
