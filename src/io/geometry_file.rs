//! Bore geometry text files.
//!
//! Two layouts are accepted (never mixed in one file):
//!
//! - segment rows `x0 x1 r0 r1 shape [coefficients...]`, with coefficients
//!   `α` for `bessel` and `m` knot positions followed by `m` knot radii for
//!   `spline`
//! - point rows `x r`, joined by linear segments
//!
//! A numeric token prefixed with `~` is a free parameter. `#` starts a comment
//! and `! key = value` lines set options (`unit = m|mm`, `diameter = true|false`)
//! for the whole file.
//!
//! Consecutive segment rows must be contiguous: each row starts where the
//! previous one ends.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::domain::ParamKind;
use crate::error::AppError;
use crate::geometry::{BoreGeometry, Knot, Node, OptimParams, Shape, ShapeKind, Value};

/// How parameter values are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Significant digits of parameter values.
    pub digits: usize,
    /// Prefix parameter values with `~` so they reload as free parameters.
    pub display_optim: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            digits: 6,
            display_optim: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Token {
    value: f64,
    free: bool,
}

struct SegmentRow {
    line: usize,
    x0: Token,
    x1: Token,
    r0: Token,
    r1: Token,
    shape: ShapeKind,
    coefficients: Vec<Token>,
}

#[derive(Debug, Clone, Copy)]
struct FileOptions {
    scale: f64,
    diameter: bool,
}

pub fn read_geometry(path: &Path) -> Result<BoreGeometry, AppError> {
    let text = fs::read_to_string(path).map_err(|e| AppError::read(path, e))?;
    let geom = parse_geometry(&text, &path.display().to_string())?;
    debug!(path = %path.display(), segments = geom.segment_count(), params = geom.params().len(), "geometry loaded");
    Ok(geom)
}

/// Parse geometry text; `origin` prefixes error messages.
pub fn parse_geometry(text: &str, origin: &str) -> Result<BoreGeometry, AppError> {
    let mut opts = FileOptions {
        scale: 1.0,
        diameter: false,
    };
    let mut points: Vec<(usize, Token, Token)> = Vec::new();
    let mut rows: Vec<SegmentRow> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let content = raw.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }
        if let Some(option) = content.strip_prefix('!') {
            parse_option(option, &mut opts).map_err(|m| AppError::config(format!("{origin}:{line}: {m}")))?;
            continue;
        }

        let fields: Vec<&str> = content.split_whitespace().collect();
        let err = |m: String| AppError::config(format!("{origin}:{line}: {m}"));
        match fields.len() {
            2 => points.push((line, token(fields[0]).map_err(err)?, token(fields[1]).map_err(err)?)),
            n if n >= 5 => {
                let shape: ShapeKind = fields[4].parse().map_err(|e: AppError| err(e.message().to_string()))?;
                let coefficients = fields[5..]
                    .iter()
                    .map(|f| token(f))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(err)?;
                rows.push(SegmentRow {
                    line,
                    x0: token(fields[0]).map_err(err)?,
                    x1: token(fields[1]).map_err(err)?,
                    r0: token(fields[2]).map_err(err)?,
                    r1: token(fields[3]).map_err(err)?,
                    shape,
                    coefficients,
                });
            }
            n => return Err(err(format!("expected 2 columns or at least 5, found {n}"))),
        }
    }

    match (points.is_empty(), rows.is_empty()) {
        (false, false) => Err(AppError::config(format!(
            "{origin}: mixes point rows and segment rows."
        ))),
        (true, true) => Err(AppError::config(format!("{origin}: no geometry rows."))),
        (false, true) => build_from_points(&points, opts, origin),
        (true, false) => build_from_segments(&rows, opts, origin),
    }
}

fn parse_option(option: &str, opts: &mut FileOptions) -> Result<(), String> {
    let (key, value) = option
        .split_once('=')
        .ok_or_else(|| format!("option '{}' is not 'key = value'", option.trim()))?;
    match (key.trim().to_ascii_lowercase().as_str(), value.trim().to_ascii_lowercase().as_str()) {
        ("unit", "m") => opts.scale = 1.0,
        ("unit", "mm") => opts.scale = 1e-3,
        ("diameter", "true") => opts.diameter = true,
        ("diameter", "false") => opts.diameter = false,
        (k, v) => return Err(format!("unsupported option '{k} = {v}'")),
    }
    Ok(())
}

fn token(s: &str) -> Result<Token, String> {
    let (free, number) = match s.strip_prefix('~') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let value: f64 = number.parse().map_err(|_| format!("invalid number '{s}'"))?;
    if !value.is_finite() {
        return Err(format!("non-finite value '{s}'"));
    }
    Ok(Token { value, free })
}

fn same(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1.0)
}

/// Turns tokens into geometry values, registering free ones as parameters.
struct ValueFactory {
    params: OptimParams,
    opts: FileOptions,
}

impl ValueFactory {
    fn make(&mut self, tok: Token, scale: f64, label: String, kind: ParamKind, group: String) -> Result<Value, AppError> {
        let v = tok.value * scale;
        if tok.free {
            Ok(Value::Param(self.params.add(label, v, kind, group)?))
        } else {
            Ok(Value::Fixed(v))
        }
    }

    fn position(&mut self, tok: Token, label: String, group: String) -> Result<Value, AppError> {
        let scale = self.opts.scale;
        self.make(tok, scale, label, ParamKind::Position, group)
    }

    fn radius(&mut self, tok: Token, label: String, group: String) -> Result<Value, AppError> {
        let scale = self.opts.scale * if self.opts.diameter { 0.5 } else { 1.0 };
        self.make(tok, scale, label, ParamKind::Radius, group)
    }

    fn node(&mut self, k: usize, x: Token, r: Token) -> Result<Node, AppError> {
        let group = format!("bore{}", k.saturating_sub(1));
        Ok(Node {
            x: self.position(x, format!("node{k}_pos"), group.clone())?,
            r: self.radius(r, format!("node{k}_radius"), group)?,
        })
    }
}

fn build_from_points(points: &[(usize, Token, Token)], opts: FileOptions, origin: &str) -> Result<BoreGeometry, AppError> {
    if points.len() < 2 {
        return Err(AppError::config(format!("{origin}: a point file needs at least two rows.")));
    }
    let mut factory = ValueFactory {
        params: OptimParams::new(),
        opts,
    };
    let nodes = points
        .iter()
        .enumerate()
        .map(|(k, &(_, x, r))| factory.node(k, x, r))
        .collect::<Result<Vec<_>, _>>()?;
    BoreGeometry::new(nodes, vec![Shape::Linear; points.len() - 1], factory.params)
}

fn build_from_segments(rows: &[SegmentRow], opts: FileOptions, origin: &str) -> Result<BoreGeometry, AppError> {
    for pair in rows.windows(2) {
        let (prev, row) = (&pair[0], &pair[1]);
        if !(same(prev.x1.value, row.x0.value) && same(prev.r1.value, row.r0.value)) {
            return Err(AppError::config(format!(
                "{origin}:{}: segment starts at ({}, {}) but the previous one ends at ({}, {}).",
                row.line, row.x0.value, row.r0.value, prev.x1.value, prev.r1.value
            )));
        }
    }

    let mut factory = ValueFactory {
        params: OptimParams::new(),
        opts,
    };
    let mut nodes = vec![factory.node(0, rows[0].x0, rows[0].r0)?];
    for (k, row) in rows.iter().enumerate() {
        // The end node is shared with the next row's start.
        let (mut x, mut r) = (row.x1, row.r1);
        if let Some(next) = rows.get(k + 1) {
            x.free |= next.x0.free;
            r.free |= next.r0.free;
        }
        nodes.push(factory.node(k + 1, x, r)?);
    }

    let mut shapes = Vec::with_capacity(rows.len());
    for (s, row) in rows.iter().enumerate() {
        let group = format!("bore{s}");
        let c = &row.coefficients;
        let shape = match row.shape {
            ShapeKind::Linear | ShapeKind::Exponential if !c.is_empty() => {
                return Err(AppError::config(format!(
                    "{origin}:{}: {} takes no coefficient, found {}.",
                    row.line,
                    row.shape,
                    c.len()
                )));
            }
            ShapeKind::Linear => Shape::Linear,
            ShapeKind::Exponential => Shape::Exponential,
            ShapeKind::Bessel => {
                let [alpha] = c.as_slice() else {
                    return Err(AppError::config(format!(
                        "{origin}:{}: bessel takes exactly one coefficient, found {}.",
                        row.line,
                        c.len()
                    )));
                };
                Shape::Bessel {
                    alpha: factory.make(*alpha, 1.0, format!("bore{s}_alpha"), ParamKind::Shape, group)?,
                }
            }
            ShapeKind::Spline => {
                if c.len() % 2 != 0 {
                    return Err(AppError::config(format!(
                        "{origin}:{}: spline needs as many knot radii as knot positions, found {} values.",
                        row.line,
                        c.len()
                    )));
                }
                let m = c.len() / 2;
                let mut knots = Vec::with_capacity(m);
                for j in 0..m {
                    knots.push(Knot {
                        x: factory.make(
                            c[j],
                            opts.scale,
                            format!("bore{s}_knot{j}_pos"),
                            ParamKind::Shape,
                            group.clone(),
                        )?,
                        r: factory.radius(c[m + j], format!("bore{s}_knot{j}_radius"), group.clone())?,
                    });
                }
                Shape::Spline { knots }
            }
        };
        shapes.push(shape);
    }

    BoreGeometry::new(nodes, shapes, factory.params)
}

/// Render a geometry as segment rows, in metres and radii.
pub fn format_geometry(geom: &BoreGeometry, opts: &WriteOptions) -> String {
    let params = geom.params();
    let fmt = |v: &Value| match *v {
        Value::Fixed(x) => format!("{x}"),
        Value::Param(id) => {
            let s = format!("{:.*e}", opts.digits.saturating_sub(1), params.value(id));
            if opts.display_optim { format!("~{s}") } else { s }
        }
    };

    let mut out = String::new();
    out.push_str("# x0 x1 r0 r1 shape [coefficients]\n");
    out.push_str("! unit = m\n");
    out.push_str("! diameter = false\n");
    for (s, shape) in geom.shapes().iter().enumerate() {
        let (a, b) = (&geom.nodes()[s], &geom.nodes()[s + 1]);
        let mut fields = vec![fmt(&a.x), fmt(&b.x), fmt(&a.r), fmt(&b.r), shape.kind().to_string()];
        match shape {
            Shape::Linear | Shape::Exponential => {}
            Shape::Bessel { alpha } => fields.push(fmt(alpha)),
            Shape::Spline { knots } => {
                fields.extend(knots.iter().map(|k| fmt(&k.x)));
                fields.extend(knots.iter().map(|k| fmt(&k.r)));
            }
        }
        out.push_str(&fields.join(" "));
        out.push('\n');
    }
    out
}

pub fn write_geometry(path: &Path, geom: &BoreGeometry, opts: &WriteOptions) -> Result<(), AppError> {
    fs::write(path, format_geometry(geom, opts)).map_err(|e| AppError::write(path, e))?;
    debug!(path = %path.display(), "geometry written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ProtoDesign;

    #[test]
    fn parses_segments_with_options_and_free_values() {
        let text = "\
# trumpet lead pipe
! unit = mm
! diameter = true
0 100 ~16 10 cone
100 300 10 ~20 bessel 0.7   # flare
300 500 ~20 40 spline ~400 30
";
        let g = parse_geometry(text, "test").unwrap();
        assert_eq!(g.segment_count(), 3);
        assert_eq!(g.x_end(), 0.5);
        assert_eq!(g.entry_radius(), 0.008);
        assert_eq!(g.shapes()[1].kind(), ShapeKind::Bessel);

        let labels = g.params().labels();
        assert_eq!(
            labels,
            ["node0_radius", "node2_radius", "bore2_knot0_pos"]
        );
        // Shared node is free when either side is marked.
        let node2 = g.nodes()[2];
        assert!(node2.r.is_param());
        assert!((node2.r.get(g.params()) - 0.01).abs() < 1e-15);

        let Shape::Spline { knots } = &g.shapes()[2] else {
            panic!("expected a spline");
        };
        assert!(!knots[0].r.is_param());
        assert!((knots[0].r.get(g.params()) - 0.015).abs() < 1e-15);
        assert!((knots[0].x.get(g.params()) - 0.4).abs() < 1e-15);
    }

    #[test]
    fn gaps_between_rows_are_rejected() {
        let text = "0 0.1 0.008 0.005 linear\n0.1 0.2 0.006 0.01 linear\n";
        let err = parse_geometry(text, "gap").unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("gap:2"));
    }

    #[test]
    fn layouts_cannot_be_mixed() {
        let text = "0 0.008\n0 0.1 0.008 0.005 linear\n";
        assert!(parse_geometry(text, "mixed").is_err());
    }

    #[test]
    fn point_rows_form_a_polyline() {
        let g = parse_geometry("0 0.008\n0.5 ~0.006\n1.0 0.06\n", "pts").unwrap();
        assert_eq!(g.segment_count(), 2);
        assert_eq!(g.params().labels(), ["node1_radius"]);
        assert!((g.radius_at(0.25).unwrap() - 0.007).abs() < 1e-12);
    }

    #[test]
    fn written_geometry_reloads() {
        let design = ProtoDesign {
            x_start: 0.0,
            x_end: 1.4,
            boundaries: vec![0.1, 1.0],
            subsegments: vec![1, 2, 1],
            shapes: vec!["spline4".into(), "cone".into(), "bessel".into()],
            r_start: Some(0.0085),
            r_end: Some(0.06),
            ..ProtoDesign::default()
        };
        let g = design.build(None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bore.txt");
        write_geometry(&path, &g, &WriteOptions::default()).unwrap();
        let back = read_geometry(&path).unwrap();

        assert_eq!(back.segment_count(), g.segment_count());
        for (a, b) in g.shapes().iter().zip(back.shapes()) {
            assert_eq!(a.kind(), b.kind());
        }
        for ((xa, ra), (xb, rb)) in g.node_values().iter().zip(back.node_values()) {
            assert!((xa - xb).abs() <= 1e-5 * xa.abs().max(1e-3));
            assert!((ra - rb).abs() <= 1e-5 * ra.abs());
        }
        // The entry position is fixed and must come back bit-exact.
        assert_eq!(back.x_start(), g.x_start());
        assert!(!back.nodes()[0].x.is_param());
    }

    #[test]
    fn fixed_values_survive_bit_exact() {
        let g = BoreGeometry::from_points(&[(0.0, 0.1 + 0.2), (1.0 / 3.0, 0.007_123_456_789_1)]).unwrap();
        let text = format_geometry(&g, &WriteOptions::default());
        let back = parse_geometry(&text, "exact").unwrap();
        assert_eq!(back.node_values(), g.node_values());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = read_geometry(Path::new("/nonexistent/bore.txt")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
