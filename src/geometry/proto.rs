//! Parametric starting geometries ("proto" designs).
//!
//! A design splits `[x_start, x_end]` into parts at fixed `boundaries`; part `i`
//! is cut into `subsegments[i]` evenly spaced sub-segments, all with the shape
//! `shapes[i]`. Every radius and every node position (except the entry) becomes
//! a parameter, so the whole design can be fitted.
//!
//! Parameter labels:
//!
//! - `node{k}_pos`, `node{k}_radius` for node `k`
//! - `bore{s}_knot{j}_pos`, `bore{s}_knot{j}_radius` for spline knots of segment `s`
//! - `bore{s}_alpha` for Bessel segments
//!
//! and parameters of part `i` are grouped under `part{i}`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::ParamKind;
use crate::error::AppError;
use crate::geometry::bore::{BoreGeometry, Node};
use crate::geometry::params::{OptimParams, Value};
use crate::geometry::shape::{Knot, Shape};
use crate::math::linspace;

/// Radius used when neither a target nor end radii are given.
pub const DEFAULT_RADIUS: f64 = 5e-3;
/// Initial Bessel flare coefficient.
pub const DEFAULT_ALPHA: f64 = 0.7;

/// Shape requested for every sub-segment of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoShape {
    Linear,
    Exponential,
    Bessel,
    /// Spline with `points` knots counting both ends.
    Spline { points: usize },
}

impl FromStr for ProtoShape {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        match key.as_str() {
            "linear" | "cone" => Ok(ProtoShape::Linear),
            "exponential" | "exp" => Ok(ProtoShape::Exponential),
            "bessel" => Ok(ProtoShape::Bessel),
            "spline" => Ok(ProtoShape::Spline { points: 3 }),
            _ => {
                let points = key
                    .strip_prefix("spline")
                    .and_then(|n| n.parse::<usize>().ok())
                    .filter(|&n| n >= 2)
                    .ok_or_else(|| AppError::config(format!("Unknown proto shape '{s}'.")))?;
                Ok(ProtoShape::Spline { points })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtoDesign {
    pub x_start: f64,
    pub x_end: f64,
    pub boundaries: Vec<f64>,
    pub subsegments: Vec<usize>,
    /// Empty means every part is linear.
    pub shapes: Vec<String>,
    pub r_start: Option<f64>,
    pub r_end: Option<f64>,
    /// Activate the interior node positions.
    pub free_positions: bool,
    /// Turn the boundaries into fixed values instead of parameters.
    pub pin_boundaries: bool,
}

impl Default for ProtoDesign {
    fn default() -> Self {
        Self {
            x_start: 0.0,
            x_end: 1.0,
            boundaries: Vec::new(),
            subsegments: vec![1],
            shapes: Vec::new(),
            r_start: None,
            r_end: None,
            free_positions: true,
            pin_boundaries: false,
        }
    }
}

impl ProtoDesign {
    /// One part with `n` floating linear sub-segments.
    pub fn uniform(x_start: f64, x_end: f64, n: usize) -> Self {
        Self {
            x_start,
            x_end,
            subsegments: vec![n],
            ..Self::default()
        }
    }

    fn part_shapes(&self) -> Result<Vec<ProtoShape>, AppError> {
        if self.shapes.is_empty() {
            return Ok(vec![ProtoShape::Linear; self.subsegments.len()]);
        }
        if self.shapes.len() != self.subsegments.len() {
            return Err(AppError::config(format!(
                "{} shapes given for {} parts.",
                self.shapes.len(),
                self.subsegments.len()
            )));
        }
        self.shapes.iter().map(|s| s.parse()).collect()
    }

    fn validate(&self) -> Result<(), AppError> {
        if !(self.x_end > self.x_start) {
            return Err(AppError::config(format!(
                "Design end {} must be after its start {}.",
                self.x_end, self.x_start
            )));
        }
        if self.subsegments.len() != self.boundaries.len() + 1 {
            return Err(AppError::config(format!(
                "{} boundaries need {} sub-segment counts, got {}.",
                self.boundaries.len(),
                self.boundaries.len() + 1,
                self.subsegments.len()
            )));
        }
        if let Some(i) = self.subsegments.iter().position(|&n| n == 0) {
            return Err(AppError::config(format!("Part {i} has zero sub-segments.")));
        }
        let mut prev = self.x_start;
        for &b in &self.boundaries {
            if !(b > prev && b < self.x_end) {
                return Err(AppError::config(format!(
                    "Boundaries must increase strictly inside ({}, {}); got {:?}.",
                    self.x_start, self.x_end, self.boundaries
                )));
            }
            prev = b;
        }
        for r in [self.r_start, self.r_end].into_iter().flatten() {
            if !(r > 0.0) {
                return Err(AppError::config(format!("End radius must be > 0, got {r}.")));
            }
        }
        Ok(())
    }

    /// Build the parametric geometry, radii initialized from `target` when given.
    pub fn build(&self, target: Option<&BoreGeometry>) -> Result<BoreGeometry, AppError> {
        self.validate()?;
        let part_shapes = self.part_shapes()?;

        let mut edges = Vec::with_capacity(self.boundaries.len() + 2);
        edges.push(self.x_start);
        edges.extend_from_slice(&self.boundaries);
        edges.push(self.x_end);

        // (x, part, is_boundary) for every node.
        let mut node_pos: Vec<(f64, usize, bool)> = vec![(self.x_start, 0, false)];
        for (part, &n) in self.subsegments.iter().enumerate() {
            let xs = linspace(edges[part], edges[part + 1], n + 1);
            let last = xs.len() - 1;
            for (j, &x) in xs.iter().enumerate().skip(1) {
                let is_boundary = j == last && part + 1 < self.subsegments.len();
                // A boundary node opens the next part.
                let group = if is_boundary { part + 1 } else { part };
                node_pos.push((x, group, is_boundary));
            }
        }
        let n_nodes = node_pos.len();

        let all_x: Vec<f64> = node_pos.iter().map(|p| p.0).collect();
        let init_radius = self.initial_radii(&all_x, target)?;

        let mut params = OptimParams::new();
        let mut nodes = Vec::with_capacity(n_nodes);
        for (k, &(x, part, is_boundary)) in node_pos.iter().enumerate() {
            let group = format!("part{part}");
            let x_value = if k == 0 || (is_boundary && self.pin_boundaries) {
                Value::Fixed(x)
            } else {
                let id = params.add(format!("node{k}_pos"), x, ParamKind::Position, &group)?;
                let active = k + 1 < n_nodes && self.free_positions;
                params.set_active(id, active)?;
                Value::Param(id)
            };
            let r_id = params.add(format!("node{k}_radius"), init_radius[k], ParamKind::Radius, &group)?;
            nodes.push(Node {
                x: x_value,
                r: Value::Param(r_id),
            });
        }

        let mut shapes = Vec::with_capacity(n_nodes - 1);
        let mut seg = 0usize;
        for (part, (&n, shape)) in self.subsegments.iter().zip(&part_shapes).enumerate() {
            let group = format!("part{part}");
            for _ in 0..n {
                let (x0, x1) = (all_x[seg], all_x[seg + 1]);
                let built = match *shape {
                    ProtoShape::Linear => Shape::Linear,
                    ProtoShape::Exponential => Shape::Exponential,
                    ProtoShape::Bessel => {
                        let id = params.add(format!("bore{seg}_alpha"), DEFAULT_ALPHA, ParamKind::Shape, &group)?;
                        Shape::Bessel { alpha: Value::Param(id) }
                    }
                    ProtoShape::Spline { points } => {
                        let grid = linspace(x0, x1, points);
                        let inner = &grid[1..points - 1];
                        let radii = self.initial_radii(inner, target)?;
                        let mut knots = Vec::with_capacity(inner.len());
                        for (j, (&kx, &kr)) in inner.iter().zip(&radii).enumerate() {
                            let xid = params.add(format!("bore{seg}_knot{j}_pos"), kx, ParamKind::Shape, &group)?;
                            let rid = params.add(format!("bore{seg}_knot{j}_radius"), kr, ParamKind::Radius, &group)?;
                            knots.push(Knot {
                                x: Value::Param(xid),
                                r: Value::Param(rid),
                            });
                        }
                        Shape::Spline { knots }
                    }
                };
                shapes.push(built);
                seg += 1;
            }
        }

        BoreGeometry::new(nodes, shapes, params)
    }

    /// Radius guesses at `xs`: sampled from the target, or interpolated between
    /// the end radii. Explicit end radii win at the bore ends.
    fn initial_radii(&self, xs: &[f64], target: Option<&BoreGeometry>) -> Result<Vec<f64>, AppError> {
        let mut radii = match target {
            Some(t) => t.radii_at(xs)?,
            None => {
                let r0 = self.r_start.unwrap_or(DEFAULT_RADIUS);
                let r1 = self.r_end.unwrap_or(DEFAULT_RADIUS);
                let span = self.x_end - self.x_start;
                xs.iter()
                    .map(|&x| r0 + (r1 - r0) * (x - self.x_start) / span)
                    .collect()
            }
        };
        for (x, r) in xs.iter().zip(radii.iter_mut()) {
            if *x == self.x_start {
                if let Some(r0) = self.r_start {
                    *r = r0;
                }
            }
            if *x == self.x_end {
                if let Some(r1) = self.r_end {
                    *r = r1;
                }
            }
        }
        Ok(radii)
    }
}
