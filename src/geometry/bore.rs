//! Bore geometry: nodes, segment shapes and the parameters they refer to.

use crate::error::AppError;
use crate::geometry::params::{OptimParams, ParamId, Value};
use crate::geometry::shape::{SegmentProfile, Shape};
use crate::math::linspace;

/// A point of the bore axis where two segments meet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub x: Value,
    pub r: Value,
}

impl Node {
    pub fn fixed(x: f64, r: f64) -> Self {
        Self {
            x: Value::Fixed(x),
            r: Value::Fixed(r),
        }
    }
}

/// Cylindrical slice used by the transfer-matrix solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slice {
    pub length: f64,
    pub radius: f64,
}

/// Piecewise bore: `nodes.len() == shapes.len() + 1`, segment `i` joins node
/// `i` and node `i + 1`.
///
/// Radius continuity at interior nodes holds by construction since adjacent
/// segments share their node.
#[derive(Debug, Clone, PartialEq)]
pub struct BoreGeometry {
    nodes: Vec<Node>,
    shapes: Vec<Shape>,
    params: OptimParams,
}

impl BoreGeometry {
    pub fn new(nodes: Vec<Node>, shapes: Vec<Shape>, params: OptimParams) -> Result<Self, AppError> {
        if nodes.len() < 2 {
            return Err(AppError::config("A bore needs at least two nodes."));
        }
        if shapes.len() + 1 != nodes.len() {
            return Err(AppError::config(format!(
                "{} nodes cannot carry {} segments.",
                nodes.len(),
                shapes.len()
            )));
        }
        let geom = Self { nodes, shapes, params };
        if let Some(id) = geom.referenced_params().into_iter().find(|&id| id >= geom.params.len()) {
            return Err(AppError::config(format!("Geometry refers to unknown parameter {id}.")));
        }
        Ok(geom)
    }

    /// Polyline through measured `(x, r)` points, every value fixed.
    pub fn from_points(points: &[(f64, f64)]) -> Result<Self, AppError> {
        let nodes = points.iter().map(|&(x, r)| Node::fixed(x, r)).collect::<Vec<_>>();
        let shapes = vec![Shape::Linear; points.len().saturating_sub(1)];
        Self::new(nodes, shapes, OptimParams::new())
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn params(&self) -> &OptimParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut OptimParams {
        &mut self.params
    }

    pub fn segment_count(&self) -> usize {
        self.shapes.len()
    }

    /// Current `(x, r)` of every node.
    pub fn node_values(&self) -> Vec<(f64, f64)> {
        self.nodes
            .iter()
            .map(|n| (n.x.get(&self.params), n.r.get(&self.params)))
            .collect()
    }

    pub fn x_start(&self) -> f64 {
        self.nodes[0].x.get(&self.params)
    }

    pub fn x_end(&self) -> f64 {
        self.nodes[self.nodes.len() - 1].x.get(&self.params)
    }

    pub fn length(&self) -> f64 {
        self.x_end() - self.x_start()
    }

    pub fn entry_radius(&self) -> f64 {
        self.nodes[0].r.get(&self.params)
    }

    pub fn bell_radius(&self) -> f64 {
        self.nodes[self.nodes.len() - 1].r.get(&self.params)
    }

    /// Resolved numeric profile of every segment.
    pub fn profiles(&self) -> Result<Vec<SegmentProfile>, AppError> {
        let values = self.node_values();
        self.shapes
            .iter()
            .enumerate()
            .map(|(i, shape)| shape.resolve(values[i], values[i + 1], &self.params))
            .collect()
    }

    /// Check the geometric invariants: node positions increase by at least
    /// `min_part_length`, radii (nodes and knots) are positive and finite, and
    /// every shape resolves.
    pub fn check_feasible(&self, min_part_length: f64) -> Result<(), AppError> {
        let values = self.node_values();
        for (k, &(x, r)) in values.iter().enumerate() {
            if !x.is_finite() || !(r > 0.0 && r.is_finite()) {
                return Err(AppError::numeric(format!("Node {k} is invalid: x={x}, r={r}.")));
            }
        }
        for (k, w) in values.windows(2).enumerate() {
            if w[1].0 - w[0].0 < min_part_length {
                return Err(AppError::numeric(format!(
                    "Segment {k} is shorter than {min_part_length} m: [{}, {}].",
                    w[0].0, w[1].0
                )));
            }
        }
        for (s, shape) in self.shapes.iter().enumerate() {
            if let Shape::Spline { knots } = shape {
                if let Some(k) = knots.iter().find(|k| !(k.r.get(&self.params) > 0.0)) {
                    return Err(AppError::numeric(format!(
                        "Segment {s} has a non-positive spline knot radius {}.",
                        k.r.get(&self.params)
                    )));
                }
            }
        }
        self.profiles().map(|_| ())
    }

    /// Radius at every `x`; positions outside the bore take the end radii.
    pub fn radii_at(&self, xs: &[f64]) -> Result<Vec<f64>, AppError> {
        let profiles = self.profiles()?;
        let starts: Vec<f64> = profiles.iter().map(|p| p.x0).collect();
        Ok(xs
            .iter()
            .map(|&x| {
                let i = starts.partition_point(|&s| s <= x).clamp(1, profiles.len()) - 1;
                profiles[i].radius(x)
            })
            .collect())
    }

    pub fn radius_at(&self, x: f64) -> Result<f64, AppError> {
        Ok(self.radii_at(&[x])?[0])
    }

    /// `n` evenly spaced `(x, r)` samples over the whole bore.
    pub fn sample(&self, n: usize) -> Result<(Vec<f64>, Vec<f64>), AppError> {
        let xs = linspace(self.x_start(), self.x_end(), n);
        let rs = self.radii_at(&xs)?;
        Ok((xs, rs))
    }

    /// Cut every segment into cylinders no longer than `max_length`, each with
    /// the radius of the profile at its middle.
    pub fn slices(&self, max_length: f64) -> Result<Vec<Slice>, AppError> {
        if !(max_length > 0.0) {
            return Err(AppError::config(format!("Slice length must be > 0, got {max_length}.")));
        }
        let mut out = Vec::new();
        for profile in self.profiles()? {
            let n = (profile.length() / max_length).ceil().max(1.0) as usize;
            let dx = profile.length() / n as f64;
            for i in 0..n {
                let mid = profile.x0 + (i as f64 + 0.5) * dx;
                out.push(Slice {
                    length: dx,
                    radius: profile.radius(mid),
                });
            }
        }
        Ok(out)
    }

    /// Distinct parameter ids referenced by nodes and shapes.
    pub fn referenced_params(&self) -> Vec<ParamId> {
        let mut ids = Vec::new();
        for n in &self.nodes {
            ids.extend(n.x.param_id());
            ids.extend(n.r.param_id());
        }
        for shape in &self.shapes {
            match shape {
                Shape::Bessel { alpha } => ids.extend(alpha.param_id()),
                Shape::Spline { knots } => {
                    for k in knots {
                        ids.extend(k.x.param_id());
                        ids.extend(k.r.param_id());
                    }
                }
                Shape::Linear | Shape::Exponential => {}
            }
        }
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParamKind;
    use crate::geometry::shape::Knot;

    fn trumpet_like() -> BoreGeometry {
        let mut params = OptimParams::new();
        let mid = params.add("node1_pos", 0.8, ParamKind::Position, "part0").unwrap();
        let alpha = params.add("bore1_alpha", 0.7, ParamKind::Shape, "part1").unwrap();
        let nodes = vec![
            Node::fixed(0.0, 0.0084),
            Node {
                x: Value::Param(mid),
                r: Value::Fixed(0.0058),
            },
            Node::fixed(1.35, 0.061),
        ];
        let shapes = vec![
            Shape::Linear,
            Shape::Bessel {
                alpha: Value::Param(alpha),
            },
        ];
        BoreGeometry::new(nodes, shapes, params).unwrap()
    }

    #[test]
    fn radius_is_continuous_at_nodes_and_clamped_outside() {
        let g = trumpet_like();
        let eps = 1e-9;
        let left = g.radius_at(0.8 - eps).unwrap();
        let right = g.radius_at(0.8 + eps).unwrap();
        assert!((left - right).abs() < 1e-6);
        assert_eq!(g.radius_at(-1.0).unwrap(), 0.0084);
        assert!((g.radius_at(5.0).unwrap() - 0.061).abs() < 1e-12);
    }

    #[test]
    fn moving_a_position_parameter_moves_the_node() {
        let mut g = trumpet_like();
        let id = g.params().id_of("node1_pos").unwrap();
        g.params_mut().set_value(id, 0.9).unwrap();
        assert_eq!(g.node_values()[1].0, 0.9);
        assert!((g.radius_at(0.9).unwrap() - 0.0058).abs() < 1e-12);
    }

    #[test]
    fn feasibility_catches_crossed_nodes_and_bad_flare() {
        let mut g = trumpet_like();
        g.check_feasible(1e-4).unwrap();

        let pos = g.params().id_of("node1_pos").unwrap();
        g.params_mut().set_value(pos, 1.5).unwrap();
        assert!(g.check_feasible(1e-4).is_err());
        g.params_mut().set_value(pos, 0.8).unwrap();

        let alpha = g.params().id_of("bore1_alpha").unwrap();
        g.params_mut().set_value(alpha, -0.2).unwrap();
        assert!(g.check_feasible(1e-4).is_err());
    }

    #[test]
    fn slices_cover_the_bore() {
        let g = trumpet_like();
        let slices = g.slices(2e-3).unwrap();
        let total: f64 = slices.iter().map(|s| s.length).sum();
        assert!((total - 1.35).abs() < 1e-12);
        assert!(slices.iter().all(|s| s.length <= 2e-3 + 1e-15 && s.radius > 0.0));
    }

    #[test]
    fn rejects_mismatched_counts_and_unknown_params() {
        assert!(BoreGeometry::new(vec![Node::fixed(0.0, 0.01)], vec![], OptimParams::new()).is_err());
        let nodes = vec![Node::fixed(0.0, 0.01), Node::fixed(1.0, 0.02)];
        let shapes = vec![Shape::Spline {
            knots: vec![Knot {
                x: Value::Param(3),
                r: Value::Fixed(0.01),
            }],
        }];
        assert!(BoreGeometry::new(nodes, shapes, OptimParams::new()).is_err());
    }

    #[test]
    fn polyline_from_points() {
        let g = BoreGeometry::from_points(&[(0.0, 0.01), (0.5, 0.01), (1.0, 0.03)]).unwrap();
        assert_eq!(g.segment_count(), 2);
        assert!((g.radius_at(0.75).unwrap() - 0.02).abs() < 1e-12);
        assert_eq!(g.referenced_params(), Vec::<ParamId>::new());
    }
}
