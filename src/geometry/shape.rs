//! Segment shape families.
//!
//! A segment joins two nodes `(x0, r0)` and `(x1, r1)`; its shape decides the
//! radius in between:
//!
//! - `Linear`: conical frustum, `r = r0 + (r1 − r0)·u`
//! - `Exponential`: `r = r0·(r1/r0)^u`
//! - `Bessel`: horn `r = r0·((xb − x0)/(xb − x))^α`, with the virtual apex `xb`
//!   chosen so the curve passes through both end nodes
//! - `Spline`: natural cubic spline through the end nodes and interior knots
//!
//! where `u = (x − x0)/(x1 − x0)`.

use std::fmt;
use std::str::FromStr;

use crate::error::AppError;
use crate::geometry::params::{OptimParams, Value};
use crate::math::NaturalSpline;

/// Shape keyword without its coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Linear,
    Exponential,
    Bessel,
    Spline,
}

impl ShapeKind {
    pub fn keyword(self) -> &'static str {
        match self {
            ShapeKind::Linear => "linear",
            ShapeKind::Exponential => "exponential",
            ShapeKind::Bessel => "bessel",
            ShapeKind::Spline => "spline",
        }
    }
}

impl FromStr for ShapeKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" | "cone" => Ok(ShapeKind::Linear),
            "exponential" | "exp" => Ok(ShapeKind::Exponential),
            "bessel" => Ok(ShapeKind::Bessel),
            "spline" => Ok(ShapeKind::Spline),
            other => Err(AppError::config(format!("Unknown shape '{other}'."))),
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Interior spline knot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Knot {
    pub x: Value,
    pub r: Value,
}

/// Shape of a segment together with its coefficients.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Linear,
    Exponential,
    Bessel { alpha: Value },
    Spline { knots: Vec<Knot> },
}

impl Shape {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Linear => ShapeKind::Linear,
            Shape::Exponential => ShapeKind::Exponential,
            Shape::Bessel { .. } => ShapeKind::Bessel,
            Shape::Spline { .. } => ShapeKind::Spline,
        }
    }

    /// Resolve parameter references into a numeric profile between two nodes.
    ///
    /// Fails when the coefficients are outside the shape's domain (non-positive
    /// flare, knots outside the segment or out of order, non-positive radii for
    /// exponential/Bessel shapes).
    pub fn resolve(
        &self,
        (x0, r0): (f64, f64),
        (x1, r1): (f64, f64),
        params: &OptimParams,
    ) -> Result<SegmentProfile, AppError> {
        if !(x1 > x0) {
            return Err(AppError::config(format!("Segment has non-positive length: [{x0}, {x1}].")));
        }
        let curve = match self {
            Shape::Linear => Curve::Linear,
            Shape::Exponential => {
                if !(r0 > 0.0 && r1 > 0.0) {
                    return Err(AppError::config("Exponential segment needs positive end radii."));
                }
                Curve::Exponential {
                    log_ratio: (r1 / r0).ln(),
                }
            }
            Shape::Bessel { alpha } => {
                let alpha = alpha.get(params);
                if !(alpha > 0.0 && alpha.is_finite()) {
                    return Err(AppError::config(format!("Bessel flare coefficient must be > 0, got {alpha}.")));
                }
                if !(r0 > 0.0 && r1 > 0.0) {
                    return Err(AppError::config("Bessel segment needs positive end radii."));
                }
                let q = (r1 / r0).powf(1.0 / alpha);
                if (1.0 - q).abs() < 1e-12 {
                    Curve::Linear
                } else {
                    Curve::Bessel {
                        apex: (x0 - q * x1) / (1.0 - q),
                        alpha,
                    }
                }
            }
            Shape::Spline { knots } => {
                let mut xs = Vec::with_capacity(knots.len() + 2);
                let mut rs = Vec::with_capacity(knots.len() + 2);
                xs.push(x0);
                rs.push(r0);
                for k in knots {
                    xs.push(k.x.get(params));
                    rs.push(k.r.get(params));
                }
                xs.push(x1);
                rs.push(r1);
                let spline = NaturalSpline::new(xs, rs).ok_or_else(|| {
                    AppError::config(format!(
                        "Spline knots must lie strictly inside [{x0}, {x1}] in increasing order."
                    ))
                })?;
                Curve::Spline(spline)
            }
        };
        Ok(SegmentProfile { x0, x1, r0, r1, curve })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Curve {
    Linear,
    Exponential { log_ratio: f64 },
    Bessel { apex: f64, alpha: f64 },
    Spline(NaturalSpline),
}

/// Numeric radius profile of one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentProfile {
    pub x0: f64,
    pub x1: f64,
    pub r0: f64,
    pub r1: f64,
    curve: Curve,
}

impl SegmentProfile {
    /// Radius at `x`, clamped to the segment.
    pub fn radius(&self, x: f64) -> f64 {
        let x = x.clamp(self.x0, self.x1);
        let u = (x - self.x0) / (self.x1 - self.x0);
        match &self.curve {
            Curve::Linear => self.r0 + (self.r1 - self.r0) * u,
            Curve::Exponential { log_ratio } => self.r0 * (log_ratio * u).exp(),
            Curve::Bessel { apex, alpha } => self.r0 * ((apex - self.x0) / (apex - x)).powf(*alpha),
            Curve::Spline(spline) => spline.eval(x),
        }
    }

    pub fn length(&self) -> f64 {
        self.x1 - self.x0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_params() -> OptimParams {
        OptimParams::new()
    }

    #[test]
    fn every_shape_hits_both_end_nodes() {
        let params = no_params();
        let shapes = [
            Shape::Linear,
            Shape::Exponential,
            Shape::Bessel {
                alpha: Value::Fixed(0.8),
            },
            Shape::Spline {
                knots: vec![Knot {
                    x: Value::Fixed(0.4),
                    r: Value::Fixed(0.02),
                }],
            },
        ];
        for shape in &shapes {
            let p = shape.resolve((0.1, 0.01), (0.6, 0.05), &params).unwrap();
            assert!((p.radius(0.1) - 0.01).abs() < 1e-12, "{:?} start", shape.kind());
            assert!((p.radius(0.6) - 0.05).abs() < 1e-12, "{:?} end", shape.kind());
        }
    }

    #[test]
    fn bessel_horn_flares_faster_than_cone_near_the_bell() {
        let params = no_params();
        let horn = Shape::Bessel {
            alpha: Value::Fixed(0.7),
        }
        .resolve((0.0, 0.005), (0.5, 0.06), &params)
        .unwrap();
        let cone = Shape::Linear.resolve((0.0, 0.005), (0.5, 0.06), &params).unwrap();
        assert!(horn.radius(0.25) < cone.radius(0.25));
        assert!(horn.radius(0.49) > 0.04);
    }

    #[test]
    fn exponential_is_geometric_at_midpoint() {
        let p = Shape::Exponential.resolve((0.0, 0.01), (1.0, 0.04), &no_params()).unwrap();
        assert!((p.radius(0.5) - 0.02).abs() < 1e-12);
    }

    #[test]
    fn spline_knot_outside_segment_is_rejected() {
        let shape = Shape::Spline {
            knots: vec![Knot {
                x: Value::Fixed(1.5),
                r: Value::Fixed(0.02),
            }],
        };
        assert!(shape.resolve((0.0, 0.01), (1.0, 0.02), &no_params()).is_err());
    }

    #[test]
    fn shape_keywords_parse() {
        assert_eq!("cone".parse::<ShapeKind>().unwrap(), ShapeKind::Linear);
        assert_eq!("Bessel".parse::<ShapeKind>().unwrap(), ShapeKind::Bessel);
        assert!("circle".parse::<ShapeKind>().is_err());
    }
}
