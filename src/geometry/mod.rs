//! Bore geometry model.
//!
//! - `params`: the optimization parameter registry and fixed/parametric values
//! - `shape`: segment shape families (cone, exponential, Bessel, spline)
//! - `bore`: the piecewise bore built from nodes and shapes
//! - `proto`: parametric starting designs for simplification

pub mod bore;
pub mod params;
pub mod proto;
pub mod shape;

pub use bore::{BoreGeometry, Node, Slice};
pub use params::{OptimParams, Param, ParamId, Value};
pub use proto::{ProtoDesign, ProtoShape};
pub use shape::{Knot, SegmentProfile, Shape, ShapeKind};
