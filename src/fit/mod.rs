//! Geometry optimization.
//!
//! Responsibilities:
//!
//! - fit a parametric bore to a reference bore (`adjust`)
//! - fit a bore to measured impedance values (`inverse`)

pub mod adjust;
pub mod inverse;

pub use adjust::*;
pub use inverse::*;
