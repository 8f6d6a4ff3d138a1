//! Figures written as SVG files (`plotters`).

pub mod figures;

pub use figures::*;
