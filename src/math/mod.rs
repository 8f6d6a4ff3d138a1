//! Mathematical utilities: interpolation, FFT helpers, linear solves and
//! nonlinear least squares.

pub mod fft;
pub mod interp;
pub mod linsolve;
pub mod lm;

pub use fft::*;
pub use interp::*;
pub use linsolve::*;
pub use lm::{LmOptions, LmOutcome, ResidualModel, StopReason, minimize};
