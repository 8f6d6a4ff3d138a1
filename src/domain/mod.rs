//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - parameter kinds shared by geometry and optimizers (`ParamKind`)
//! - frequency-domain results (`ImpedanceCurve`, `ResonancePeak`)
//! - time-domain results (`TimeSignal`, `Recording`)

pub mod types;

pub use types::*;
