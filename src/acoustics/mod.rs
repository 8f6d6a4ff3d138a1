//! Acoustic simulation of a bore.
//!
//! - `air`, `physics`: air properties, wall losses and radiation
//! - `frequential`: input impedance and flow transfer on a frequency grid
//! - `peaks`: resonance extraction from impedance curves
//! - `player`, `temporal`: lip excitation and time-domain synthesis

pub mod air;
pub mod frequential;
pub mod peaks;
pub mod physics;
pub mod player;
pub mod temporal;

pub use air::AirProperties;
pub use frequential::{DEFAULT_MAX_SLICE_LENGTH, FrequencySolver, TransferMatrixSolver};
pub use peaks::{PeakOptions, find_resonances};
pub use physics::{InstrumentPhysics, LossModel, Radiation, omega};
pub use player::{Adsr, LipDirection, LipModel};
pub use temporal::{TemporalOptions, TemporalSolver};
