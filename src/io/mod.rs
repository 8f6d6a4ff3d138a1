//! Input/output helpers.
//!
//! - bore geometry text files (`geometry_file`)
//! - impedance text files (`impedance_file`)
//! - keyed on-disk cache of computed results (`cache`)

pub mod cache;
pub mod geometry_file;
pub mod impedance_file;

pub use cache::*;
pub use geometry_file::*;
pub use impedance_file::*;
