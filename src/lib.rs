//! `brass-bore` library crate.
//!
//! The binary (`bore`) is a thin wrapper around this library so that:
//!
//! - the geometry, acoustics and fitting code is testable without spawning processes
//! - the study workflows can be driven from other programs
//! - code stays easy to navigate as the project grows

pub mod acoustics;
pub mod app;
pub mod audio;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod fit;
pub mod geometry;
pub mod io;
pub mod logging;
pub mod math;
pub mod plot;
pub mod report;
