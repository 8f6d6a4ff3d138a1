//! Audio output and analysis of synthesized sounds.
//!
//! - `export`: mono WAV writing and reading (`hound`)
//! - `pitch`: NSDF / MPM pitch tracking
//! - `spectrogram`: Hann windowed short-time power spectrum

pub mod export;
pub mod pitch;
pub mod spectrogram;

pub use export::{export_mono, read_mono};
pub use pitch::{PitchFrame, PitchOptions, mean_pitch, track_pitch};
pub use spectrogram::{Spectrogram, SpectrogramOptions, spectrogram};
