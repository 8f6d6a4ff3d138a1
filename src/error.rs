//! Application error type.
//!
//! Every fallible operation in the crate returns `Result<_, AppError>`. The exit
//! code travels with the message so the binary can report *what kind* of failure
//! ended the run:
//!
//! - `2`: bad input (configuration, missing/unreadable files, malformed data)
//! - `3`: numerical failure (solver breakdown, nothing left to optimize)
//! - `4`: output failure (cannot write results)

use std::path::Path;

/// Exit code for configuration and input errors.
pub const EXIT_INPUT: u8 = 2;
/// Exit code for numerical failures.
pub const EXIT_NUMERIC: u8 = 3;
/// Exit code for output failures.
pub const EXIT_OUTPUT: u8 = 4;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    /// Configuration or input data error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(EXIT_INPUT, message)
    }

    /// Numerical failure.
    pub fn numeric(message: impl Into<String>) -> Self {
        Self::new(EXIT_NUMERIC, message)
    }

    /// Failure to read an input file.
    pub fn read(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::new(EXIT_INPUT, format!("Failed to read '{}': {err}", path.display()))
    }

    /// Failure to write an output file.
    pub fn write(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::new(EXIT_OUTPUT, format!("Failed to write '{}': {err}", path.display()))
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
