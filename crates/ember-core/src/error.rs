//! Error types for the engine.

use thiserror::Error;

/// Engine-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid setting `{name}`: {reason}")]
    InvalidSetting {
        /// Name of the offending field
        name: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
