//! Error types for the data-loader crate.
//!
//! Rust error handling concepts demonstrated:
//! - thiserror for defining custom error types
//! - Enum variants for different error cases
//! - `#[from]` conversions so `?` works on I/O and CSV errors

use thiserror::Error;

/// Errors that can occur while loading, storing, or encoding ratings
#[derive(Error, Debug)]
pub enum DataLoadError {
    /// I/O error occurred while reading or writing a file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The overlay CSV could not be read or written
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Line in data file couldn't be parsed
    #[error("Parse error at line {line} in {file}: {reason}")]
    ParseError {
        file: String,
        line: usize,
        reason: String,
    },

    /// A data field had an invalid value
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// The identifier was not part of the codec's fitted vocabulary
    #[error("Unknown {entity} identifier {id}")]
    UnknownIdentifier { entity: &'static str, id: u32 },

    /// Data validation failed
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

impl DataLoadError {
    /// Whether the caller should treat this as a cold-start signal
    pub fn is_unknown_identifier(&self) -> bool {
        matches!(self, DataLoadError::UnknownIdentifier { .. })
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, DataLoadError>;
