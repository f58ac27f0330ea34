//! Error types for recognition operations
//!
//! "Nothing found" is never an error here: detection misses are typed
//! outcomes carrying the best confidence observed (see
//! [`crate::session::Detection`]). The variants below cover the cases
//! where an operation could not run at all.

use thiserror::Error;

/// Result type for recognition operations
pub type Result<T> = std::result::Result<T, RecognitionError>;

/// Error type for recognition and calibration operations
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// A scan area or template had no usable dimensions after clamping
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    /// A cooperative cancellation request was honored
    #[error("operation cancelled")]
    Cancelled,

    /// The calibration store could not read or write its backing file
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl RecognitionError {
    /// Create an invalid-region error
    pub fn invalid_region(message: impl Into<String>) -> Self {
        Self::InvalidRegion(message.into())
    }

    /// Create a persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }
}

impl From<std::io::Error> for RecognitionError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for RecognitionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}
