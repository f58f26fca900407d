//! Error types for the rewriting engine.

use thiserror::Error;

/// Errors that can occur while rewriting a G-code file.
#[derive(Error, Debug)]
pub enum SmoothError {
    /// A required slicer header field was not found in the file.
    #[error("header field `{0}` not found in G-code")]
    HeaderFieldMissing(&'static str),

    /// The requested outer layer height is not positive.
    #[error("outer layer height ({0}mm) must be greater than 0")]
    InvalidTargetHeight(f64),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for rewriting operations.
pub type Result<T> = std::result::Result<T, SmoothError>;
