//! Error types for the attention engine.
//!
//! The per-frame path never fails: degenerate inputs fall back to documented
//! defaults. Errors only surface at the edges (configuration and storage).

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration rejected by validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Calibration store could not persist a value
    #[error("Calibration store error: {0}")]
    Store(String),
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
