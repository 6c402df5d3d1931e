//! Error types for the AAMP crate.

use thiserror::Error;

/// Errors that can occur when working with parameter archives.
#[derive(Debug, Error)]
pub enum Error {
    /// The input data is malformed.
    #[error("invalid data: {0}")]
    InvalidData(&'static str),

    /// A typed getter was called on a parameter of the wrong kind.
    #[error("type error: {0}")]
    TypeError(String),

    /// The data is well-formed but uses a feature this codec does not
    /// implement (version 1 archives, big-endian archives).
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] veles_common::Error),
}

/// Result type for AAMP operations.
pub type Result<T> = std::result::Result<T, Error>;
