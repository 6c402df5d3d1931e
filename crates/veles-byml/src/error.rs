//! Error types for the BYML crate.

use thiserror::Error;

/// Errors that can occur when working with BYML documents.
#[derive(Debug, Error)]
pub enum Error {
    /// The input data is malformed.
    #[error("invalid data: {0}")]
    InvalidData(&'static str),

    /// A typed getter was called on a node of the wrong kind.
    #[error("type error: {0}")]
    TypeError(String),

    /// The data is well-formed but uses a feature this codec does not
    /// implement (path tables, remapped dictionaries, mono-typed arrays).
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] veles_common::Error),
}

/// Result type for BYML operations.
pub type Result<T> = std::result::Result<T, Error>;
