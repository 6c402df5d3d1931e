//! Error types for the Yaz0 crate.

use thiserror::Error;

/// Errors that can occur when decompressing Yaz0 streams.
#[derive(Debug, Error)]
pub enum Error {
    /// The input data is malformed.
    #[error("invalid data: {0}")]
    InvalidData(&'static str),

    /// The stream ended before the output buffer was filled.
    #[error("compressed stream is truncated")]
    TruncatedStream,

    /// Common library error.
    #[error("{0}")]
    Common(#[from] veles_common::Error),
}

/// Result type for Yaz0 operations.
pub type Result<T> = std::result::Result<T, Error>;
