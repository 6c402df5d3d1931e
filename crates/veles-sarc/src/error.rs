//! Error types for the SARC crate.

use thiserror::Error;

/// Errors that can occur when working with SARC archives.
#[derive(Debug, Error)]
pub enum Error {
    /// The input data is malformed.
    #[error("invalid data: {0}")]
    InvalidData(&'static str),

    /// A requested entry index is out of range.
    #[error("file index {index} out of range ({count} files)")]
    IndexOutOfRange { index: u16, count: u16 },

    /// An alignment value is zero or not a power of two.
    #[error("invalid alignment: {0:#x}")]
    InvalidAlignment(usize),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] veles_common::Error),
}

/// Result type for SARC operations.
pub type Result<T> = std::result::Result<T, Error>;
