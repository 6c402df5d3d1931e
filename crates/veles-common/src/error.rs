//! Error types for veles-common.

use thiserror::Error;

/// Common error type for Veles operations.
#[derive(Debug, Error)]
pub enum Error {
    /// End of buffer reached while reading.
    #[error("unexpected end of buffer: needed {needed} bytes but only {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    /// Invalid magic bytes encountered.
    #[error("invalid magic: expected {expected:?}, got {actual:?}")]
    InvalidMagic {
        expected: Vec<u8>,
        actual: Vec<u8>,
    },

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Missing null terminator in string.
    #[error("string missing null terminator")]
    MissingNullTerminator,

    /// An offset field points outside the buffer.
    #[error("offset {offset:#x} is out of bounds (buffer size {size:#x})")]
    OffsetOutOfBounds { offset: usize, size: usize },

    /// A value cannot be encoded in the requested on-wire representation.
    #[error("value {value:#x} is not representable as {repr}")]
    Unrepresentable { value: u64, repr: &'static str },
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
