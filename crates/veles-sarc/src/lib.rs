//! SARC archive reading and writing.
//!
//! SARC is a flat, name-hashed file container used across first-party
//! titles. Entries are sorted by name hash so the runtime can binary search;
//! file data is aligned according to per-format requirements.
//!
//! ## Layout
//! ```text
//! [0x00] SARC header  (0x14 bytes)
//! [0x14] SFAT header  (0x0C bytes) + entries (FileCount x 0x10)
//! [...]  SFNT header  (0x08 bytes) + null-terminated names, 4-byte aligned
//! [...]  Data section (begins at the offset given in the SARC header)
//! ```
//!
//! # Example
//!
//! ```
//! use veles_sarc::{Endian, Sarc, SarcWriter};
//!
//! let mut writer = SarcWriter::new(Endian::Little, veles_sarc::Mode::New);
//! writer.files.insert("hello.txt".into(), b"hi".to_vec());
//! let (alignment, bytes) = writer.write().unwrap();
//! assert!(alignment >= 4);
//!
//! let sarc = Sarc::new(&bytes).unwrap();
//! assert_eq!(sarc.get_by_name("hello.txt").unwrap().data, b"hi");
//! ```

mod error;
mod parse;
mod writer;

pub use error::{Error, Result};
pub use parse::{File, Sarc};
pub use veles_common::Endian;
pub use writer::{Mode, SarcWriter};

/// Default SFAT hash multiplier.
pub const DEFAULT_HASH_MULTIPLIER: u32 = 0x65;

/// Compute the SFAT hash of a file name.
///
/// This is the polynomial accumulator `h = h * multiplier + byte`, seeded
/// with zero.
pub fn hash_name(multiplier: u32, name: &str) -> u32 {
    name.bytes()
        .fold(0u32, |h, c| h.wrapping_mul(multiplier).wrapping_add(c as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_name() {
        assert_eq!(hash_name(DEFAULT_HASH_MULTIPLIER, "a.bin"), 0x5C86_A774);
        assert_eq!(hash_name(DEFAULT_HASH_MULTIPLIER, "b.bin"), 0x62BA_7D65);
        assert_eq!(hash_name(DEFAULT_HASH_MULTIPLIER, ""), 0);
        // The multiplier is part of the hash.
        assert_ne!(hash_name(0x65, "test.txt"), hash_name(0x101, "test.txt"));
    }
}
