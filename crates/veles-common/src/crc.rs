//! CRC-32 (IEEE) hashing utilities.
//!
//! The parameter archive format keys everything by the CRC-32 of the
//! original name string (polynomial 0xEDB88320, bit-reversed, initial and
//! final XOR 0xFFFFFFFF).

/// Compute the CRC-32 hash of a byte slice.
///
/// Uses hardware acceleration when available.
#[inline]
pub fn hash_bytes(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Compute the CRC-32 hash of a string.
///
/// The string is hashed as its UTF-8 bytes.
#[inline]
pub fn hash_str(s: &str) -> u32 {
    hash_bytes(s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_hash() {
        assert_eq!(hash_bytes(&[]), 0);
    }

    #[test]
    fn test_known_hashes() {
        // Reference values for names that appear in real parameter archives.
        assert_eq!(hash_str("param_root"), 0xA4F6_CB6C);
        assert_eq!(hash_str("DemoAIActionIdx"), 0xB994_C459);
        assert_eq!(hash_str("test"), 0xD87F_7E0C);
    }

    #[test]
    fn test_string_hash_matches_bytes() {
        assert_eq!(hash_str("Bool_0"), hash_bytes(b"Bool_0"));
    }
}
