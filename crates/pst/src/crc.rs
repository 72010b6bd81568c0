//! ## CRC32
//!
//! Standard IEEE CRC-32 used to protect the file header.

/// Compute the CRC over `data`.
pub fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_crc() {
        assert_eq!(compute_crc(&[]), 0x00000000);
    }

    #[test]
    fn test_known_crc() {
        assert_eq!(compute_crc(b"hello"), 0x3610A686);
        assert_eq!(compute_crc(b"123456789"), 0xCBF43926);
    }
}
