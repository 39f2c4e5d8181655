//! Hashing helpers
//!
//! FNV-1a signatures key the substitute-response cache; CRC32 guards rule
//! snapshots against truncation and hand edits.

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit signature of a blocked request shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(pub u64);

impl Signature {
    /// Hash a sequence of parts. Parts are separated by a 0xff byte, which
    /// cannot appear in UTF-8, so ("ab", "c") and ("a", "bc") differ.
    pub fn of(parts: &[&str]) -> Self {
        let mut h = FNV_OFFSET;
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                h = fnv_step(h, 0xff);
            }
            for &b in part.as_bytes() {
                h = fnv_step(h, b.to_ascii_lowercase());
            }
        }
        Self(h)
    }
}

#[inline]
fn fnv_step(h: u64, byte: u8) -> u64 {
    (h ^ byte as u64).wrapping_mul(FNV_PRIME)
}

/// CRC32 (IEEE 802.3, reflected polynomial).
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xffff_ffff_u32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xedb8_8320 & mask);
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_case_insensitive() {
        assert_eq!(Signature::of(&["script", "Ads.Example.com"]), Signature::of(&["script", "ads.example.com"]));
    }

    #[test]
    fn signature_separates_parts() {
        assert_ne!(Signature::of(&["ab", "c"]), Signature::of(&["a", "bc"]));
    }

    #[test]
    fn crc32_known_vector() {
        assert_eq!(crc32(b"123456789"), 0xcbf4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn crc32_detects_changes() {
        assert_ne!(crc32(&[1u8, 2, 3]), crc32(&[1u8, 2, 4]));
    }
}
