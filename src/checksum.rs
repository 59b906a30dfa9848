//! Rolling CRC-32 and Adler-32 checksums
//!
//! Both functions follow the zlib seed convention: feed the previous return
//! value back in to continue a checksum across split buffers. `0` starts a
//! CRC-32, `1` starts an Adler-32.

use simd_adler32::Adler32;

/// Update a CRC-32 (as used by ZIP and gzip) with `bytes`.
///
/// Pass `0` as the seed to start a new checksum. Splitting the input at any
/// point and chaining the calls yields the same value as a single call.
pub fn crc32(crc: u32, bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(crc);
    hasher.update(bytes);
    hasher.finalize()
}

/// Update an Adler-32 (as used by zlib framing) with `bytes`.
///
/// Pass `1` as the seed to start a new checksum.
pub fn adler32(adler: u32, bytes: &[u8]) -> u32 {
    let mut hasher = Adler32::from_checksum(adler);
    hasher.write(bytes);
    hasher.finish()
}

/// Starting value for [`crc32`].
pub const CRC32_INIT: u32 = 0;

/// Starting value for [`adler32`].
pub const ADLER32_INIT: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_known_values() {
        assert_eq!(crc32(CRC32_INIT, b""), 0);
        // "123456789" is the standard CRC-32 check vector.
        assert_eq!(crc32(CRC32_INIT, b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(CRC32_INIT, b"hello"), 0x3610_A686);
    }

    #[test]
    fn adler32_known_values() {
        assert_eq!(adler32(ADLER32_INIT, b""), 1);
        assert_eq!(adler32(ADLER32_INIT, b"Hello"), 0x058C_01F5);
        assert_eq!(adler32(ADLER32_INIT, b"Wikipedia"), 0x11E6_0398);
    }

    #[test]
    fn rolling_update_matches_one_shot() {
        let data: Vec<u8> = (0u32..4096).map(|i| (i * 31 % 251) as u8).collect();
        let whole_crc = crc32(CRC32_INIT, &data);
        let whole_adler = adler32(ADLER32_INIT, &data);
        for split in [0, 1, 7, 255, 2048, 4095, 4096] {
            let (a, b) = data.split_at(split);
            assert_eq!(crc32(crc32(CRC32_INIT, a), b), whole_crc);
            assert_eq!(adler32(adler32(ADLER32_INIT, a), b), whole_adler);
        }
    }

    #[test]
    fn adler32_matches_reference_formula() {
        let data: Vec<u8> = (0u32..7000).map(|i| (i % 256) as u8).collect();
        let (mut s1, mut s2) = (1u64, 0u64);
        for &b in &data {
            s1 = (s1 + u64::from(b)) % 65521;
            s2 = (s2 + s1) % 65521;
        }
        assert_eq!(adler32(ADLER32_INIT, &data), ((s2 as u32) << 16) | s1 as u32);
    }
}
