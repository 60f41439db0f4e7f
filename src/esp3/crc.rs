//! CRC-8 used for both ESP3 checksums.
//!
//! Polynomial 0x07, initial value 0x00, no reflection and no final XOR. This
//! is the parameter set the `crc` crate ships as `CRC_8_SMBUS`.

use crc::{Crc, CRC_8_SMBUS};

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Checksum over `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    CRC8.checksum(bytes)
}

/// Checksum over two slices as if they were concatenated (data ‖ optional data).
pub fn checksum2(first: &[u8], second: &[u8]) -> u8 {
    let mut digest = CRC8.digest();
    digest.update(first);
    digest.update(second);
    digest.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(checksum(&[]), 0x00);
    }

    #[test]
    fn known_header_checksums() {
        // CO_RD_VERSION: 55 00 01 00 05 70 03 09
        assert_eq!(checksum(&[0x00, 0x01, 0x00, 0x05]), 0x70);
        assert_eq!(checksum(&[0x03]), 0x09);
        // RET_OK response: 55 00 01 00 02 65 00 00
        assert_eq!(checksum(&[0x00, 0x01, 0x00, 0x02]), 0x65);
        assert_eq!(checksum(&[0x00]), 0x00);
    }

    #[test]
    fn split_digest_matches_concatenation() {
        let data = [0xF6, 0x50, 0x00, 0x29, 0x89, 0x79, 0x30];
        let opt = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x37, 0x00];
        let mut joined = data.to_vec();
        joined.extend_from_slice(&opt);
        assert_eq!(checksum2(&data, &opt), checksum(&joined));
    }

    #[test]
    fn single_bit_flip_changes_checksum() {
        let header = [0x00, 0x0A, 0x07, 0x01];
        let base = checksum(&header);
        for byte in 0..header.len() {
            for bit in 0..8 {
                let mut flipped = header;
                flipped[byte] ^= 1 << bit;
                assert_ne!(checksum(&flipped), base, "byte {byte} bit {bit}");
            }
        }
    }

    #[test]
    fn single_bit_flip_in_payload_changes_checksum() {
        let data = [0xF6, 0x30, 0x00, 0x2E, 0xE1, 0xBD, 0x30];
        let opt = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x4A, 0x00];
        let base = checksum2(&data, &opt);
        assert_eq!(base, 0x6F);
        for byte in 0..data.len() + opt.len() {
            for bit in 0..8 {
                let (mut d, mut o) = (data, opt);
                if byte < d.len() {
                    d[byte] ^= 1 << bit;
                } else {
                    o[byte - d.len()] ^= 1 << bit;
                }
                assert_ne!(checksum2(&d, &o), base, "byte {byte} bit {bit}");
            }
        }
    }
}
