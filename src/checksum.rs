//! CRC-32 shared by both wire protocols
//!
//! The vehicle firmware uses the table-driven IEEE 802.3 CRC (reflected,
//! polynomial 0xEDB88320, init and xorout 0xFFFFFFFF). This is the same
//! variant zlib exposes as `crc32`, catalogued as `CRC_32_ISO_HDLC`.
//! Command packets and resource telemetry are both checked with it, so it
//! must stay bit-for-bit identical to the firmware implementation.

use crc::{Crc, CRC_32_ISO_HDLC};

/// Process-wide CRC engine. The lookup table is built at compile time.
pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Width of the trailing checksum field in every packet that carries one
pub const CRC_LEN: usize = 4;

/// Computes the checksum over `data`
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// Splits a packet into its body and the big-endian trailing checksum,
/// returning `(computed, received)`.
///
/// Returns `None` for buffers too short to hold a checksum.
pub fn verify_trailing_be(packet: &[u8]) -> Option<(u32, u32)> {
    if packet.len() < CRC_LEN {
        return None;
    }
    let (body, tail) = packet.split_at(packet.len() - CRC_LEN);
    let received = u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]);
    Some((crc32(body), received))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value_matches_ieee() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn test_verify_trailing_checksum() {
        let mut packet = b"123456789".to_vec();
        packet.extend_from_slice(&0xCBF4_3926u32.to_be_bytes());
        let (computed, received) = verify_trailing_be(&packet).unwrap();
        assert_eq!(computed, received);

        assert!(verify_trailing_be(&[1, 2, 3]).is_none());
    }
}
