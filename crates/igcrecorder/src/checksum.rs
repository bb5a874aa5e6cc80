//! Checksums and run-length coding used by the recorder protocols.

use crc::{Crc, CRC_16_IBM_3740};

use crate::error::{Error, Result};

/// CRC16-CCITT with initial value `0xFFFF` and polynomial `0x1021`.
const CCITT: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Seed of the per-record fix checksum.
const FIX_CHECKSUM_SEED: u8 = 0x55;

/// Frame checksum of the binary recorder protocol.
///
/// `0xFFFF` is reserved by the recorders for erased flash, so a checksum
/// that happens to produce it is transmitted as `0xAAAA`.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    match CCITT.checksum(data) {
        0xFFFF => 0xAAAA,
        crc => crc,
    }
}

/// XOR checksum of an NMEA sentence body (between `$` and `*`).
#[must_use]
pub fn nmea_checksum(body: &[u8]) -> u8 {
    body.iter().fold(0, |acc, b| acc ^ b)
}

/// Checksum byte protecting a single stored fix record.
#[must_use]
pub fn fix_checksum(record: &[u8]) -> u8 {
    record.iter().fold(FIX_CHECKSUM_SEED, |acc, b| acc ^ b)
}

/// Check if `byte` starts a run in the RLE scheme.
fn is_run_byte(byte: u8) -> bool {
    byte == 0x00 || byte == 0xFF
}

/// Expand RLE data into exactly `expected_len` bytes.
///
/// Bytes are copied verbatim, except that `0x00` and `0xFF` are followed by
/// a count `N` meaning "repeat the previous byte `N` more times".
///
/// # Errors
///
/// Returns [`Error::Decompress`] if the input decodes to more or fewer bytes
/// than `expected_len`, or ends in the middle of a run.
pub fn rle_decompress(src: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_len);
    let mut bytes = src.iter().copied();

    while let Some(byte) = bytes.next() {
        out.push(byte);
        if is_run_byte(byte) {
            let Some(count) = bytes.next() else {
                return Err(Error::protocol("run-length data ends inside a run"));
            };
            out.extend(std::iter::repeat(byte).take(usize::from(count)));
        }
        if out.len() > expected_len {
            return Err(Error::Decompress {
                expected: expected_len,
                actual: out.len(),
            });
        }
    }

    if out.len() != expected_len {
        return Err(Error::Decompress {
            expected: expected_len,
            actual: out.len(),
        });
    }
    Ok(out)
}

/// Compress data with the same scheme [`rle_decompress`] understands.
#[must_use]
pub fn rle_compress(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len());
    let mut i = 0;

    while i < src.len() {
        let byte = src[i];
        if is_run_byte(byte) {
            let run = src[i..]
                .iter()
                .take(256)
                .take_while(|&&b| b == byte)
                .count();
            out.push(byte);
            // run is 1..=256, so the count fits in a byte
            out.push(u8::try_from(run - 1).unwrap_or(u8::MAX));
            i += run;
        } else {
            out.push(byte);
            i += 1;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_check_value() {
        // CCITT-FALSE check value for "123456789"
        assert_eq!(crc16(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_crc16_empty_is_remapped() {
        // The empty input leaves the register at its 0xFFFF initial value.
        assert_eq!(crc16(&[]), 0xAAAA);
    }

    #[test]
    fn test_crc16_detects_single_byte_change() {
        let data = b"EX\x01\x00\x10\x00".to_vec();
        let crc = crc16(&data);
        for i in 0..data.len() {
            let mut corrupted = data.clone();
            corrupted[i] ^= 0x01;
            assert_ne!(crc16(&corrupted), crc, "corruption at {i} not detected");
        }
    }

    #[test]
    fn test_nmea_checksum() {
        // $GPGLL,5300.97914,N,00259.98174,E,125926,A*28
        assert_eq!(nmea_checksum(b"GPGLL,5300.97914,N,00259.98174,E,125926,A"), 0x28);
    }

    #[test]
    fn test_fix_checksum_seeded() {
        assert_eq!(fix_checksum(&[]), 0x55);
        assert_eq!(fix_checksum(&[0x55]), 0x00);
    }

    #[test]
    fn test_rle_decompress_runs() {
        let src = [0x01, 0x00, 0x03, 0x02, 0xFF, 0x00];
        let out = rle_decompress(&src, 7).unwrap();
        assert_eq!(out, vec![0x01, 0x00, 0x00, 0x00, 0x00, 0x02, 0xFF]);
    }

    #[test]
    fn test_rle_decompress_wrong_size_fails() {
        let src = [0x00, 0x09];
        assert!(matches!(
            rle_decompress(&src, 8),
            Err(Error::Decompress {
                expected: 8,
                actual: 10
            })
        ));
        assert!(matches!(
            rle_decompress(&src, 12),
            Err(Error::Decompress {
                expected: 12,
                actual: 10
            })
        ));
    }

    #[test]
    fn test_rle_decompress_truncated_run() {
        assert!(rle_decompress(&[0x05, 0xFF], 2).is_err());
    }

    #[test]
    fn test_rle_round_trip() {
        let mut data = vec![0u8; 700];
        data.extend_from_slice(&[1, 2, 3, 0xFF, 0xFF, 4, 0]);
        data.extend(std::iter::repeat(0xFF).take(300));
        data.extend((0u8..=255).cycle().take(600));

        let packed = rle_compress(&data);
        assert!(packed.len() < data.len());
        assert_eq!(rle_decompress(&packed, data.len()).unwrap(), data);
    }

    #[test]
    fn test_rle_round_trip_without_runs() {
        let data = b"no zero bytes here".to_vec();
        assert_eq!(rle_compress(&data), data);
        assert_eq!(rle_decompress(&data, data.len()).unwrap(), data);
    }

    #[test]
    fn test_rle_round_trip_into_wrong_size_fails() {
        let data = vec![0u8; 64];
        let packed = rle_compress(&data);
        assert!(rle_decompress(&packed, 63).is_err());
        assert!(rle_decompress(&packed, 65).is_err());
    }
}
