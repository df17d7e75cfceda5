//! # Zero-Run Coding
//!
//! Run-length transform for the zero bytes that dominate this protocol's
//! message bodies. A `0x00` in the coded stream is always followed by one
//! count byte `n` (1-255) meaning "emit `n` zeros"; every other byte passes
//! through literally. Runs longer than 255 split into multiple groups.
//!
//! ## Security
//! - Expansion is bounded by an explicit output limit (prevents
//!   decompression bombs from hostile peers)
//! - A trailing `0x00` with no count byte, or a count byte of zero, is
//!   rejected as corrupt

use crate::error::{constants, Result, WireError};

/// Zero-run code `data`.
///
/// The output is valid regardless of whether it is smaller than the input;
/// use [`maybe_compress`] at the encode seam to apply the transform only
/// when it pays.
pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        if data[i] == 0x00 {
            let mut run = 1;
            while i + run < data.len() && data[i + run] == 0x00 {
                run += 1;
            }
            i += run;

            while run > 0 {
                let group = run.min(255);
                out.push(0x00);
                out.push(group as u8);
                run -= group;
            }
        } else {
            out.push(data[i]);
            i += 1;
        }
    }

    out
}

/// Expand zero-run coded `data`, refusing to produce more than
/// `max_output_len` bytes.
///
/// # Errors
/// Returns `WireError::CorruptPacket` if:
/// - Expansion would exceed `max_output_len`
/// - A `0x00` appears as the final byte with no following count byte
/// - A count byte is zero
pub fn expand(data: &[u8], max_output_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len().min(max_output_len));
    let mut i = 0;

    while i < data.len() {
        if data[i] == 0x00 {
            let Some(&count) = data.get(i + 1) else {
                return Err(WireError::CorruptPacket(
                    constants::ERR_UNTERMINATED_ZERO.into(),
                ));
            };
            if count == 0 {
                return Err(WireError::CorruptPacket(constants::ERR_ZERO_COUNT.into()));
            }
            if out.len() + count as usize > max_output_len {
                return Err(WireError::CorruptPacket(
                    constants::ERR_ZERO_EXPAND_OVERFLOW.into(),
                ));
            }
            out.resize(out.len() + count as usize, 0x00);
            i += 2;
        } else {
            if out.len() >= max_output_len {
                return Err(WireError::CorruptPacket(
                    constants::ERR_ZERO_EXPAND_OVERFLOW.into(),
                ));
            }
            out.push(data[i]);
            i += 1;
        }
    }

    Ok(out)
}

/// Zero-run code `data` if that yields a strictly smaller result, otherwise
/// return it unchanged.
///
/// Returns the output bytes and a flag indicating whether coding was
/// applied; the flag travels in the packet header so the decoder and the
/// transform never disagree.
pub fn maybe_compress(data: &[u8]) -> (Vec<u8>, bool) {
    let compressed = compress(data);
    if compressed.len() < data.len() {
        (compressed, true)
    } else {
        (data.to_vec(), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compresses_leading_zero_run() {
        let original = [0x00, 0x00, 0x00, 0x05, 0x06];
        let compressed = compress(&original);
        assert_eq!(compressed, vec![0x00, 0x03, 0x05, 0x06]);

        let expanded = expand(&compressed, original.len()).unwrap();
        assert_eq!(expanded, original);
    }

    #[test]
    fn round_trips_edge_inputs() {
        let cases: [&[u8]; 4] = [
            &[],
            &[0x00; 64],
            &[0x41; 64],
            &[0x00, 0x01, 0x00, 0x00, 0x02, 0x00],
        ];

        for case in cases {
            let compressed = compress(case);
            let expanded = expand(&compressed, case.len()).unwrap();
            assert_eq!(expanded, case);
        }
    }

    #[test]
    fn splits_runs_longer_than_255() {
        let original = vec![0x00; 300];
        let compressed = compress(&original);
        assert_eq!(compressed, vec![0x00, 255, 0x00, 45]);
        assert_eq!(expand(&compressed, 300).unwrap(), original);
    }

    #[test]
    fn never_emits_unterminated_zero() {
        let compressed = compress(&[0x07, 0x00]);
        assert_ne!(compressed.last(), Some(&0x00));
    }

    #[test]
    fn rejects_expansion_bomb() {
        // Claims 255 zeros per 2 input bytes; cap the output far below that.
        let hostile = [0x00, 0xFF].repeat(16);
        let result = expand(&hostile, 64);
        assert!(matches!(result, Err(WireError::CorruptPacket(_))));
    }

    #[test]
    fn rejects_literal_overflow() {
        let result = expand(&[1, 2, 3, 4], 3);
        assert!(matches!(result, Err(WireError::CorruptPacket(_))));
    }

    #[test]
    fn rejects_trailing_zero_without_count() {
        let result = expand(&[0x05, 0x00], 16);
        assert!(matches!(result, Err(WireError::CorruptPacket(_))));
    }

    #[test]
    fn rejects_zero_count_byte() {
        let result = expand(&[0x00, 0x00, 0x01], 16);
        assert!(matches!(result, Err(WireError::CorruptPacket(_))));
    }

    #[test]
    fn maybe_compress_skips_incompressible_data() {
        let data: Vec<u8> = (1..=64).collect();
        let (out, coded) = maybe_compress(&data);
        assert!(!coded);
        assert_eq!(out, data);
    }

    #[test]
    fn maybe_compress_applies_when_smaller() {
        let data = vec![0x00; 128];
        let (out, coded) = maybe_compress(&data);
        assert!(coded);
        assert!(out.len() < data.len());
        assert_eq!(expand(&out, data.len()).unwrap(), data);
    }
}
