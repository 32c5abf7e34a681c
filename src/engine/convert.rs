//! Raw sample word conversion
//!
//! Converts the little-endian words of a hardware buffer into normalized,
//! interleaved `f32` I/Q. CS16 buffers carry one 16-bit word per rail with
//! the I and Q rails interleaved by the streaming core; CS8 buffers carry a
//! single rail whose 16-bit words each pack an 8-bit I and an 8-bit Q.
//! Either way the byte stream is already in `I, Q, I, Q, ...` order.

use crate::types::SampleFormat;

/// Convert 16-bit words, dividing by `scale`
///
/// Converts as many words as fit in `dst`; missing input is zero-filled.
/// Returns the number of floats taken from `src`.
pub fn convert_i16(src: &[u8], dst: &mut [f32], scale: f32) -> usize {
    let mut written = 0;
    for (out, word) in dst.iter_mut().zip(src.chunks_exact(2)) {
        *out = i16::from_le_bytes([word[0], word[1]]) as f32 / scale;
        written += 1;
    }
    dst[written..].fill(0.0);
    written
}

/// Convert 8-bit words, dividing by `scale`
///
/// Converts as many bytes as fit in `dst`; missing input is zero-filled.
/// Returns the number of floats taken from `src`.
pub fn convert_i8(src: &[u8], dst: &mut [f32], scale: f32) -> usize {
    let mut written = 0;
    for (out, &byte) in dst.iter_mut().zip(src.iter()) {
        *out = byte as i8 as f32 / scale;
        written += 1;
    }
    dst[written..].fill(0.0);
    written
}

/// Convert a raw buffer into `dst` (interleaved I/Q, two floats per sample)
pub fn convert_block(format: SampleFormat, src: &[u8], dst: &mut [f32]) -> usize {
    match format {
        SampleFormat::Cs16 => convert_i16(src, dst, format.scale()),
        SampleFormat::Cs8 => convert_i8(src, dst, format.scale()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn words(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_cs16_known_pattern() {
        let raw = words(&[2048, -2048, 1024, -512, 0, 2047]);
        let mut out = [0.0f32; 6];
        assert_eq!(convert_block(SampleFormat::Cs16, &raw, &mut out), 6);

        let expected = [1.0, -1.0, 0.5, -0.25, 0.0, 2047.0 / 2048.0];
        for (got, want) in out.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "{} != {}", got, want);
        }
    }

    #[test]
    fn test_cs8_known_pattern() {
        let raw: Vec<u8> = [127i8, -128, 64, -64, 0, 1]
            .iter()
            .map(|&v| v as u8)
            .collect();
        let mut out = [0.0f32; 6];
        assert_eq!(convert_block(SampleFormat::Cs8, &raw, &mut out), 6);

        let expected = [127.0 / 128.0, -1.0, 0.5, -0.5, 0.0, 1.0 / 128.0];
        for (got, want) in out.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "{} != {}", got, want);
        }
    }

    #[test]
    fn test_short_input_is_zero_filled() {
        let raw = words(&[1024, 1024]);
        let mut out = [9.0f32; 4];
        assert_eq!(convert_i16(&raw, &mut out, 2048.0), 2);
        assert_eq!(out, [0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_long_input_is_truncated() {
        let raw = words(&[1024; 8]);
        let mut out = [0.0f32; 2];
        assert_eq!(convert_i16(&raw, &mut out, 2048.0), 2);
    }

    proptest! {
        #[test]
        fn test_cs16_stays_within_range(values in prop::collection::vec(-2048i16..=2047, 0..64)) {
            let raw = words(&values);
            let mut out = vec![0.0f32; values.len()];
            convert_i16(&raw, &mut out, 2048.0);
            for (v, f) in values.iter().zip(out.iter()) {
                prop_assert!(*f >= -1.0 && *f < 1.0);
                prop_assert!((*f * 2048.0 - *v as f32).abs() < 1e-3);
            }
        }

        #[test]
        fn test_cs8_never_exceeds_unit_range(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let mut out = vec![0.0f32; bytes.len()];
            convert_i8(&bytes, &mut out, 128.0);
            prop_assert!(out.iter().all(|f| *f >= -1.0 && *f < 1.0));
        }
    }
}
