//! Magnitude computation for IQ samples
//!
//! RTL-SDR delivers 8-bit IQ pairs offset-binary around 127. Preamble and
//! bit detection work on per-sample magnitudes, so each pair is folded to
//! its rectified deviation and looked up in a precomputed sqrt table.

use std::sync::LazyLock;

use super::DemodError;

/// Table side: rectified deviations span 0..=128.
const LUT_SIDE: usize = 129;

/// Precomputed magnitude per rectified deviation pair:
/// `MAG_LUT[i * 129 + q] = round(sqrt(i² + q²) * 360)` for i, q in [0, 128).
///
/// A deviation of exactly 128 (raw sample 255) falls on the unfilled last
/// row/column and reads as 0, matching dump1090's table.
static MAG_LUT: LazyLock<Vec<u16>> = LazyLock::new(|| {
    let mut lut = vec![0u16; LUT_SIDE * LUT_SIDE];
    for i in 0..128usize {
        for q in 0..128usize {
            let mag = ((i * i + q * q) as f64).sqrt() * 360.0;
            lut[i * LUT_SIDE + q] = mag.round() as u16;
        }
    }
    lut
});

/// Magnitude of one IQ byte pair.
#[inline]
pub fn magnitude(i: u8, q: u8) -> u16 {
    let di = (i as i32 - 127).unsigned_abs() as usize;
    let dq = (q as i32 - 127).unsigned_abs() as usize;
    MAG_LUT[di * LUT_SIDE + dq]
}

/// Convert an interleaved IQ byte buffer into a magnitude vector.
///
/// Output length is exactly half the input length.
pub fn magnitude_vector(iq: &[u8]) -> Result<Vec<u16>, DemodError> {
    if iq.is_empty() {
        return Err(DemodError::EmptyChunk);
    }
    if iq.len() % 2 != 0 {
        return Err(DemodError::OddChunk(iq.len()));
    }

    let mut mag = Vec::with_capacity(iq.len() / 2);
    for pair in iq.chunks_exact(2) {
        mag.push(magnitude(pair[0], pair[1]));
    }
    Ok(mag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lut_formula() {
        // Pure I deviation of 100: sqrt(100²) * 360 = 36000.
        assert_eq!(magnitude(227, 127), 36000);
        // Unit deviation on either axis.
        assert_eq!(magnitude(128, 127), 360);
        assert_eq!(magnitude(127, 128), 360);
        // Diagonal: round(sqrt(2) * 360) = 509.
        assert_eq!(magnitude(128, 128), 509);
    }

    #[test]
    fn test_lut_center_is_zero() {
        assert_eq!(magnitude(127, 127), 0);
    }

    #[test]
    fn test_lut_symmetric_in_iq_swap() {
        for i in [0u8, 50, 127, 180, 254] {
            for q in [0u8, 50, 127, 180, 254] {
                assert_eq!(magnitude(i, q), magnitude(q, i));
            }
        }
    }

    #[test]
    fn test_lut_rectification() {
        // Deviations of +d and -d are the same magnitude.
        assert_eq!(magnitude(127 + 40, 127), magnitude(127 - 40, 127));
        assert_eq!(magnitude(127, 127 + 90), magnitude(127, 127 - 90));
    }

    #[test]
    fn test_full_scale_deviation_quirk() {
        // Raw 255 rectifies to deviation 128, outside the filled region.
        assert_eq!(magnitude(255, 127), 0);
    }

    #[test]
    fn test_vector_length_is_half() {
        let iq = vec![127u8; 2048];
        let mag = magnitude_vector(&iq).unwrap();
        assert_eq!(mag.len(), 1024);
    }

    #[test]
    fn test_vector_values() {
        let iq = [227u8, 127, 127, 127, 128, 128];
        let mag = magnitude_vector(&iq).unwrap();
        assert_eq!(mag, vec![36000, 0, 509]);
    }

    #[test]
    fn test_vector_rejects_odd_length() {
        let iq = vec![127u8; 33];
        assert!(matches!(
            magnitude_vector(&iq),
            Err(DemodError::OddChunk(33))
        ));
    }

    #[test]
    fn test_vector_rejects_empty() {
        assert!(matches!(magnitude_vector(&[]), Err(DemodError::EmptyChunk)));
    }
}
