//! Sample format conversion.

/// Converts an `i16` sample to `f32`.
///
/// Output will be in the range [-1.0, 1.0).
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// Converts an unsigned 16-bit sample (midpoint 32768) to `f32`.
#[inline]
pub fn u16_to_f32(sample: u16) -> f32 {
    (f32::from(sample) - 32768.0) / 32768.0
}

/// Converts an `i32` sample to `f32`.
#[inline]
pub fn i32_to_f32(sample: i32) -> f32 {
    (f64::from(sample) / 2_147_483_648.0) as f32
}

/// Passes finite float samples through and replaces NaN/inf with silence.
///
/// Values above full scale are kept so the true-peak meter can see overs.
#[inline]
pub fn sanitize_f32(sample: f32) -> f32 {
    if sample.is_finite() {
        sample
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i16_to_f32_full_range() {
        let max = i16_to_f32(32767);
        assert!((max - 0.99997).abs() < 0.001);
        assert_eq!(i16_to_f32(-32768), -1.0);
        assert_eq!(i16_to_f32(0), 0.0);
    }

    #[test]
    fn test_u16_to_f32_midpoint_is_silence() {
        assert_eq!(u16_to_f32(32768), 0.0);
        assert_eq!(u16_to_f32(0), -1.0);
        assert!(u16_to_f32(u16::MAX) > 0.999);
    }

    #[test]
    fn test_i32_to_f32() {
        assert_eq!(i32_to_f32(i32::MIN), -1.0);
        assert_eq!(i32_to_f32(0), 0.0);
        assert!((i32_to_f32(1 << 30) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_f32(0.25), 0.25);
        assert_eq!(sanitize_f32(1.2), 1.2);
        assert_eq!(sanitize_f32(f32::NAN), 0.0);
        assert_eq!(sanitize_f32(f32::NEG_INFINITY), 0.0);
    }
}
