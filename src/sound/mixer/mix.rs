// mix.rs - Sample mixing helpers

//! Gain, panning and saturation for rendering sources to stereo.

use crate::sound::mixer::types::{SINT16_MAX, SINT16_MIN};

/// Left/right weights for a source at horizontal position `x`.
///
/// Constant power: `left² + right² == 1` across the field `[-1, 1]`.
pub fn pan_weights(x: f32) -> (f32, f32) {
    let x = x.clamp(-1.0, 1.0);
    (((1.0 - x) / 2.0).sqrt(), ((1.0 + x) / 2.0).sqrt())
}

/// Scale `sample` and add it to `acc`
#[inline]
pub fn accumulate(acc: &mut f32, sample: i16, weight: f32) {
    *acc += f32::from(sample) * weight;
}

/// Saturate a mixed value to 16 bits
#[inline]
pub fn clamp_sample(value: f32) -> i16 {
    value.round().clamp(SINT16_MIN, SINT16_MAX) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pan_weights_constant_power() {
        for x in [-1.0f32, -0.5, 0.0, 0.3, 1.0] {
            let (l, r) = pan_weights(x);
            assert!((l * l + r * r - 1.0).abs() < 1e-6);
        }
        assert_eq!(pan_weights(-1.0), (1.0, 0.0));
        assert_eq!(pan_weights(1.0), (0.0, 1.0));
    }

    #[test]
    fn test_clamp_sample() {
        assert_eq!(clamp_sample(40000.0), i16::MAX);
        assert_eq!(clamp_sample(-40000.0), i16::MIN);
        assert_eq!(clamp_sample(1.4), 1);
    }

    #[test]
    fn test_accumulate() {
        let mut acc = 0.0;
        accumulate(&mut acc, 100, 0.5);
        accumulate(&mut acc, -20, 1.0);
        assert_eq!(acc, 30.0);
    }
}
